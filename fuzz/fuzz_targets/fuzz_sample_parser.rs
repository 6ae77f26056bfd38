#![no_main]

use libfuzzer_sys::fuzz_target;
use loadlens_core::{TrialAggregator, parse_samples};

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        // Whatever parses must aggregate, and every statistic must be finite.
        if let Ok(samples) = parse_samples(json) {
            if let Ok(profile) = TrialAggregator::default().aggregate(&samples) {
                for (_, stats) in profile.iter() {
                    assert!(stats.median.is_finite());
                    assert!(stats.confidence_interval.low <= stats.median);
                    assert!(stats.median <= stats.confidence_interval.high);
                }
            }
        }
    }
});
