#![no_main]

use libfuzzer_sys::fuzz_target;
use loadlens_core::{ReportAssembler, ScenarioModel};

fuzz_target!(|data: &[u8]| {
    if let Ok(query) = std::str::from_utf8(data) {
        let assembler = ReportAssembler::new(ScenarioModel::builtin());
        let decoded = assembler.decode_scenario(query);

        // Re-encoding the decoded state is stable.
        let encoded = assembler.encode_scenario(&decoded.state);
        let again = assembler.decode_scenario(&encoded);
        assert_eq!(again.state, decoded.state);
        assert!(again.unknown.is_empty());
    }
});
