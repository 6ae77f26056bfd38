//! Browser trial collection.
//!
//! A trial launches the configured driver command with the target URL as
//! its last argument and reads one navigation timing object (or phase map)
//! from its stdout. Failed trials are kept as records with a warning and
//! never contribute a sample.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use loadlens_core::{PhaseSample, parse_sample};

use crate::config::DriverConfig;
use crate::error::TrialError;
use crate::observability::metrics;

/// Upper bound on driver stdout accepted as a timing object.
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

// ============================================================================
// Records
// ============================================================================

/// The outcome of one trial.
///
/// Serializes flat: the phase durations, `full_ttfb` and `total` of the
/// sample sit next to the run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    /// 1-based trial number.
    pub run: usize,

    /// When the driver was launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the driver finished or was abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Wall-clock time spent on the trial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,

    /// Measured phases, absent for failed trials.
    #[serde(flatten)]
    pub sample: Option<PhaseSample>,

    /// Why the trial produced no sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// Typed failure, kept for exit codes and metrics.
    #[serde(skip)]
    pub error: Option<TrialError>,
}

impl TrialRecord {
    /// A record for a sample read from a file rather than measured.
    #[must_use]
    pub const fn from_sample(run: usize, sample: PhaseSample) -> Self {
        Self {
            run,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            sample: Some(sample),
            warning: None,
            error: None,
        }
    }

    fn finish(
        run: usize,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: Result<PhaseSample, TrialError>,
    ) -> Self {
        let (sample, error) = match outcome {
            Ok(sample) => (Some(sample), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            run,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            duration_ms: Some(elapsed.as_secs_f64() * 1000.0),
            sample,
            warning: error.as_ref().map(ToString::to_string),
            error,
        }
    }

    /// Returns `true` if the trial produced a sample.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.sample.is_some()
    }
}

/// Samples of the successful trials, in run order.
#[must_use]
pub fn successful_samples(records: &[TrialRecord]) -> Vec<PhaseSample> {
    records.iter().filter_map(|r| r.sample.clone()).collect()
}

// ============================================================================
// Runner
// ============================================================================

/// Runs browser trials through an external driver.
#[derive(Debug, Clone)]
pub struct TrialRunner {
    command: Arc<[String]>,
    timeout: Duration,
    concurrency: usize,
}

impl TrialRunner {
    /// Creates a runner from the driver configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrialError::NoDriver` if the command is empty.
    pub fn new(driver: &DriverConfig) -> Result<Self, TrialError> {
        if driver.command.first().is_none_or(String::is_empty) {
            return Err(TrialError::NoDriver);
        }
        Ok(Self {
            command: driver.command.clone().into(),
            timeout: Duration::from_millis(driver.timeout_ms),
            concurrency: driver.concurrency.max(1),
        })
    }

    /// Runs `runs` trials against `url` and returns every record in run
    /// order, failed ones included.
    ///
    /// Dropping the returned future cancels the outstanding trials and kills
    /// their drivers.
    pub async fn run(&self, url: &str, runs: usize) -> Vec<TrialRecord> {
        info!(
            url,
            runs,
            concurrency = self.concurrency,
            driver = %self.command[0],
            "starting trials"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        // Dropping the set aborts every trial and kills its driver.
        let mut tasks = JoinSet::new();
        for run in 1..=runs {
            let runner = self.clone();
            let url = url.to_string();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                runner.run_one(run, &url).await
            });
        }

        let mut slots: Vec<Option<TrialRecord>> = (0..runs).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => {
                    if let Some(slot) = slots.get_mut(record.run - 1) {
                        *slot = Some(record);
                    }
                }
                Err(e) => warn!(error = %e, "trial task failed"),
            }
        }

        let records: Vec<TrialRecord> = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    TrialRecord::finish(
                        i + 1,
                        Utc::now(),
                        Duration::ZERO,
                        Err(TrialError::SpawnFailed("trial task failed".to_string())),
                    )
                })
            })
            .collect();

        let failed = records.iter().filter(|r| !r.succeeded()).count();
        if failed > 0 {
            warn!(failed, runs, "some trials produced no sample");
        }
        records
    }

    async fn run_one(&self, run: usize, url: &str) -> TrialRecord {
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = self.execute(url).await;
        let elapsed = start.elapsed();

        match &outcome {
            Ok(sample) => debug!(run, total_ms = sample.total(), "trial complete"),
            Err(e) => warn!(run, error = %e, "trial failed"),
        }
        metrics::record_trial(elapsed, outcome.as_ref().err());

        TrialRecord::finish(run, started_at, elapsed, outcome)
    }

    async fn execute(&self, url: &str) -> Result<PhaseSample, TrialError> {
        let (program, args) = self.command.split_first().ok_or(TrialError::NoDriver)?;

        let child = tokio::process::Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrialError::SpawnFailed(format!("{program}: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TrialError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| TrialError::SpawnFailed(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(TrialError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "driver wrote to stderr");
        }

        if output.stdout.len() > MAX_OUTPUT_SIZE {
            return Err(TrialError::InvalidOutput(format!(
                "stdout exceeds {MAX_OUTPUT_SIZE} byte limit"
            )));
        }
        let stdout = std::str::from_utf8(&output.stdout)
            .map_err(|e| TrialError::InvalidOutput(e.to_string()))?;
        if stdout.trim().is_empty() {
            return Err(TrialError::InvalidOutput("driver printed nothing".to_string()));
        }

        parse_sample(stdout).map_err(|e| TrialError::InvalidOutput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadlens_core::Phase;

    const NAV_JSON: &str = r#"{"domainLookupStart":0,"domainLookupEnd":20,"connectStart":20,"connectEnd":100,"secureConnectionStart":50,"requestStart":100,"responseStart":250,"responseEnd":300,"loadEventEnd":500}"#;

    fn driver(script: &str) -> DriverConfig {
        DriverConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "driver".to_string(),
            ],
            timeout_ms: 5_000,
            concurrency: 1,
        }
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = TrialRunner::new(&DriverConfig::default()).unwrap_err();
        assert!(matches!(err, TrialError::NoDriver));
    }

    #[tokio::test]
    async fn test_navigation_timing_from_stdout() {
        let runner = TrialRunner::new(&driver(&format!("echo '{NAV_JSON}'"))).unwrap();
        let records = runner.run("https://example.com", 2).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run, 1);
        assert_eq!(records[1].run, 2);
        let sample = records[0].sample.as_ref().unwrap();
        assert!((sample.get(Phase::Dns) - 20.0).abs() < f64::EPSILON);
        assert!((sample.get(Phase::Tcp) - 80.0).abs() < f64::EPSILON);
        assert!((sample.get(Phase::Tls) - 50.0).abs() < f64::EPSILON);
        assert!((sample.get(Phase::Ttfb) - 150.0).abs() < f64::EPSILON);
        assert!((sample.get(Phase::Render) - 200.0).abs() < f64::EPSILON);
        assert!(records[0].warning.is_none());
    }

    #[tokio::test]
    async fn test_url_is_last_argument() {
        // $1 is the first argument after the `driver` placeholder ($0)
        let script = r#"[ "$1" = "https://example.com/a?b=1" ] && echo '{"dns": 5}' || exit 9"#;
        let runner = TrialRunner::new(&driver(script)).unwrap();
        let records = runner.run("https://example.com/a?b=1", 1).await;
        let sample = records[0].sample.as_ref().unwrap();
        assert!((sample.get(Phase::Dns) - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_warning() {
        let runner =
            TrialRunner::new(&driver("echo 'net::ERR_NAME_NOT_RESOLVED' >&2; exit 3")).unwrap();
        let records = runner.run("https://invalid.test", 1).await;
        assert!(!records[0].succeeded());
        match &records[0].error {
            Some(TrialError::NonZeroExit { code, stderr }) => {
                assert_eq!(*code, Some(3));
                assert_eq!(stderr, "net::ERR_NAME_NOT_RESOLVED");
            }
            other => panic!("expected non-zero exit, got {other:?}"),
        }
        assert!(records[0].warning.as_ref().unwrap().contains("status 3"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut config = driver("sleep 5");
        config.timeout_ms = 100;
        let runner = TrialRunner::new(&config).unwrap();
        let records = runner.run("https://example.com", 1).await;
        assert!(matches!(
            records[0].error,
            Some(TrialError::Timeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_invalid_output() {
        let runner = TrialRunner::new(&driver("echo 'not json'")).unwrap();
        let records = runner.run("https://example.com", 1).await;
        assert!(matches!(records[0].error, Some(TrialError::InvalidOutput(_))));

        let runner = TrialRunner::new(&driver("true")).unwrap();
        let records = runner.run("https://example.com", 1).await;
        assert!(matches!(records[0].error, Some(TrialError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = DriverConfig {
            command: vec!["/nonexistent/loadlens-driver".to_string()],
            ..DriverConfig::default()
        };
        let runner = TrialRunner::new(&config).unwrap();
        let records = runner.run("https://example.com", 1).await;
        assert!(matches!(records[0].error, Some(TrialError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_order() {
        let mut config = driver(r#"echo "{\"dns\": $$}""#);
        config.concurrency = 4;
        let runner = TrialRunner::new(&config).unwrap();
        let records = runner.run("https://example.com", 6).await;
        let runs: Vec<usize> = records.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(successful_samples(&records).len(), 6);
    }

    #[tokio::test]
    async fn test_failed_trials_excluded_from_samples() {
        // Every second invocation fails
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("n");
        let script = format!(
            r#"n=$(cat {c} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {c}; if [ $((n % 2)) -eq 0 ]; then exit 1; fi; echo '{{"ttfb": 100}}'"#,
            c = counter.display()
        );
        let runner = TrialRunner::new(&driver(&script)).unwrap();
        let records = runner.run("https://example.com", 4).await;
        assert_eq!(successful_samples(&records).len(), 2);
        assert_eq!(records.iter().filter(|r| r.warning.is_some()).count(), 2);
    }

    fn process_gone(pid: u32) -> bool {
        // Exited, or a zombie waiting to be reaped
        let output = std::process::Command::new("ps")
            .args(["-o", "stat=", "-p", &pid.to_string()])
            .output()
            .unwrap();
        let stat = String::from_utf8_lossy(&output.stdout);
        stat.trim().is_empty() || stat.trim_start().starts_with('Z')
    }

    #[tokio::test]
    async fn test_cancelled_run_kills_driver() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let mut config = driver(&format!(
            "echo $$ > {}; exec sleep 30",
            pid_file.display()
        ));
        config.timeout_ms = 60_000;
        let runner = TrialRunner::new(&config).unwrap();

        let read_pid = async {
            loop {
                if let Ok(raw) = std::fs::read_to_string(&pid_file)
                    && let Ok(pid) = raw.trim().parse::<u32>()
                {
                    return pid;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };

        // Leaving the select drops the unfinished `run` future.
        let pid = tokio::select! {
            _ = runner.run("https://example.com", 1) => panic!("driver finished early"),
            pid = tokio::time::timeout(Duration::from_secs(5), read_pid) => {
                pid.expect("driver never wrote its pid")
            }
        };
        assert!(!process_gone(pid), "driver should be running before cancel");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(pid) {
            assert!(Instant::now() < deadline, "driver {pid} still running after cancel");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[test]
    fn test_successful_record_serializes_flat() {
        let sample = PhaseSample::from_pairs([(Phase::Dns, 20.0), (Phase::Ttfb, 100.0)]).unwrap();
        let json = serde_json::to_value(TrialRecord::from_sample(3, sample)).unwrap();
        assert_eq!(json["run"], 3);
        assert_eq!(json["dns"], 20.0);
        assert_eq!(json["full_ttfb"], 120.0);
        assert_eq!(json["total"], 120.0);
        assert!(json.get("warning").is_none());
        assert!(json.get("started_at").is_none());
    }

    #[test]
    fn test_record_serialization_skips_absent_fields() {
        let record = TrialRecord::finish(
            1,
            Utc::now(),
            Duration::from_millis(5),
            Err(TrialError::Timeout { timeout_ms: 5 }),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("sample").is_none());
        assert!(json.get("total").is_none());
        assert!(json.get("started_at").is_some());
        assert_eq!(json["warning"], "trial timed out after 5 ms");
        assert!(json.get("error").is_none());
    }
}
