//! The per-trial objective: evaluate, extract, and absorb every failure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use st_types::{EvalError, Fitness, ParameterVector};

use crate::evaluator::{EvaluationOutcome, Evaluator};
use crate::extract::parse_fitness;

/// Hard limit on a single external run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// What a search loop calls once per trial.
#[async_trait]
pub trait Objective: Send + Sync {
    /// Never fails: problems come back as [`Fitness::SENTINEL`].
    async fn score(&self, params: &ParameterVector) -> Fitness;
}

/// Composes an [`Evaluator`] with fitness extraction.
pub struct TrialObjective<E> {
    evaluator: Arc<E>,
    timeout: Duration,
}

impl<E: Evaluator + 'static> TrialObjective<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    fn fitness_from(&self, outcome: EvaluationOutcome, params: &ParameterVector) -> Fitness {
        let output = match outcome {
            EvaluationOutcome::Success(output) => output,
            EvaluationOutcome::TimedOut { timeout } => {
                warn!(
                    params = %params,
                    timeout_secs = timeout.as_secs_f64(),
                    "External program timed out"
                );
                return Fitness::SENTINEL;
            }
            failed @ EvaluationOutcome::LaunchFailed { .. } => {
                let program = self.evaluator.describe();
                if let Some(err) = failed.error(&program) {
                    error!(params = %params, error = %err, "Failed to run external program");
                }
                return Fitness::SENTINEL;
            }
        };

        if let Some(EvalError::NonZeroExit { code, stderr }) = output.exit_error() {
            warn!(exit_code = ?code, stderr = %stderr, "External program exited with non-zero status");
        }

        match parse_fitness(&output.combined()) {
            Ok(fitness) => fitness,
            Err(e) => {
                warn!(params = %params, error = %e, "Could not extract fitness");
                Fitness::SENTINEL
            }
        }
    }
}

#[async_trait]
impl<E: Evaluator + 'static> Objective for TrialObjective<E> {
    async fn score(&self, params: &ParameterVector) -> Fitness {
        let evaluator = Arc::clone(&self.evaluator);
        let timeout = self.timeout;
        let owned = *params;

        // Run on its own task so a panicking evaluator costs one trial, not the run.
        let handle = tokio::spawn(async move { evaluator.evaluate(&owned, timeout).await });
        match handle.await {
            Ok(outcome) => self.fitness_from(outcome, params),
            Err(e) => {
                warn!(params = %params, error = %e, "Evaluation task aborted");
                Fitness::SENTINEL
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::ProcessOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed outcome and counts calls.
    struct CannedEvaluator {
        outcome: EvaluationOutcome,
        calls: AtomicUsize,
    }

    impl CannedEvaluator {
        fn new(outcome: EvaluationOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Evaluator for CannedEvaluator {
        async fn evaluate(&self, _params: &ParameterVector, _timeout: Duration) -> EvaluationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        fn describe(&self) -> String {
            "canned".into()
        }
    }

    struct PanickingEvaluator;

    #[async_trait]
    impl Evaluator for PanickingEvaluator {
        async fn evaluate(&self, _params: &ParameterVector, _timeout: Duration) -> EvaluationOutcome {
            panic!("evaluator bug");
        }

        fn describe(&self) -> String {
            "panicking".into()
        }
    }

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> EvaluationOutcome {
        EvaluationOutcome::Success(ProcessOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        })
    }

    fn params() -> ParameterVector {
        ParameterVector::new(40, 200, 0.72, 1.49, 1.49)
    }

    async fn score(outcome: EvaluationOutcome) -> Fitness {
        TrialObjective::new(CannedEvaluator::new(outcome))
            .score(&params())
            .await
    }

    #[tokio::test]
    async fn clean_run_yields_parsed_value() {
        assert_eq!(score(output("Fitness: 12.345\n", "", 0)).await, Fitness::new(12.345));
    }

    #[tokio::test]
    async fn stderr_is_appended_after_stdout() {
        // The last line overall lives on stderr.
        assert_eq!(score(output("1.0\n", "2.0\n", 0)).await, Fitness::new(2.0));
        assert_eq!(score(output("3.5\n", "", 0)).await, Fitness::new(3.5));
    }

    #[tokio::test]
    async fn non_zero_exit_still_parses() {
        assert_eq!(score(output("0.42\n", "", 1)).await, Fitness::new(0.42));
        assert!(score(output("", "Exception in thread main\n", 1)).await.is_sentinel());
    }

    #[tokio::test]
    async fn failures_become_sentinel() {
        let timed_out = EvaluationOutcome::TimedOut {
            timeout: Duration::from_secs(300),
        };
        assert!(score(timed_out).await.is_sentinel());

        let launch = EvaluationOutcome::LaunchFailed {
            reason: "No such file or directory".into(),
        };
        assert!(score(launch).await.is_sentinel());

        assert!(score(output("", "", 0)).await.is_sentinel());
        assert!(score(output("no numbers here\n", "", 0)).await.is_sentinel());
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn launch_failure_is_logged_as_error() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let launch = EvaluationOutcome::LaunchFailed {
            reason: "No such file or directory".into(),
        };
        assert!(score(launch).await.is_sentinel());

        let line = logs
            .contents()
            .lines()
            .find(|l| l.contains("Failed to run external program"))
            .map(str::to_owned)
            .unwrap_or_default();
        assert!(line.contains("ERROR"), "logged as: {line:?}");
        assert!(line.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn evaluator_panic_becomes_sentinel() {
        let objective = TrialObjective::new(PanickingEvaluator);
        assert!(objective.score(&params()).await.is_sentinel());
    }

    #[tokio::test]
    async fn evaluates_exactly_once_per_score() {
        let objective = TrialObjective::new(CannedEvaluator::new(output("5\n", "", 0)))
            .with_timeout(Duration::from_secs(2));
        assert_eq!(objective.timeout(), Duration::from_secs(2));

        objective.score(&params()).await;
        objective.score(&params()).await;
        assert_eq!(objective.evaluator().calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scores_a_real_program() {
        use crate::evaluator::{ExternalEvaluator, ProgramCommand};
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pso.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "echo \"iteration 1 best 9.0\"\necho \"Fitness: $1.5\"").unwrap();
        drop(file);

        let evaluator = ExternalEvaluator::new(ProgramCommand::new("sh").arg(path.into_os_string()));
        let objective = TrialObjective::new(evaluator).with_timeout(Duration::from_secs(10));
        // $1 is swarmSize, so the script reports 40.5.
        assert_eq!(objective.score(&params()).await, Fitness::new(40.5));
    }
}
