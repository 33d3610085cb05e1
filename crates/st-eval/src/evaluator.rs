//! Launching the external optimizer as a child process.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

use st_types::{EvalError, ParameterVector};

/// How to invoke the external program. The five parameter values are
/// appended after the fixed arguments on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProgramCommand {
    /// Run a native executable directly.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `<java> -jar <jar>`
    pub fn jar(java: impl Into<PathBuf>, jar: impl AsRef<Path>) -> Self {
        Self::new(java)
            .arg("-jar")
            .arg(jar.as_ref().as_os_str().to_os_string())
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn fixed_args(&self) -> &[OsString] {
        &self.args
    }

    /// Full argument list for one trial.
    pub fn args_for(&self, params: &ParameterVector) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.extend(params.to_args().into_iter().map(OsString::from));
        args
    }

    fn command(&self, params: &ParameterVector) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(params))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout can take down anything the program started.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl fmt::Display for ProgramCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Everything the program printed before it exited.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// A non-zero exit is only an observation; the output is still used.
    pub fn exit_error(&self) -> Option<EvalError> {
        if self.success() {
            return None;
        }
        Some(EvalError::NonZeroExit {
            code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Result of one external invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Success(ProcessOutput),
    TimedOut { timeout: Duration },
    LaunchFailed { reason: String },
}

impl EvaluationOutcome {
    /// The failure, if the program never produced usable output.
    pub fn error(&self, program: &str) -> Option<EvalError> {
        match self {
            Self::Success(_) => None,
            Self::TimedOut { timeout } => Some(EvalError::Timeout {
                timeout_seconds: timeout.as_secs(),
            }),
            Self::LaunchFailed { reason } => Some(EvalError::LaunchFailed {
                program: program.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Anything that can turn a parameter vector into raw program output.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, params: &ParameterVector, timeout: Duration) -> EvaluationOutcome;

    /// Label used in logs.
    fn describe(&self) -> String;
}

/// Runs [`ProgramCommand`] once per call. Calls share no state, so several
/// may run at the same time.
#[derive(Debug, Clone)]
pub struct ExternalEvaluator {
    command: ProgramCommand,
}

impl ExternalEvaluator {
    pub fn new(command: ProgramCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &ProgramCommand {
        &self.command
    }
}

#[async_trait]
impl Evaluator for ExternalEvaluator {
    async fn evaluate(&self, params: &ParameterVector, timeout: Duration) -> EvaluationOutcome {
        debug!(command = %self.command, params = %params, "Launching external program");

        let mut child = match self.command.command(params).spawn() {
            Ok(child) => child,
            Err(e) => {
                return EvaluationOutcome::LaunchFailed {
                    reason: e.to_string(),
                }
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = tokio::time::timeout(timeout, async {
            tokio::join!(read_stream(stdout), read_stream(stderr), child.wait())
        })
        .await;

        match waited {
            Ok((Ok(stdout), Ok(stderr), Ok(status))) => {
                let output = ProcessOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                };
                debug!(exit_code = ?output.exit_code, "External program finished");
                EvaluationOutcome::Success(output)
            }
            Ok((stdout, stderr, status)) => {
                let reason = [stdout.err(), stderr.err(), status.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                terminate(&mut child, pid).await;
                EvaluationOutcome::LaunchFailed {
                    reason: format!("failed to collect output: {reason}"),
                }
            }
            Err(_) => {
                terminate(&mut child, pid).await;
                EvaluationOutcome::TimedOut { timeout }
            }
        }
    }

    fn describe(&self) -> String {
        self.command.to_string()
    }
}

/// Kill the program's process group, then kill and reap the child itself.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Kill failed");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; the group id is the child's own pid.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        debug!(pgid, error = %e, "Killing process group failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample_params() -> ParameterVector {
        ParameterVector::new(20, 100, 0.5, 1.5, 2.0)
    }

    /// Whether `pid` is still a live (non-zombie) process, polling briefly
    /// since SIGKILL delivery is asynchronous.
    #[cfg(target_os = "linux")]
    async fn still_running(pid: &str) -> bool {
        for _ in 0..40 {
            let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
                Ok(stat) => stat,
                Err(_) => return false,
            };
            let state = stat.rsplit(')').next().unwrap_or("").trim_start();
            if state.starts_with('Z') || state.starts_with('X') {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    /// A `sh` script standing in for the PSO program.
    fn script(dir: &TempDir, body: &str) -> ProgramCommand {
        let path = dir.path().join("pso.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{body}").unwrap();
        ProgramCommand::new("sh").arg(path.into_os_string())
    }

    #[test]
    fn jar_command_appends_params_in_order() {
        let cmd = ProgramCommand::jar("java", "target/pso.jar");
        let args: Vec<String> = cmd
            .args_for(&sample_params())
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["-jar", "target/pso.jar", "20", "100", "0.5", "1.5", "2"]
        );
        assert_eq!(cmd.to_string(), "java -jar target/pso.jar");
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = TempDir::new().unwrap();
        let cmd = script(&dir, "echo \"args: $*\"\necho diag >&2\necho 1.25");
        let evaluator = ExternalEvaluator::new(cmd);

        let outcome = evaluator
            .evaluate(&sample_params(), Duration::from_secs(10))
            .await;
        match outcome {
            EvaluationOutcome::Success(output) => {
                assert!(output.success());
                assert!(output.stdout.contains("args: 20 100 0.5 1.5 2"));
                assert!(output.stdout.trim_end().ends_with("1.25"));
                assert_eq!(output.stderr.trim(), "diag");
                assert!(output.exit_error().is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_still_success() {
        let dir = TempDir::new().unwrap();
        let cmd = script(&dir, "echo 7.5\necho boom >&2\nexit 3");
        let evaluator = ExternalEvaluator::new(cmd);

        let outcome = evaluator
            .evaluate(&sample_params(), Duration::from_secs(10))
            .await;
        let EvaluationOutcome::Success(output) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(
            output.exit_error(),
            Some(EvalError::NonZeroExit {
                code: Some(3),
                stderr: "boom".into()
            })
        );
    }

    #[tokio::test]
    async fn missing_binary_is_launch_failure() {
        let evaluator = ExternalEvaluator::new(ProgramCommand::new("/nonexistent/pso-binary"));
        let outcome = evaluator
            .evaluate(&sample_params(), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, EvaluationOutcome::LaunchFailed { .. }));
        assert!(matches!(
            outcome.error("pso"),
            Some(EvalError::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_terminates_the_child() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let cmd = script(
            &dir,
            &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
        );
        let evaluator = ExternalEvaluator::new(cmd);

        let started = std::time::Instant::now();
        let outcome = evaluator
            .evaluate(&sample_params(), Duration::from_millis(500))
            .await;
        assert!(matches!(outcome, EvaluationOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(!still_running(&pid).await, "child {} still running", pid.trim());
        }
    }

    #[tokio::test]
    async fn timeout_terminates_background_descendants() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        // A wrapper that forks the real work and waits on it, like a launcher
        // script starting java.
        let cmd = script(
            &dir,
            &format!("sleep 30 &\necho $! > {}\nwait", pid_file.display()),
        );
        let evaluator = ExternalEvaluator::new(cmd);

        let outcome = evaluator
            .evaluate(&sample_params(), Duration::from_millis(500))
            .await;
        assert!(matches!(outcome, EvaluationOutcome::TimedOut { .. }));

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(
                !still_running(&pid).await,
                "background process {} outlived its trial",
                pid.trim()
            );
        }
    }
}
