use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ExitError;

/// Result of running a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    /// Returns true if the process exited successfully.
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Successful output with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }
}

/// Ways a subprocess can fail before producing an exit code.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {tool}")]
    NotFound { tool: String },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Lift into an [`ExitError`] naming the operation that was underway.
    pub fn into_exit(self, operation: &str, hint: &'static str) -> ExitError {
        match self {
            Self::NotFound { tool } => ExitError::ToolNotFound { tool, hint },
            Self::Timeout { tool, timeout_secs } => ExitError::Timeout {
                tool,
                operation: operation.to_string(),
                timeout_secs,
            },
            Self::Io { tool, source } => ExitError::ToolFailed {
                tool,
                operation: operation.to_string(),
                code: -1,
                message: source.to_string(),
            },
        }
    }
}

/// Builder for running companion tools.
#[derive(Debug, Clone)]
pub struct Tool {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Tool {
    /// Create a new tool invocation.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| (*s).to_string()));
        self
    }

    /// Set an environment variable for this child only.
    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    /// Run the child in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Set a timeout for the subprocess.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// First argument, which for every tool ghwt drives is the subcommand.
    pub fn subcommand(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }

    /// Command line for log output, with long arguments shortened.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.len() > 60 {
                out.push_str(truncate_safe(arg, 60));
                out.push_str("...");
            } else {
                out.push_str(arg);
            }
        }
        out
    }

    /// Run the tool, capturing stdout and stderr.
    ///
    /// A nonzero exit is returned as output, not as an error.
    pub fn run(&self) -> Result<RunOutput, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        // Drain both pipes while waiting so a chatty child cannot fill them and stall.
        let (tx, rx) = mpsc::channel();
        let pending = usize::from(drain(child.stdout.take(), Pipe::Stdout, &tx))
            + usize::from(drain(child.stderr.take(), Pipe::Stderr, &tx));
        drop(tx);

        let status = match deadline {
            Some(deadline) => self.wait_until(&mut child, deadline)?,
            None => child.wait().map_err(|e| ToolError::Io {
                tool: self.program.clone(),
                source: e,
            })?,
        };

        // A background grandchild holding the pipes open still counts against the timeout.
        let (stdout, stderr) = collect(&rx, pending, deadline).map_err(|_| self.timeout_error())?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        })
    }

    /// Poll `child` until it exits, killing it once `deadline` passes.
    fn wait_until(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus, ToolError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(self.timeout_error());
                    }
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    return Err(ToolError::Io {
                        tool: self.program.clone(),
                        source: e,
                    });
                }
            }
        }
    }

    fn timeout_error(&self) -> ToolError {
        ToolError::Timeout {
            tool: self.program.clone(),
            timeout_secs: self.timeout.map_or(0, |t| t.as_secs()),
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> ToolError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound {
                tool: self.program.clone(),
            }
        } else {
            ToolError::Io {
                tool: self.program.clone(),
                source: e,
            }
        }
    }
}

/// Executes [`Tool`] invocations. Components take `&dyn Runner` so tests can
/// script external processes.
pub trait Runner {
    fn run(&self, tool: &Tool) -> Result<RunOutput, ToolError>;
}

/// Runs tools as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, tool: &Tool) -> Result<RunOutput, ToolError> {
        tool.run()
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Read `pipe` to the end on its own thread and send the bytes on `tx`.
/// Returns whether a reader was started.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    tx: &Sender<(Pipe, Vec<u8>)>,
) -> bool {
    let Some(mut r) = pipe else {
        return false;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        let _ = tx.send((which, buf));
    });
    true
}

/// Wait for `pending` drained pipes, giving up at `deadline`.
fn collect(
    rx: &Receiver<(Pipe, Vec<u8>)>,
    mut pending: usize,
    deadline: Option<Instant>,
) -> Result<(Vec<u8>, Vec<u8>), RecvTimeoutError> {
    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    while pending > 0 {
        let received = match deadline {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((Pipe::Stdout, buf)) => stdout = buf,
            Ok((Pipe::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Timeout) => return Err(RecvTimeoutError::Timeout),
            Err(RecvTimeoutError::Disconnected) => break,
        }
        pending -= 1;
    }
    Ok((stdout, stderr))
}

/// Truncate a string at a valid UTF-8 char boundary.
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_echo() {
        let output = Tool::new("echo").arg("hello").run().unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn run_false_fails() {
        let output = Tool::new("false").run().unwrap();
        assert!(!output.success());
    }

    #[test]
    fn run_not_found() {
        let err = Tool::new("nonexistent-tool-xyz").run().unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn run_with_timeout_succeeds() {
        let output = Tool::new("echo")
            .arg("fast")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "fast");
    }

    #[test]
    fn run_with_timeout_kills_slow_child() {
        let err = Tool::new("sleep")
            .arg("5")
            .timeout(Duration::from_secs(1))
            .run()
            .unwrap_err();
        match err {
            ToolError::Timeout { tool, timeout_secs } => {
                assert_eq!(tool, "sleep");
                assert_eq!(timeout_secs, 1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn timeout_covers_background_children_holding_pipes() {
        let start = Instant::now();
        let err = Tool::new("sh")
            .args(&["-c", "sleep 4 & echo hi"])
            .timeout(Duration::from_secs(1))
            .run()
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, ToolError::Timeout { timeout_secs: 1, .. }));
    }

    #[test]
    fn env_applies_to_child() {
        let output = Tool::new("sh")
            .args(&["-c", "printf %s \"$GHWT_SUBPROCESS_TEST\""])
            .env("GHWT_SUBPROCESS_TEST", "scoped")
            .run()
            .unwrap();
        assert_eq!(output.stdout, "scoped");
        assert!(std::env::var("GHWT_SUBPROCESS_TEST").is_err());
    }

    #[test]
    fn current_dir_applies_to_child() {
        let dir = tempfile::tempdir().unwrap();
        let output = Tool::new("pwd").current_dir(dir.path()).run().unwrap();
        let reported = PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn large_output_does_not_stall() {
        let output = Tool::new("sh")
            .args(&["-c", "head -c 300000 /dev/zero | tr '\\0' 'x'"])
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();
        assert_eq!(output.stdout.len(), 300_000);
    }

    #[test]
    fn timeout_lifts_to_exit_error_with_operation() {
        let err = ToolError::Timeout {
            tool: "gh".into(),
            timeout_secs: 30,
        }
        .into_exit("fetching issue a/b#1", "");
        assert!(matches!(
            err,
            ExitError::Timeout { ref operation, timeout_secs: 30, .. } if operation == "fetching issue a/b#1"
        ));
    }

    #[test]
    fn display_shortens_long_arguments() {
        let long = "x".repeat(200);
        let shown = Tool::new("agent").arg("run").arg(long).display();
        assert!(shown.starts_with("agent run "));
        assert!(shown.ends_with("..."));
        assert!(shown.len() < 80);
    }

    #[test]
    fn truncate_safe_respects_char_boundaries() {
        assert_eq!(truncate_safe("héllo", 2), "h");
        assert_eq!(truncate_safe("abc", 10), "abc");
    }
}
