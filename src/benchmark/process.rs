//! External process invocation
//!
//! Every external tool (cargo, the native benchmark binary, `go test`) is
//! started through [`CommandRunner`]. The system implementation enforces a
//! timeout per invocation, honours the shutdown signal, and kills the whole
//! process group of a child that is abandoned so that grandchildren spawned
//! by build tools do not linger.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use crate::error::{AppError, AppResult};

/// A fully described external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether `flag` is immediately followed by `value` in the arguments
    pub fn has_arg_pair(&self, flag: &str, value: &str) -> bool {
        self.args
            .windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// stdout and stderr lines, interleaved in arrival order
    pub lines: Vec<String>,
}

impl ProcessOutput {
    pub fn new(exit_code: Option<i32>, lines: Vec<String>) -> Self {
        Self { exit_code, lines }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Every captured line, verbatim
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Last `n` lines joined for diagnostics
    pub fn tail(&self, n: usize) -> String {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].join("\n")
    }

    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands on behalf of the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion and capture its output.
    ///
    /// A non-zero exit is not an error at this level; callers decide what a
    /// failed exit means for their stage.
    async fn run(&self, spec: &CommandSpec) -> AppResult<ProcessOutput>;
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    shutdown: watch::Receiver<bool>,
}

impl SystemRunner {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return Err(AppError::Cancelled(format!("not starting {}", spec)));
        }

        tracing::debug!(command = %spec, cwd = %spec.cwd.display(), "Spawning process");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::Execution(format!("failed to spawn {}: {}", spec, e)))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Execution(format!("no stdout pipe for {}", spec)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Execution(format!("no stderr pipe for {}", spec)))?;

        let finished = async move {
            let lines = collect_lines(stdout, stderr).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, lines))
        };

        tokio::select! {
            result = tokio::time::timeout(spec.timeout, finished) => match result {
                Ok(Ok((status, lines))) => Ok(ProcessOutput::new(status.code(), lines)),
                Ok(Err(e)) => Err(AppError::Execution(format!("{} failed: {}", spec, e))),
                Err(_) => {
                    kill_process_group(pid);
                    Err(AppError::Timeout {
                        command: spec.to_string(),
                        secs: spec.timeout.as_secs(),
                    })
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => {
                kill_process_group(pid);
                Err(AppError::Cancelled(format!("aborted {}", spec)))
            }
        }
    }
}

/// Read stdout and stderr concurrently into one ordered list of lines
async fn collect_lines<O, E>(stdout: O, stderr: E) -> std::io::Result<Vec<String>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut lines = Vec::new();

    // Partially read bytes stay in the buffers across select! iterations.
    while out_open || err_open {
        tokio::select! {
            n = out.read_until(b'\n', &mut out_buf), if out_open => {
                if n? == 0 {
                    out_open = false;
                } else {
                    lines.push(decode_line(&out_buf));
                    out_buf.clear();
                }
            }
            n = err.read_until(b'\n', &mut err_buf), if err_open => {
                if n? == 0 {
                    err_open = false;
                } else {
                    lines.push(decode_line(&err_buf));
                    err_buf.clear();
                }
            }
        }
    }

    Ok(lines)
}

fn decode_line(raw: &[u8]) -> String {
    let line = String::from_utf8_lossy(raw);
    line.trim_end_matches(['\n', '\r']).to_string()
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: nobody can request a shutdown any more.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "Process group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
