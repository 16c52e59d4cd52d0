//! Execution of external programs.
//!
//! Everything this crate does to the outside world goes through [`Exec`]:
//! the docker CLI, restic and the aws CLI are all driven by it. Commands are
//! described by [`Cmd`] values carrying their own environment so no
//! invocation ever mutates the process-wide environment.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;

/// How often a child with a timeout is polled for completion.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Description of a single external command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
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

    /// Adds an environment variable scoped to this invocation only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Overrides the executor's default timeout for this invocation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for Cmd {
    /// Renders the command line with credentials masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        write!(f, "{}", redact(&line))
    }
}

/// Masks password material in a command line before it reaches a log or report.
fn redact(line: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?i)(password=|\s-p)\S+").expect("redaction regex is valid"));
    re.replace_all(line, "$1********").into_owned()
}

#[derive(Debug, Display, Error, From)]
/// Failure of an external command invocation.
pub enum ExecError {
    /// The program could not be started at all.
    #[display("failed to spawn '{command}': {source}")]
    Spawn { command: String, source: io::Error },

    /// The program ran but exited non-zero.
    #[display("'{command}' exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program exceeded its timeout and was killed.
    #[display("'{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// Capturing the program's output failed.
    #[from]
    Io(io::Error),
}

/// Blocking executor for external commands.
///
/// `run` is the strict primitive: a non-zero exit is an error. `run_probe`
/// is the probing primitive for existence checks where a non-zero exit is an
/// expected outcome, never an error. `run_to_file` streams stdout to disk for
/// dump-sized output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exec {
    default_timeout: Option<Duration>,
}

impl Exec {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    /// Runs the command and returns its trimmed stdout.
    pub fn run(&self, cmd: &Cmd) -> Result<String, ExecError> {
        log::trace!(target: "exec", "Running: {cmd}");

        let mut child = self.spawn(cmd)?;
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let status = self.wait(&mut child, cmd);
        let stdout = join_capture(stdout)?;
        let stderr = join_capture(stderr)?;
        let status = status?;

        if !status.success() {
            return Err(ExecError::Failed {
                command: cmd.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        // relay stderr of successful commands, restic is chatty on it
        if !stderr.trim().is_empty() {
            log::debug!(target: "exec", "{}", redact(stderr.trim()));
        }

        Ok(stdout.trim().to_string())
    }

    /// Runs the command, converting any failure into an absent result.
    ///
    /// Used exclusively for existence checks (does a binary exist in a
    /// container?) where failure carries no diagnostic value.
    pub fn run_probe(&self, cmd: &Cmd) -> Option<String> {
        match self.run(cmd) {
            Ok(stdout) => Some(stdout),
            Err(e) => {
                log::trace!(target: "exec", "Probe came back negative: {e}");
                None
            }
        }
    }

    /// Runs the command streaming its stdout into `dest`, gzip-compressed on
    /// request.
    ///
    /// On any failure the partially written file is removed, so a caller can
    /// never mistake a leftover for a valid dump.
    pub fn run_to_file(&self, cmd: &Cmd, dest: &Path, gzip: bool) -> Result<(), ExecError> {
        let result = self.stream_to_file(cmd, dest, gzip);
        if result.is_err() {
            let _ = fs::remove_file(dest);
        }
        result
    }

    fn stream_to_file(&self, cmd: &Cmd, dest: &Path, gzip: bool) -> Result<(), ExecError> {
        log::trace!(target: "exec", "Running: {cmd} > {}", dest.display());

        let mut child = self.spawn(cmd)?;
        let mut stdout = child
            .stdout
            .take()
            .expect("stdout of spawned child is piped");
        let dest_file = File::create_new(dest)?;

        let writer: JoinHandle<io::Result<u64>> = thread::spawn(move || {
            if gzip {
                let mut encoder = GzEncoder::new(dest_file, Compression::default());
                let written = io::copy(&mut stdout, &mut encoder)?;
                encoder.finish()?;
                Ok(written)
            } else {
                let mut dest_file = dest_file;
                io::copy(&mut stdout, &mut dest_file)
            }
        });
        let stderr = capture(child.stderr.take());

        let status = self.wait(&mut child, cmd);
        let written = writer.join().expect("writer thread should not panic")?;
        let stderr = join_capture(stderr)?;
        let status = status?;

        if !status.success() {
            return Err(ExecError::Failed {
                command: cmd.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        log::debug!(target: "exec", "Captured {written} bytes to {}", dest.display());
        Ok(())
    }

    fn spawn(&self, cmd: &Cmd) -> Result<Child, ExecError> {
        Command::new(&cmd.program)
            .args(&cmd.args)
            .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: cmd.to_string(),
                source,
            })
    }

    /// Waits for the child, killing it once the effective timeout expires.
    fn wait(&self, child: &mut Child, cmd: &Cmd) -> Result<ExitStatus, ExecError> {
        let Some(timeout) = cmd.timeout.or(self.default_timeout) else {
            return Ok(child.wait()?);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                child.kill()?;
                child.wait()?;
                return Err(ExecError::TimedOut {
                    command: cmd.to_string(),
                    timeout,
                });
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

/// Drains a child pipe on its own thread so a stalled child can still be
/// killed by the timeout loop.
fn capture(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<io::Result<String>> {
    let mut pipe = pipe.expect("output of spawned child is piped");
    thread::spawn(move || {
        let mut buf = String::new();
        pipe.read_to_string(&mut buf)?;
        Ok(buf)
    })
}

fn join_capture(handle: JoinHandle<io::Result<String>>) -> Result<String, ExecError> {
    let captured = handle.join().expect("capture thread should not panic")?;
    Ok(captured)
}
