//! `CommandRunner` interface and the process-spawning backend
//!
//! Every component that shells out (metadata loading, git, cargo check/test/
//! package/publish) receives a `&dyn CommandRunner`. Production code passes a
//! `ProcessRunner`; tests pass a `ScriptedRunner` that never spawns anything.

use crate::core::error::{ExecError, ShipyardError, ShipyardResult};
use crate::exec::decode::pump;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default bound for a single command when the caller does not pick one
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1800);

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const READER_JOIN_BOUND: Duration = Duration::from_secs(2);

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  /// Program followed by its arguments
  pub command: Vec<String>,
  pub cwd: PathBuf,
  /// Overrides layered on top of the inherited environment
  pub env: BTreeMap<String, String>,
  pub timeout: Duration,
}

impl Invocation {
  pub fn new<I, S>(command: I, cwd: impl Into<PathBuf>) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      command: command.into_iter().map(Into::into).collect(),
      cwd: cwd.into(),
      env: BTreeMap::new(),
      timeout: DEFAULT_COMMAND_TIMEOUT,
    }
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn envs<I, K, V>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    for (key, value) in vars {
      self.env.insert(key.into(), value.into());
    }
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn program(&self) -> &str {
    self.command.first().map(String::as_str).unwrap_or("")
  }

  /// Command as a copy-pasteable shell line
  pub fn display(&self) -> String {
    render_command(&self.command)
  }
}

/// Captured outcome of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
  pub command: Vec<String>,
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
}

impl CommandResult {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }

  /// stdout followed by stderr, for marker scanning
  pub fn combined_output(&self) -> String {
    let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
    out.push_str(&self.stdout);
    if !self.stdout.is_empty() && !self.stderr.is_empty() && !self.stdout.ends_with('\n') {
      out.push('\n');
    }
    out.push_str(&self.stderr);
    out
  }

  /// The most useful failure text: stderr, or stdout when stderr is blank,
  /// keeping only the last `max_chars` characters
  pub fn failure_output(&self, max_chars: usize) -> String {
    let text = if self.stderr.trim().is_empty() {
      &self.stdout
    } else {
      &self.stderr
    };
    tail_chars(text.trim_end(), max_chars)
  }

  pub fn display(&self) -> String {
    render_command(&self.command)
  }
}

/// Pluggable execution backend
pub trait CommandRunner {
  /// Run to completion, or fail with `ExecError::Timeout` once `invocation.timeout` passes
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    (**self).run(invocation)
  }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    (**self).run(invocation)
  }
}

/// Spawns real processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
  /// Mirror child output to our own stdout/stderr while capturing it
  echo: bool,
}

impl ProcessRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn echoing() -> Self {
    Self { echo: true }
  }
}

type Capture = Arc<Mutex<String>>;

impl CommandRunner for ProcessRunner {
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    let Some((program, args)) = invocation.command.split_first() else {
      return Err(ShipyardError::message("Cannot run an empty command"));
    };

    let rendered = invocation.display();
    debug!(command = %rendered, cwd = %invocation.cwd.display(), "spawning");
    if !invocation.env.is_empty() {
      debug!(env = ?invocation.env, "environment overrides");
    }

    let mut child = Command::new(program)
      .args(args)
      .current_dir(&invocation.cwd)
      .envs(&invocation.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound && invocation.cwd.is_dir() {
          ExecError::ProgramNotFound {
            program: program.clone(),
          }
        } else {
          ExecError::Spawn {
            command: rendered.clone(),
            source,
          }
        }
      })?;

    let stdout_buf: Capture = Arc::default();
    let stderr_buf: Capture = Arc::default();
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
      readers.push(spawn_reader(out, Arc::clone(&stdout_buf), self.echo.then(|| Box::new(io::stdout()) as Sink)));
    }
    if let Some(err) = child.stderr.take() {
      readers.push(spawn_reader(err, Arc::clone(&stderr_buf), self.echo.then(|| Box::new(io::stderr()) as Sink)));
    }

    let deadline = Instant::now() + invocation.timeout;
    let waited = match wait_until(&mut child, deadline) {
      Ok(waited) => waited,
      Err(source) => {
        reap(&mut child, readers, &rendered);
        return Err(ExecError::Spawn { command: rendered, source }.into());
      }
    };
    let status = match waited {
      Some(status) => status,
      None => {
        reap(&mut child, readers, &rendered);

        let partial = CommandResult {
          command: invocation.command.clone(),
          exit_code: -1,
          stdout: take(&stdout_buf),
          stderr: take(&stderr_buf),
        };
        return Err(
          ExecError::Timeout {
            command: rendered,
            timeout: invocation.timeout,
            partial_output: tail_chars(partial.combined_output().trim_end(), 4000),
          }
          .into(),
        );
      }
    };

    // A background grandchild can hold the pipes open past the child's exit
    let bound = deadline.saturating_duration_since(Instant::now()) + READER_JOIN_BOUND;
    if !join_bounded(readers, bound, &rendered) {
      warn!(command = %rendered, "command exited but its output pipes stayed open; keeping what was read");
    }

    Ok(CommandResult {
      command: invocation.command.clone(),
      exit_code: exit_code(status),
      stdout: take(&stdout_buf),
      stderr: take(&stderr_buf),
    })
  }
}

type Sink = Box<dyn Write + Send>;

fn spawn_reader<R>(reader: R, capture: Capture, mut echo: Option<Sink>) -> JoinHandle<io::Result<()>>
where
  R: io::Read + Send + 'static,
{
  thread::spawn(move || {
    pump(reader, |text| {
      if let Some(sink) = echo.as_mut() {
        let _ = sink.write_all(text.as_bytes());
        let _ = sink.flush();
      }
      capture.lock().unwrap_or_else(|p| p.into_inner()).push_str(text);
    })
  })
}

/// `Ok(None)` when `deadline` passed before the child exited
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
  loop {
    if let Some(status) = child.try_wait()? {
      return Ok(Some(status));
    }
    let now = Instant::now();
    if now >= deadline {
      return Ok(None);
    }
    thread::sleep(POLL_INTERVAL.min(deadline - now));
  }
}

/// Kill and wait for `child`, then give its readers a bounded chance to drain
fn reap(child: &mut Child, readers: Vec<JoinHandle<io::Result<()>>>, command: &str) {
  // Kill first so the pipes close and the readers can drain what is left
  let _ = child.kill();
  let _ = child.wait();
  if !join_bounded(readers, READER_JOIN_BOUND, command) {
    warn!(command = %command, "output reader still blocked after kill; abandoning it");
  }
}

/// Join reader threads, abandoning any still blocked after `bound`.
///
/// Returns `false` when a reader had to be abandoned.
fn join_bounded(readers: Vec<JoinHandle<io::Result<()>>>, bound: Duration, command: &str) -> bool {
  let deadline = Instant::now() + bound;
  let mut drained = true;
  for reader in readers {
    while !reader.is_finished() && Instant::now() < deadline {
      thread::sleep(Duration::from_millis(10));
    }
    if !reader.is_finished() {
      drained = false;
      continue;
    }
    if let Ok(Err(e)) = reader.join() {
      warn!(command = %command, "error reading command output: {}", e);
    }
  }
  drained
}

fn take(capture: &Capture) -> String {
  std::mem::take(&mut *capture.lock().unwrap_or_else(|p| p.into_inner()))
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
  use std::os::unix::process::ExitStatusExt;
  status
    .code()
    .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(-1))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
  status.code().unwrap_or(-1)
}

/// Join argv into a shell-style line, quoting arguments that need it
pub fn render_command(command: &[String]) -> String {
  command
    .iter()
    .map(|arg| {
      if arg.is_empty() {
        "''".to_string()
      } else if arg.chars().any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '$' | '`' | '\\')) {
        format!("'{}'", arg.replace('\'', r"'\''"))
      } else {
        arg.clone()
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Last `max_chars` characters of `text`, marked when something was cut
pub fn tail_chars(text: &str, max_chars: usize) -> String {
  let count = text.chars().count();
  if count <= max_chars {
    return text.to_string();
  }
  let skip = count - max_chars;
  let tail: String = text.chars().skip(skip).collect();
  format!("... ({} earlier characters omitted)\n{}", skip, tail)
}
