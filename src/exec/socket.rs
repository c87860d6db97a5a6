//! Stub command backend over a Unix socket
//!
//! One connection per invocation. The request is a single JSON line and the
//! reply is a single JSON line; the peer decides what each command "does".

use crate::core::error::{ExecError, ShipyardError, ShipyardResult};
use crate::exec::runner::{CommandResult, CommandRunner, Invocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize)]
struct StubRequest<'a> {
  command: &'a [String],
  cwd: &'a Path,
  env: &'a BTreeMap<String, String>,
  timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct StubResponse {
  exit_code: i32,
  #[serde(default)]
  stdout: String,
  #[serde(default)]
  stderr: String,
}

/// Forwards every invocation to a stub server instead of spawning it
#[derive(Debug, Clone)]
pub struct SocketRunner {
  socket: PathBuf,
}

impl SocketRunner {
  pub fn new(socket: impl Into<PathBuf>) -> Self {
    Self { socket: socket.into() }
  }

  fn exchange(&self, invocation: &Invocation) -> io::Result<Option<StubResponse>> {
    let mut stream = UnixStream::connect(&self.socket)?;
    stream.set_read_timeout(Some(invocation.timeout))?;

    let request = StubRequest {
      command: &invocation.command,
      cwd: &invocation.cwd,
      env: &invocation.env,
      timeout_secs: invocation.timeout.as_secs().max(1),
    };
    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()?;

    let mut reply = String::new();
    let read = BufReader::new(stream).read_line(&mut reply);
    match read {
      Ok(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stub server closed the connection")),
      Ok(_) => Ok(Some(serde_json::from_str(reply.trim_end())?)),
      Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

impl CommandRunner for SocketRunner {
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    debug!(command = %invocation.display(), socket = %self.socket.display(), "forwarding to stub backend");

    let response = self
      .exchange(invocation)
      .map_err(|e| {
        ShipyardError::from(ExecError::StubBackend {
          reason: format!("{}: {}", self.socket.display(), e),
        })
      })?
      .ok_or_else(|| ExecError::Timeout {
        command: invocation.display(),
        timeout: invocation.timeout,
        partial_output: String::new(),
      })?;

    Ok(CommandResult {
      command: invocation.command.clone(),
      exit_code: response.exit_code,
      stdout: response.stdout,
      stderr: response.stderr,
    })
  }
}
