//! Command execution: the runner interface and its backends

pub mod decode;
pub mod runner;
pub mod scripted;
#[cfg(unix)]
pub mod socket;

pub use decode::{Utf8StreamDecoder, pump};
pub use runner::{CommandResult, CommandRunner, DEFAULT_COMMAND_TIMEOUT, Invocation, ProcessRunner};
pub use scripted::{Scripted, ScriptedRunner};
#[cfg(unix)]
pub use socket::SocketRunner;

use crate::core::error::{ExecError, ShipyardResult};

/// Toggles the stub backend when set to a truthy value
pub const STUB_COMMANDS_ENV: &str = "SHIPYARD_STUB_COMMANDS";
/// Path of the stub server's Unix socket
pub const STUB_SOCKET_ENV: &str = "SHIPYARD_STUB_SOCKET";

/// Pick the backend from the process environment
pub fn runner_from_env() -> ShipyardResult<Box<dyn CommandRunner>> {
  runner_from_vars(|key| std::env::var(key).ok())
}

/// Pick the backend from an arbitrary variable lookup
pub fn runner_from_vars<F>(lookup: F) -> ShipyardResult<Box<dyn CommandRunner>>
where
  F: Fn(&str) -> Option<String>,
{
  let stubbed = lookup(STUB_COMMANDS_ENV).is_some_and(|v| is_truthy(&v));
  if !stubbed {
    return Ok(Box::new(ProcessRunner::echoing()));
  }

  let socket = lookup(STUB_SOCKET_ENV)
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| ExecError::StubBackend {
      reason: format!("{} is set but {} is not", STUB_COMMANDS_ENV, STUB_SOCKET_ENV),
    })?;

  stub_runner(socket)
}

#[cfg(unix)]
fn stub_runner(socket: String) -> ShipyardResult<Box<dyn CommandRunner>> {
  tracing::info!(socket = %socket, "using stub command backend");
  Ok(Box::new(SocketRunner::new(socket)))
}

#[cfg(not(unix))]
fn stub_runner(_socket: String) -> ShipyardResult<Box<dyn CommandRunner>> {
  Err(
    ExecError::StubBackend {
      reason: "the stub backend needs Unix domain sockets".to_string(),
    }
    .into(),
  )
}

fn is_truthy(value: &str) -> bool {
  matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
