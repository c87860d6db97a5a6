//! Scripted command backend
//!
//! Answers invocations from a table of canned responses and records every call,
//! so planning, preflight and publishing can be exercised without a toolchain.
//!
//! ```rust,ignore
//! let runner = ScriptedRunner::new()
//!   .on(&["git", "status", "--porcelain"], Scripted::success(""))
//!   .once_prefix(&["cargo", "publish"], Scripted::failure(101, "error: crate version `0.1.0` is already uploaded"));
//! ```

use crate::core::error::{ExecError, ShipyardResult};
use crate::exec::runner::{CommandResult, CommandRunner, Invocation, render_command};
use std::sync::{Mutex, PoisonError};

/// A canned response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
  Output { exit_code: i32, stdout: String, stderr: String },
  /// Behave as if the command ran past its timeout
  Timeout,
  /// Behave as if the program is not installed
  NotFound,
}

impl Scripted {
  pub fn success(stdout: impl Into<String>) -> Self {
    Scripted::Output {
      exit_code: 0,
      stdout: stdout.into(),
      stderr: String::new(),
    }
  }

  pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
    Scripted::Output {
      exit_code,
      stdout: String::new(),
      stderr: stderr.into(),
    }
  }

  pub fn output(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
    Scripted::Output {
      exit_code,
      stdout: stdout.into(),
      stderr: stderr.into(),
    }
  }
}

#[derive(Debug, Clone)]
enum Matcher {
  Exact(Vec<String>),
  Prefix(Vec<String>),
}

impl Matcher {
  fn matches(&self, command: &[String]) -> bool {
    match self {
      Matcher::Exact(expected) => expected.as_slice() == command,
      Matcher::Prefix(prefix) => command.starts_with(prefix),
    }
  }
}

#[derive(Debug, Clone)]
struct Rule {
  matcher: Matcher,
  response: Scripted,
  /// `None` answers forever
  remaining: Option<usize>,
}

/// Test backend that never spawns a process
#[derive(Debug, Default)]
pub struct ScriptedRunner {
  rules: Mutex<Vec<Rule>>,
  calls: Mutex<Vec<Invocation>>,
  strict: bool,
}

fn owned(command: &[&str]) -> Vec<String> {
  command.iter().map(|s| s.to_string()).collect()
}

impl ScriptedRunner {
  /// Unmatched commands succeed with empty output
  pub fn new() -> Self {
    Self::default()
  }

  /// Unmatched commands fail with `ExecError::Unscripted`
  pub fn strict() -> Self {
    Self {
      strict: true,
      ..Self::default()
    }
  }

  fn push(mut self, matcher: Matcher, response: Scripted, remaining: Option<usize>) -> Self {
    self
      .rules
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .push(Rule {
        matcher,
        response,
        remaining,
      });
    self
  }

  /// Answer every exact match of `command`
  pub fn on(self, command: &[&str], response: Scripted) -> Self {
    self.push(Matcher::Exact(owned(command)), response, None)
  }

  /// Answer the next exact match of `command` only
  pub fn once(self, command: &[&str], response: Scripted) -> Self {
    self.push(Matcher::Exact(owned(command)), response, Some(1))
  }

  /// Answer every command starting with `prefix`
  pub fn on_prefix(self, prefix: &[&str], response: Scripted) -> Self {
    self.push(Matcher::Prefix(owned(prefix)), response, None)
  }

  /// Answer the next command starting with `prefix` only
  pub fn once_prefix(self, prefix: &[&str], response: Scripted) -> Self {
    self.push(Matcher::Prefix(owned(prefix)), response, Some(1))
  }

  /// Every invocation seen so far, in order
  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Command vectors seen so far, in order
  pub fn commands(&self) -> Vec<Vec<String>> {
    self.calls().into_iter().map(|call| call.command).collect()
  }

  fn respond(&self, command: &[String]) -> Option<Scripted> {
    let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
    let rule = rules
      .iter_mut()
      .find(|rule| rule.remaining != Some(0) && rule.matcher.matches(command))?;
    if let Some(remaining) = rule.remaining.as_mut() {
      *remaining -= 1;
    }
    Some(rule.response.clone())
  }
}

impl CommandRunner for ScriptedRunner {
  fn run(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(invocation.clone());

    let response = match self.respond(&invocation.command) {
      Some(response) => response,
      None if self.strict => {
        return Err(
          ExecError::Unscripted {
            command: render_command(&invocation.command),
          }
          .into(),
        );
      }
      None => Scripted::success(""),
    };

    match response {
      Scripted::Output {
        exit_code,
        stdout,
        stderr,
      } => Ok(CommandResult {
        command: invocation.command.clone(),
        exit_code,
        stdout,
        stderr,
      }),
      Scripted::Timeout => Err(
        ExecError::Timeout {
          command: invocation.display(),
          timeout: invocation.timeout,
          partial_output: String::new(),
        }
        .into(),
      ),
      Scripted::NotFound => Err(
        ExecError::ProgramNotFound {
          program: invocation.program().to_string(),
        }
        .into(),
      ),
    }
  }
}
