//! Error types for cargo-shipyard with contextual messages and exit codes
//!
//! Every pipeline stage owns a category enum. `ShipyardError` wraps them so the
//! binary can pick an exit code and print a help hint without knowing which
//! stage failed.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit codes for cargo-shipyard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, bad workspace metadata)
  User = 1,
  /// System error (staging, external commands, I/O)
  System = 2,
  /// Validation failure (cycles, invalid publish order, dirty tree)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for cargo-shipyard
#[derive(Debug)]
pub enum ShipyardError {
  /// Invalid settings (shipyard.toml)
  Config(ConfigError),

  /// Malformed metadata or manifest while building the workspace model
  Workspace(WorkspaceModelError),

  /// Dependency cycle between workspace crates
  Cycle(WorkspaceDependencyCycleError),

  /// Publish plan could not be resolved
  Plan(PublishPlanError),

  /// Build directory preparation failed
  Stage(StageError),

  /// External command failures, dirty tree, timeouts
  Exec(ExecError),

  /// I/O errors
  Io(io::Error),

  /// Another error with extra context lines attached
  Context { context: String, source: Box<ShipyardError> },

  /// Generic error with message and optional help
  Message { message: String, help: Option<String> },
}

impl ShipyardError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ShipyardError::Message {
      message: msg.into(),
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ShipyardError::Message {
      message: msg.into(),
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    ShipyardError::Context {
      context: ctx.into(),
      source: Box::new(self),
    }
  }

  /// Innermost error, skipping context wrappers
  pub fn root(&self) -> &ShipyardError {
    match self {
      ShipyardError::Context { source, .. } => source.root(),
      other => other,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ShipyardError::Config(_) => ExitCode::User,
      ShipyardError::Workspace(_) => ExitCode::User,
      ShipyardError::Cycle(_) => ExitCode::Validation,
      ShipyardError::Plan(_) => ExitCode::Validation,
      ShipyardError::Stage(_) => ExitCode::System,
      ShipyardError::Exec(ExecError::DirtyTree { .. }) => ExitCode::Validation,
      ShipyardError::Exec(_) => ExitCode::System,
      ShipyardError::Io(_) => ExitCode::System,
      ShipyardError::Context { source, .. } => source.exit_code(),
      ShipyardError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ShipyardError::Config(_) => Some("Check shipyard.toml against the documented [publish] and [preflight] keys.".to_string()),
      ShipyardError::Cycle(_) => Some("Break the cycle, or move one edge to [dev-dependencies].".to_string()),
      ShipyardError::Plan(PublishPlanError::InvalidOrder { .. }) => {
        Some("`publish.order` must list every publishable crate exactly once.".to_string())
      }
      ShipyardError::Exec(e) => e.help_message(),
      ShipyardError::Context { source, .. } => source.help_message(),
      ShipyardError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for ShipyardError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShipyardError::Config(e) => write!(f, "{}", e),
      ShipyardError::Workspace(e) => write!(f, "{}", e),
      ShipyardError::Cycle(e) => write!(f, "{}", e),
      ShipyardError::Plan(e) => write!(f, "{}", e),
      ShipyardError::Stage(e) => write!(f, "{}", e),
      ShipyardError::Exec(e) => write!(f, "{}", e),
      ShipyardError::Io(e) => write!(f, "I/O error: {}", e),
      ShipyardError::Context { context, source } => write!(f, "{}\n{}", context, source),
      ShipyardError::Message { message, .. } => write!(f, "{}", message),
    }
  }
}

impl std::error::Error for ShipyardError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ShipyardError::Config(e) => Some(e),
      ShipyardError::Workspace(e) => Some(e),
      ShipyardError::Cycle(e) => Some(e),
      ShipyardError::Plan(e) => Some(e),
      ShipyardError::Stage(e) => Some(e),
      ShipyardError::Exec(e) => Some(e),
      ShipyardError::Io(e) => Some(e),
      ShipyardError::Context { source, .. } => Some(source.as_ref()),
      ShipyardError::Message { .. } => None,
    }
  }
}

impl From<io::Error> for ShipyardError {
  fn from(err: io::Error) -> Self {
    ShipyardError::Io(err)
  }
}

impl From<ConfigError> for ShipyardError {
  fn from(err: ConfigError) -> Self {
    ShipyardError::Config(err)
  }
}

impl From<WorkspaceModelError> for ShipyardError {
  fn from(err: WorkspaceModelError) -> Self {
    ShipyardError::Workspace(err)
  }
}

impl From<WorkspaceDependencyCycleError> for ShipyardError {
  fn from(err: WorkspaceDependencyCycleError) -> Self {
    ShipyardError::Cycle(err)
  }
}

impl From<PublishPlanError> for ShipyardError {
  fn from(err: PublishPlanError) -> Self {
    ShipyardError::Plan(err)
  }
}

impl From<StageError> for ShipyardError {
  fn from(err: StageError) -> Self {
    ShipyardError::Stage(err)
  }
}

impl From<ExecError> for ShipyardError {
  fn from(err: ExecError) -> Self {
    ShipyardError::Exec(err)
  }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config from {}: {source}", .path.display())]
  Read { path: PathBuf, source: io::Error },

  #[error("Failed to parse config from {}: {message}", .path.display())]
  Parse { path: PathBuf, message: String },

  #[error("Invalid value for `{field}`: {reason}")]
  Invalid { field: String, reason: String },
}

/// Errors raised while turning the metadata document into a `WorkspaceGraph`
#[derive(Debug, Error)]
pub enum WorkspaceModelError {
  #[error("Workspace metadata could not be read: {0}")]
  Json(String),

  #[error("Workspace metadata field `{field}` is missing or malformed")]
  Field { field: String },

  #[error("Workspace member `{id}` has no matching package entry")]
  MissingMember { id: String },

  #[error("Duplicate package name `{name}` in workspace")]
  DuplicateName { name: String },

  #[error("Unsupported dependency kind `{kind}` for `{package}` -> `{dependency}`")]
  UnsupportedKind {
    package: String,
    dependency: String,
    kind: String,
  },

  #[error("Failed to inspect manifest {}: {reason}", .path.display())]
  Manifest { path: PathBuf, reason: String },

  #[error("`cargo metadata` failed:\n{output}")]
  Metadata { output: String },
}

impl From<serde_json::Error> for WorkspaceModelError {
  fn from(err: serde_json::Error) -> Self {
    WorkspaceModelError::Json(err.to_string())
  }
}

/// Dependency cycle among workspace crates; `members` is sorted by name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Dependency cycle detected between workspace crates: {}", .members.join(", "))]
pub struct WorkspaceDependencyCycleError {
  pub members: Vec<String>,
}

/// Publish plan resolution errors
#[derive(Debug, Error)]
pub enum PublishPlanError {
  #[error("Invalid publish order: {}", .violations.join("; "))]
  InvalidOrder { violations: Vec<String> },

  #[error("Cannot derive publish order: cycle between {}", .0.members.join(", "))]
  Cycle(WorkspaceDependencyCycleError),
}

/// Build directory preparation errors
#[derive(Debug, Error)]
pub enum StageError {
  #[error("Build directory {} is inside the workspace {}", .build_dir.display(), .workspace_root.display())]
  BuildDirInsideWorkspace { build_dir: PathBuf, workspace_root: PathBuf },

  #[error("Build directory {} contains the workspace {}", .build_dir.display(), .workspace_root.display())]
  BuildDirContainsWorkspace { build_dir: PathBuf, workspace_root: PathBuf },

  #[error("Refusing to stage into {}: it is nested inside the workspace {}", .staging.display(), .workspace_root.display())]
  StagingInsideWorkspace { staging: PathBuf, workspace_root: PathBuf },

  #[error("Staging directory {} already exists", .path.display())]
  StagingExists { path: PathBuf },

  #[error("Crate `{package}` inherits the workspace {kind}, but {} does not exist", .path.display())]
  MissingSharedFile {
    package: String,
    kind: &'static str,
    path: PathBuf,
  },

  #[error("Failed to update manifest {}: {reason}", .path.display())]
  Manifest { path: PathBuf, reason: String },

  #[error("Failed to copy {} to {}: {source}", .from.display(), .to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    source: io::Error,
  },
}

/// External command and preflight errors
#[derive(Debug, Error)]
pub enum ExecError {
  #[error("Executable `{program}` was not found on PATH")]
  ProgramNotFound { program: String },

  #[error("Failed to start `{command}`: {source}")]
  Spawn { command: String, source: io::Error },

  #[error("`{command}` timed out after {}s", .timeout.as_secs_f64())]
  Timeout {
    command: String,
    timeout: Duration,
    /// Output captured before the process was killed
    partial_output: String,
  },

  #[error("{summary}\n  command: {command}\n  exit code: {exit_code}\n{output}")]
  CommandFailed {
    summary: String,
    command: String,
    exit_code: i32,
    output: String,
  },

  #[error("Workspace has uncommitted changes:\n{status}")]
  DirtyTree { status: String },

  #[error("{} is not inside a git repository", .path.display())]
  NotARepository { path: PathBuf },

  #[error("Stub command backend misconfigured: {reason}")]
  StubBackend { reason: String },

  #[error("No scripted response for `{command}`")]
  Unscripted { command: String },
}

impl ExecError {
  fn help_message(&self) -> Option<String> {
    match self {
      ExecError::ProgramNotFound { program } if program == "git" => {
        Some("Install git, or pass no --forbid-dirty flag to skip the clean-tree check.".to_string())
      }
      ExecError::ProgramNotFound { .. } => Some("Check that the Rust toolchain is installed and on PATH.".to_string()),
      ExecError::DirtyTree { .. } => Some("Commit or stash your changes, or drop --forbid-dirty.".to_string()),
      ExecError::NotARepository { .. } => Some("Run from a git checkout, or drop --forbid-dirty.".to_string()),
      ExecError::Timeout { .. } => Some("Raise `timeout_secs` in shipyard.toml if the command is just slow.".to_string()),
      ExecError::StubBackend { .. } => {
        Some("Set SHIPYARD_STUB_SOCKET, or unset SHIPYARD_STUB_COMMANDS to run real processes.".to_string())
      }
      _ => None,
    }
  }
}

/// Result type alias for cargo-shipyard
pub type ShipyardResult<T> = Result<T, ShipyardError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ShipyardResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ShipyardResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ShipyardError>,
{
  fn context(self, ctx: impl Into<String>) -> ShipyardResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ShipyardResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ShipyardError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
