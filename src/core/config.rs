//! Shipyard configuration (shipyard.toml)
//!
//! Searched in order: shipyard.toml, .shipyard.toml, .cargo/shipyard.toml,
//! .config/shipyard.toml. A workspace without any of them gets the defaults.
//!
//! # Example
//!
//! ```toml
//! [publish]
//! exclude = ["xtask"]
//! order = ["core", "utils", "app"]
//! patch_strategy = "per-crate"   # or "all", "disabled", true, false
//! timeout_secs = 1800
//!
//! [preflight]
//! unit_tests_only = true
//! exclude = ["integration-suite"]
//! aux_commands = [["cargo", "build", "-p", "lint-helper"]]
//! extern = { lint_helper = "target/debug/liblint_helper.so" }
//! env = { RUST_BACKTRACE = "1" }
//! ```

use crate::core::error::{ConfigError, ShipyardResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_ARTIFACT_TAIL_LINES: usize = 40;

/// How the staged root manifest's `[patch.crates-io]` table is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchStrategy {
  /// Leave the table untouched
  Disabled,
  /// Drop the whole override table
  All,
  /// Drop only entries for crates being published
  #[default]
  PerCrate,
}

impl PatchStrategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      PatchStrategy::Disabled => "disabled",
      PatchStrategy::All => "all",
      PatchStrategy::PerCrate => "per-crate",
    }
  }

  /// Parse the raw `patch_strategy` value (bool or name)
  pub fn from_raw(raw: &RawPatchStrategy) -> Result<Self, ConfigError> {
    match raw {
      RawPatchStrategy::Toggle(true) => Ok(PatchStrategy::All),
      RawPatchStrategy::Toggle(false) => Ok(PatchStrategy::Disabled),
      RawPatchStrategy::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
        "all" => Ok(PatchStrategy::All),
        "per-crate" | "per_crate" => Ok(PatchStrategy::PerCrate),
        "disabled" | "none" => Ok(PatchStrategy::Disabled),
        other => Err(ConfigError::Invalid {
          field: "publish.patch_strategy".to_string(),
          reason: format!("expected true, false, \"all\", \"per-crate\" or \"disabled\", got \"{}\"", other),
        }),
      },
    }
  }
}

impl fmt::Display for PatchStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `patch_strategy` as written in shipyard.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawPatchStrategy {
  Toggle(bool),
  Named(String),
}

/// On-disk shape of shipyard.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  #[serde(default)]
  publish: RawPublishConfig,
  #[serde(default)]
  preflight: PreflightConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPublishConfig {
  #[serde(default)]
  exclude: Vec<String>,
  #[serde(default)]
  order: Option<Vec<String>>,
  #[serde(default)]
  patch_strategy: Option<RawPatchStrategy>,
  #[serde(default)]
  dry_run_first: Option<bool>,
  #[serde(default)]
  build_dir: Option<PathBuf>,
  #[serde(default)]
  preserve_symlinks: Option<bool>,
  #[serde(default)]
  timeout_secs: Option<u64>,
  #[serde(default)]
  extra_already_published_markers: Vec<String>,
  #[serde(default)]
  registry: Option<String>,
}

/// Validated publishing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
  /// Crates never published, even when the manifest allows it
  pub exclude: Vec<String>,
  /// Explicit publish order; `None` derives it from the dependency graph
  pub order: Option<Vec<String>>,
  pub patch_strategy: PatchStrategy,
  /// Run `cargo publish --dry-run` before the live publish
  pub dry_run_first: bool,
  pub build_dir: Option<PathBuf>,
  pub preserve_symlinks: bool,
  pub timeout: Duration,
  pub extra_already_published_markers: Vec<String>,
  pub registry: Option<String>,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      exclude: Vec::new(),
      order: None,
      patch_strategy: PatchStrategy::default(),
      dry_run_first: true,
      build_dir: None,
      preserve_symlinks: true,
      timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      extra_already_published_markers: Vec::new(),
      registry: None,
    }
  }
}

/// Check and test settings run against the staged workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreflightConfig {
  /// Skip check and test entirely
  #[serde(default)]
  pub skip: bool,

  /// Test only `--lib --bins` targets
  #[serde(default)]
  pub unit_tests_only: bool,

  /// Crates passed to `cargo test --exclude`
  #[serde(default)]
  pub exclude: Vec<String>,

  /// Commands run before check/test, each an argv list
  #[serde(default)]
  pub aux_commands: Vec<Vec<String>>,

  /// Compiled helpers handed to test binaries as `--extern name=path`
  #[serde(default, rename = "extern")]
  pub externs: BTreeMap<String, PathBuf>,

  /// Environment overrides for the `cargo test` step only
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Lines of each referenced artifact echoed on test failure
  #[serde(default = "default_artifact_tail_lines")]
  pub artifact_tail_lines: usize,

  /// Per-command timeout for preflight steps (falls back to publish.timeout_secs)
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

fn default_artifact_tail_lines() -> usize {
  DEFAULT_ARTIFACT_TAIL_LINES
}

impl Default for PreflightConfig {
  fn default() -> Self {
    Self {
      skip: false,
      unit_tests_only: false,
      exclude: Vec::new(),
      aux_commands: Vec::new(),
      externs: BTreeMap::new(),
      env: BTreeMap::new(),
      artifact_tail_lines: DEFAULT_ARTIFACT_TAIL_LINES,
      timeout_secs: None,
    }
  }
}

impl PreflightConfig {
  fn validate(&self) -> Result<(), ConfigError> {
    if let Some(index) = self.aux_commands.iter().position(|cmd| cmd.is_empty()) {
      return Err(ConfigError::Invalid {
        field: format!("preflight.aux_commands[{}]", index),
        reason: "command must not be empty".to_string(),
      });
    }

    if self.externs.keys().any(|name| name.trim().is_empty()) {
      return Err(ConfigError::Invalid {
        field: "preflight.extern".to_string(),
        reason: "extern names must not be blank".to_string(),
      });
    }

    if self.timeout_secs == Some(0) {
      return Err(ConfigError::Invalid {
        field: "preflight.timeout_secs".to_string(),
        reason: "must be greater than zero".to_string(),
      });
    }

    Ok(())
  }
}

/// Validated configuration, threaded explicitly through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipyardConfig {
  pub publish: PublishConfig,
  pub preflight: PreflightConfig,
}

impl ShipyardConfig {
  /// Find config file in search order
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("shipyard.toml"),
      path.join(".shipyard.toml"),
      path.join(".cargo").join("shipyard.toml"),
      path.join(".config").join("shipyard.toml"),
    ];

    candidates.into_iter().find(|p| p.is_file())
  }

  /// Load config for a workspace, falling back to defaults when no file exists
  pub fn load(workspace_root: &Path) -> ShipyardResult<Self> {
    let Some(config_path) = Self::find_config_path(workspace_root) else {
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
      path: config_path.clone(),
      source,
    })?;

    Ok(Self::parse(&content).map_err(|err| match err {
      ConfigError::Parse { message, .. } => ConfigError::Parse {
        path: config_path.clone(),
        message,
      },
      other => other,
    })?)
  }

  /// Parse and validate config text
  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let raw: RawConfig = toml_edit::de::from_str(content).map_err(|e| ConfigError::Parse {
      path: PathBuf::from("shipyard.toml"),
      message: e.to_string(),
    })?;

    let RawPublishConfig {
      exclude,
      order,
      patch_strategy,
      dry_run_first,
      build_dir,
      preserve_symlinks,
      timeout_secs,
      extra_already_published_markers,
      registry,
    } = raw.publish;

    let patch_strategy = match patch_strategy {
      Some(raw) => PatchStrategy::from_raw(&raw)?,
      None => PatchStrategy::default(),
    };

    let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
      return Err(ConfigError::Invalid {
        field: "publish.timeout_secs".to_string(),
        reason: "must be greater than zero".to_string(),
      });
    }

    if let Some(registry) = &registry
      && registry.trim().is_empty()
    {
      return Err(ConfigError::Invalid {
        field: "publish.registry".to_string(),
        reason: "registry name must not be blank".to_string(),
      });
    }

    raw.preflight.validate()?;

    Ok(Self {
      publish: PublishConfig {
        exclude,
        order,
        patch_strategy,
        dry_run_first: dry_run_first.unwrap_or(true),
        build_dir,
        preserve_symlinks: preserve_symlinks.unwrap_or(true),
        timeout: Duration::from_secs(timeout_secs),
        extra_already_published_markers,
        registry,
      },
      preflight: raw.preflight,
    })
  }

  /// Timeout applied to preflight commands
  pub fn preflight_timeout(&self) -> Duration {
    self
      .preflight
      .timeout_secs
      .map(Duration::from_secs)
      .unwrap_or(self.publish.timeout)
  }
}
