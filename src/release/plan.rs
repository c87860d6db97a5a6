//! Publish planning: which crates ship, and in what order
//!
//! A crate is skipped when its manifest forbids publishing (this wins over
//! configuration) or when `publish.exclude` names it. The rest are published,
//! either in the validated `publish.order` or in dependency order.

use crate::core::config::{PatchStrategy, PublishConfig};
use crate::core::error::{PublishPlanError, ShipyardResult};
use crate::graph::{Package, WorkspaceGraph, publish_order};
use crate::utils::display_path;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resolved plan; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
  pub workspace_root: PathBuf,
  pub patch_strategy: PatchStrategy,
  /// In publish order
  pub publishable: Vec<Package>,
  pub skipped_by_manifest: Vec<String>,
  pub skipped_by_configuration: Vec<String>,
  /// Names in `publish.exclude` that match no workspace crate
  pub missing_configuration_exclusions: Vec<String>,
  /// Skipped crates that still inherit the workspace readme or license-file
  pub skipped_shared_file_users: Vec<Package>,
}

impl PublishPlan {
  pub fn publishable_names(&self) -> Vec<&str> {
    self.publishable.iter().map(|p| p.name.as_str()).collect()
  }

  pub fn publishable_set(&self) -> BTreeSet<String> {
    self.publishable.iter().map(|p| p.name.clone()).collect()
  }

  pub fn is_empty(&self) -> bool {
    self.publishable.is_empty()
  }

  /// Every crate that gets a staged directory: publishable ones first, in order
  pub fn staged_packages(&self) -> impl Iterator<Item = &Package> {
    self.publishable.iter().chain(&self.skipped_shared_file_users)
  }

  pub fn workspace_root(&self) -> &Path {
    &self.workspace_root
  }

  /// SHA-256 over the ordered `name@version` pairs
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    for package in &self.publishable {
      hasher.update(package.name.as_bytes());
      hasher.update(b"@");
      hasher.update(package.version.as_bytes());
      hasher.update(b"\n");
    }
    hasher
      .finalize()
      .iter()
      .map(|byte| format!("{:02x}", byte))
      .collect()
  }

  /// Human-readable plan, one item per line, with a trailing newline
  pub fn render(&self) -> String {
    let mut lines = vec![
      format!("Publish plan for workspace: {}", display_path(&self.workspace_root)),
      format!("Patch strategy: {}", self.patch_strategy),
    ];

    if self.publishable.is_empty() {
      lines.push("Publishable crates: none".to_string());
    } else {
      lines.push("Publishable crates (in order):".to_string());
      lines.extend(self.publishable.iter().map(|p| format!("- {}", p.name)));
    }

    let sections = [
      ("Skipped (publish disabled in manifest):", &self.skipped_by_manifest),
      ("Skipped (excluded by configuration):", &self.skipped_by_configuration),
      ("Configured exclusions not found in workspace:", &self.missing_configuration_exclusions),
    ];
    for (title, names) in sections {
      if names.is_empty() {
        continue;
      }
      lines.push(title.to_string());
      lines.extend(names.iter().map(|name| format!("- {}", name)));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
  }
}

/// Builds a `PublishPlan` from the workspace graph and `[publish]` settings
pub struct PublishPlanner<'a> {
  graph: &'a WorkspaceGraph,
  config: &'a PublishConfig,
}

impl<'a> PublishPlanner<'a> {
  pub fn new(graph: &'a WorkspaceGraph, config: &'a PublishConfig) -> Self {
    Self { graph, config }
  }

  pub fn plan(&self) -> ShipyardResult<PublishPlan> {
    let excluded: BTreeSet<&str> = self
      .config
      .exclude
      .iter()
      .map(|s| s.trim())
      .filter(|s| !s.is_empty())
      .collect();

    let mut skipped_by_manifest = Vec::new();
    let mut skipped_by_configuration = Vec::new();
    let mut publishable = BTreeSet::new();

    for package in self.graph.packages() {
      if !package.publishable {
        skipped_by_manifest.push(package.name.clone());
      } else if excluded.contains(package.name.as_str()) {
        skipped_by_configuration.push(package.name.clone());
      } else {
        publishable.insert(package.name.clone());
      }
    }

    let missing_configuration_exclusions: Vec<String> = excluded
      .iter()
      .filter(|name| !self.graph.contains(name))
      .map(|name| name.to_string())
      .collect();

    let order = match &self.config.order {
      Some(order) => self.explicit_order(order, &publishable)?,
      None => publish_order(&self.graph.subgraph(&publishable)).map_err(PublishPlanError::Cycle)?,
    };

    let publishable: Vec<Package> = order
      .iter()
      .filter_map(|name| self.graph.package(name).cloned())
      .collect();
    let skipped_shared_file_users: Vec<Package> = self
      .graph
      .packages()
      .iter()
      .filter(|p| !order.contains(&p.name))
      .filter(|p| p.uses_shared_readme || p.uses_shared_license)
      .cloned()
      .collect();

    info!(
      publishable = publishable.len(),
      skipped_by_manifest = skipped_by_manifest.len(),
      skipped_by_configuration = skipped_by_configuration.len(),
      "publish plan resolved"
    );

    Ok(PublishPlan {
      workspace_root: self.graph.root().to_path_buf(),
      patch_strategy: self.config.patch_strategy,
      publishable,
      skipped_by_manifest,
      skipped_by_configuration,
      missing_configuration_exclusions,
      skipped_shared_file_users,
    })
  }

  /// Validate `publish.order` against the publishable set, reporting every problem at once
  fn explicit_order(&self, order: &[String], publishable: &BTreeSet<String>) -> ShipyardResult<Vec<String>> {
    let mut unknown = Vec::new();
    let mut duplicates = Vec::new();
    let mut seen = BTreeSet::new();

    for name in order {
      if !publishable.contains(name) {
        if !unknown.contains(name) {
          unknown.push(name.clone());
        }
      } else if !seen.insert(name.as_str()) && !duplicates.contains(name) {
        duplicates.push(name.clone());
      }
    }
    let missing: Vec<&str> = publishable
      .iter()
      .map(String::as_str)
      .filter(|name| !seen.contains(name))
      .collect();

    let mut violations = Vec::new();
    if !unknown.is_empty() {
      violations.push(format!("unknown or unpublishable crates: {}", unknown.join(", ")));
    }
    if !duplicates.is_empty() {
      violations.push(format!("duplicate entries: {}", duplicates.join(", ")));
    }
    if !missing.is_empty() {
      violations.push(format!("missing publishable crates: {}", missing.join(", ")));
    }
    if !violations.is_empty() {
      return Err(PublishPlanError::InvalidOrder { violations }.into());
    }

    self.warn_on_dependency_inversions(order);
    Ok(order.to_vec())
  }

  fn warn_on_dependency_inversions(&self, order: &[String]) {
    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
    for (i, name) in order.iter().enumerate() {
      for dep in self.graph.ordering_dependencies(name) {
        if position.get(dep).is_some_and(|&p| p > i) {
          warn!(krate = %name, dependency = %dep, "publish.order lists a crate before its dependency");
        }
      }
    }
  }
}
