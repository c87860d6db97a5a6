//! Workspace staging: an isolated copy to package and publish from
//!
//! The live workspace is never modified. Everything below happens in
//! `<build-dir>/<workspace-dir-name>`:
//!
//! 1. Validate the build directory against the workspace (before any copy)
//! 2. Copy the workspace, skipping the top-level `target/`
//! 3. Copy the shared readme/license-file into crates that inherit them
//! 4. Rewrite `[patch.crates-io]` in the staged root manifest

use crate::cargo::manifest::{read_manifest, remove_patch_entries, remove_patch_table, workspace_package_str, write_manifest};
use crate::core::config::{PatchStrategy, PublishConfig};
use crate::core::error::{ResultExt, ShipyardError, ShipyardResult, StageError};
use crate::release::plan::PublishPlan;
use crate::utils::{absolutize, is_path_under};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PATCH_REGISTRY: &str = "crates-io";
const DEFAULT_README: &str = "README.md";

/// Copy of the workspace ready for packaging.
///
/// When no build directory was configured the copy lives in a temporary
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct StagedWorkspace {
  build_dir: PathBuf,
  root: PathBuf,
  package_dirs: BTreeMap<String, PathBuf>,
  _temp: Option<TempDir>,
}

impl StagedWorkspace {
  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  /// Staged workspace root
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.root.join("Cargo.toml")
  }

  /// Target directory for staged builds, outside the staged tree
  pub fn target_dir(&self) -> PathBuf {
    self.build_dir.join("target")
  }

  /// Staged directory of a publishable crate, or of a skipped one that inherits shared files
  pub fn package_dir(&self, name: &str) -> Option<&Path> {
    self.package_dirs.get(name).map(PathBuf::as_path)
  }
}

/// Prepares a `StagedWorkspace` for a plan
pub struct WorkspaceStager<'a> {
  plan: &'a PublishPlan,
  config: &'a PublishConfig,
  build_dir: Option<PathBuf>,
}

impl<'a> WorkspaceStager<'a> {
  pub fn new(plan: &'a PublishPlan, config: &'a PublishConfig) -> Self {
    Self {
      plan,
      config,
      build_dir: config.build_dir.clone(),
    }
  }

  /// Override the configured build directory
  pub fn with_build_dir(mut self, build_dir: Option<PathBuf>) -> Self {
    if build_dir.is_some() {
      self.build_dir = build_dir;
    }
    self
  }

  pub fn stage(&self) -> ShipyardResult<StagedWorkspace> {
    let workspace_root = absolutize(self.plan.workspace_root())?;

    let (build_dir, temp) = match &self.build_dir {
      Some(dir) => {
        let build_dir = absolutize(dir)?;
        check_build_dir(&build_dir, &workspace_root)?;
        (build_dir, None)
      }
      None => {
        let temp = tempfile::Builder::new().prefix("shipyard-").tempdir()?;
        (absolutize(temp.path())?, Some(temp))
      }
    };

    let dir_name = workspace_root
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_else(|| "workspace".into());
    let staged_root = build_dir.join(dir_name);

    if is_path_under(&staged_root, &workspace_root) {
      return Err(
        StageError::StagingInsideWorkspace {
          staging: staged_root,
          workspace_root,
        }
        .into(),
      );
    }
    if staged_root.exists() {
      return Err(StageError::StagingExists { path: staged_root }.into());
    }

    info!(
      from = %workspace_root.display(),
      to = %staged_root.display(),
      fingerprint = %self.plan.fingerprint(),
      "staging workspace"
    );
    fs::create_dir_all(&build_dir)
      .with_context(|| format!("Failed to create build directory {}", build_dir.display()))?;
    copy_tree(&workspace_root, &staged_root, self.config.preserve_symlinks, true)?;

    let package_dirs = self.package_dirs(&workspace_root, &staged_root)?;
    self.copy_shared_files(&workspace_root, &package_dirs)?;
    apply_patch_strategy(&staged_root.join("Cargo.toml"), self.plan)?;

    Ok(StagedWorkspace {
      build_dir,
      root: staged_root,
      package_dirs,
      _temp: temp,
    })
  }

  fn package_dirs(&self, workspace_root: &Path, staged_root: &Path) -> ShipyardResult<BTreeMap<String, PathBuf>> {
    let plan_root = self.plan.workspace_root();
    let mut dirs = BTreeMap::new();
    for package in self.plan.staged_packages() {
      let relative = match package.root_dir.strip_prefix(plan_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => absolutize(&package.root_dir)?
          .strip_prefix(workspace_root)
          .map(Path::to_path_buf)
          .map_err(|_| {
            ShipyardError::with_help(
              format!(
                "Crate `{}` at {} is outside the workspace {}",
                package.name,
                package.root_dir.display(),
                workspace_root.display()
              ),
              "Move the crate under the workspace root, or list it in `publish.exclude`.",
            )
          })?,
      };
      dirs.insert(package.name.clone(), staged_root.join(relative));
    }
    Ok(dirs)
  }

  fn copy_shared_files(&self, workspace_root: &Path, package_dirs: &BTreeMap<String, PathBuf>) -> ShipyardResult<()> {
    let needs_readme = self.plan.staged_packages().any(|p| p.uses_shared_readme);
    let needs_license = self.plan.staged_packages().any(|p| p.uses_shared_license);
    if !needs_readme && !needs_license {
      return Ok(());
    }

    let root_manifest = workspace_root.join("Cargo.toml");
    let doc = read_manifest(&root_manifest).map_err(|reason| StageError::Manifest {
      path: root_manifest.clone(),
      reason,
    })?;
    let readme = workspace_root.join(workspace_package_str(&doc, "readme").unwrap_or(DEFAULT_README));
    let license = workspace_package_str(&doc, "license-file").map(|p| workspace_root.join(p));

    for package in self.plan.staged_packages() {
      let Some(dest_dir) = package_dirs.get(&package.name) else {
        continue;
      };
      if package.uses_shared_readme {
        copy_shared_file(&package.name, "readme", &readme, dest_dir)?;
      }
      if package.uses_shared_license {
        let Some(license) = &license else {
          return Err(
            StageError::Manifest {
              path: root_manifest,
              reason: format!(
                "`{}` inherits license-file but [workspace.package] does not set one",
                package.name
              ),
            }
            .into(),
          );
        };
        copy_shared_file(&package.name, "license-file", license, dest_dir)?;
      }
    }
    Ok(())
  }
}

fn check_build_dir(build_dir: &Path, workspace_root: &Path) -> Result<(), StageError> {
  if is_path_under(build_dir, workspace_root) {
    return Err(StageError::BuildDirInsideWorkspace {
      build_dir: build_dir.to_path_buf(),
      workspace_root: workspace_root.to_path_buf(),
    });
  }
  if is_path_under(workspace_root, build_dir) {
    return Err(StageError::BuildDirContainsWorkspace {
      build_dir: build_dir.to_path_buf(),
      workspace_root: workspace_root.to_path_buf(),
    });
  }
  Ok(())
}

fn copy_shared_file(package: &str, kind: &'static str, source: &Path, dest_dir: &Path) -> ShipyardResult<()> {
  if !source.is_file() {
    return Err(
      StageError::MissingSharedFile {
        package: package.to_string(),
        kind,
        path: source.to_path_buf(),
      }
      .into(),
    );
  }
  let Some(file_name) = source.file_name() else {
    return Ok(());
  };
  let dest = dest_dir.join(file_name);
  debug!(krate = package, from = %source.display(), to = %dest.display(), "copying shared {}", kind);
  fs::copy(source, &dest).map_err(|source_err| StageError::Copy {
    from: source.to_path_buf(),
    to: dest,
    source: source_err,
  })?;
  Ok(())
}

/// Rewrite the staged root manifest's override table per the plan's strategy
pub fn apply_patch_strategy(manifest: &Path, plan: &PublishPlan) -> ShipyardResult<()> {
  if plan.patch_strategy == PatchStrategy::Disabled {
    return Ok(());
  }

  let manifest_err = |reason: String| StageError::Manifest {
    path: manifest.to_path_buf(),
    reason,
  };
  let mut doc = read_manifest(manifest).map_err(manifest_err)?;
  let changed = match plan.patch_strategy {
    PatchStrategy::All => remove_patch_table(&mut doc, PATCH_REGISTRY),
    PatchStrategy::PerCrate => remove_patch_entries(&mut doc, PATCH_REGISTRY, &plan.publishable_set()),
    PatchStrategy::Disabled => false,
  };

  if changed {
    info!(strategy = %plan.patch_strategy, "rewrote [patch.{}] in staged manifest", PATCH_REGISTRY);
    write_manifest(manifest, &doc).map_err(manifest_err)?;
  }
  Ok(())
}

fn copy_err(from: &Path, to: &Path) -> impl FnOnce(io::Error) -> StageError {
  let from = from.to_path_buf();
  let to = to.to_path_buf();
  move |source| StageError::Copy { from, to, source }
}

/// Recursively copy `source` into `target`; `top_level` skips `target/`
fn copy_tree(source: &Path, target: &Path, preserve_symlinks: bool, top_level: bool) -> Result<(), StageError> {
  fs::create_dir_all(target).map_err(copy_err(source, target))?;

  for entry in fs::read_dir(source).map_err(copy_err(source, target))? {
    let entry = entry.map_err(copy_err(source, target))?;
    let file_name = entry.file_name();
    if top_level && file_name == "target" {
      continue;
    }

    let source_path = entry.path();
    let target_path = target.join(&file_name);
    let file_type = entry.file_type().map_err(copy_err(&source_path, &target_path))?;

    if file_type.is_symlink() {
      if preserve_symlinks {
        let link = fs::read_link(&source_path).map_err(copy_err(&source_path, &target_path))?;
        make_symlink(&link, &source_path, &target_path).map_err(copy_err(&source_path, &target_path))?;
        continue;
      }
      // Follow the link and copy what it points at
      let resolved = fs::metadata(&source_path).map_err(copy_err(&source_path, &target_path))?;
      if resolved.is_dir() {
        copy_tree(&source_path, &target_path, preserve_symlinks, false)?;
      } else {
        fs::copy(&source_path, &target_path).map_err(copy_err(&source_path, &target_path))?;
      }
    } else if file_type.is_dir() {
      copy_tree(&source_path, &target_path, preserve_symlinks, false)?;
    } else {
      fs::copy(&source_path, &target_path).map_err(copy_err(&source_path, &target_path))?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, _source: &Path, target: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn make_symlink(link: &Path, source: &Path, target: &Path) -> io::Result<()> {
  if fs::metadata(source).map(|m| m.is_dir()).unwrap_or(false) {
    std::os::windows::fs::symlink_dir(link, target)
  } else {
    std::os::windows::fs::symlink_file(link, target)
  }
}
