//! Test helpers for integration tests
//!
//! Nothing here spawns cargo. Workspaces are written to a temp dir and the
//! `cargo metadata` document is generated from what was written, then served
//! through a `ScriptedRunner`.

use anyhow::{Context, Result};
use cargo_shipyard::cargo::metadata::metadata_command;
use cargo_shipyard::core::context::WorkspaceContext;
use cargo_shipyard::exec::{Scripted, ScriptedRunner};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How a test crate refers to another member
#[derive(Clone, Copy)]
pub enum Dep<'a> {
  Normal(&'a str),
  Dev(&'a str),
  Build(&'a str),
  /// `[dependencies] <alias> = { package = <name> }`
  Renamed(&'a str, &'a str),
}

struct TestCrate {
  name: String,
  version: String,
  publish: Value,
  deps: Vec<(String, Option<String>, Option<&'static str>)>,
}

/// A workspace on disk plus the metadata cargo would report for it
pub struct TestWorkspace {
  _root: TempDir,
  /// `<tmp>/ws`; the temp dir itself stays free for build directories
  pub path: PathBuf,
  crates: Vec<TestCrate>,
}

impl TestWorkspace {
  /// Create a new workspace with a root manifest
  pub fn new() -> Result<Self> {
    Self::with_root_manifest(
      r#"[workspace]
members = ["crates/*"]
resolver = "2"

[workspace.package]
version = "0.1.0"
edition = "2021"
license = "MIT"
"#,
    )
  }

  pub fn with_root_manifest(manifest: &str) -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("ws");
    std::fs::create_dir_all(&path)?;
    std::fs::write(path.join("Cargo.toml"), manifest)?;
    Ok(Self {
      _root: root,
      path,
      crates: Vec::new(),
    })
  }

  /// Temp dir that contains the workspace
  pub fn scratch(&self) -> &Path {
    self._root.path()
  }

  /// Add a publishable crate
  pub fn add_crate(&mut self, name: &str, deps: &[Dep]) -> Result<PathBuf> {
    self.add_crate_with(name, deps, Value::Null, "")
  }

  /// Add a crate with an explicit `publish` value and extra `[package]` lines
  pub fn add_crate_with(&mut self, name: &str, deps: &[Dep], publish: Value, package_extra: &str) -> Result<PathBuf> {
    let crate_path = self.path.join("crates").join(name);
    std::fs::create_dir_all(crate_path.join("src"))?;

    let mut manifest = format!(
      "[package]\nname = \"{}\"\nversion.workspace = true\nedition.workspace = true\n{}",
      name, package_extra
    );
    let mut sections: [(&str, String); 3] = [
      ("dependencies", String::new()),
      ("dev-dependencies", String::new()),
      ("build-dependencies", String::new()),
    ];
    let mut recorded = Vec::new();
    for dep in deps {
      let (section, line, entry) = match *dep {
        Dep::Normal(d) => (0, format!("{} = {{ path = \"../{}\" }}\n", d, d), (d, None, None)),
        Dep::Dev(d) => (1, format!("{} = {{ path = \"../{}\" }}\n", d, d), (d, None, Some("dev"))),
        Dep::Build(d) => (2, format!("{} = {{ path = \"../{}\" }}\n", d, d), (d, None, Some("build"))),
        Dep::Renamed(alias, d) => (
          0,
          format!("{} = {{ package = \"{}\", path = \"../{}\" }}\n", alias, d, d),
          (d, Some(alias), None),
        ),
      };
      sections[section].1.push_str(&line);
      recorded.push((entry.0.to_string(), entry.1.map(str::to_string), entry.2));
    }
    for (title, body) in &sections {
      if !body.is_empty() {
        manifest.push_str(&format!("\n[{}]\n{}", title, body));
      }
    }

    std::fs::write(crate_path.join("Cargo.toml"), manifest)?;
    std::fs::write(crate_path.join("src/lib.rs"), format!("//! {} crate\n", name))?;

    self.crates.push(TestCrate {
      name: name.to_string(),
      version: "0.1.0".to_string(),
      publish,
      deps: recorded,
    });
    Ok(crate_path)
  }

  /// Write a file relative to the workspace root
  pub fn write(&self, relative: &str, content: &str) -> Result<()> {
    let path = self.path.join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
  }

  fn id(&self, name: &str) -> String {
    format!("path+file://{}#{}@0.1.0", self.path.join("crates").join(name).display(), name)
  }

  /// What `cargo metadata --format-version 1 --no-deps` would print
  pub fn metadata_json(&self) -> String {
    let packages: Vec<Value> = self
      .crates
      .iter()
      .map(|krate| {
        let deps: Vec<Value> = krate
          .deps
          .iter()
          .map(|(name, rename, kind)| {
            json!({
              "name": name,
              "source": null,
              "req": "*",
              "kind": kind,
              "rename": rename,
              "optional": false,
              "path": self.path.join("crates").join(name),
            })
          })
          .collect();
        json!({
          "id": self.id(&krate.name),
          "name": krate.name,
          "version": krate.version,
          "manifest_path": self.path.join("crates").join(&krate.name).join("Cargo.toml"),
          "publish": krate.publish,
          "dependencies": deps,
        })
      })
      .collect();

    json!({
      "packages": packages,
      "workspace_members": self.crates.iter().map(|c| self.id(&c.name)).collect::<Vec<_>>(),
      "workspace_root": self.path,
      "target_directory": self.path.join("target"),
      "resolve": null,
      "version": 1,
    })
    .to_string()
  }

  /// Runner that answers `cargo metadata` and succeeds at everything else
  pub fn runner(&self) -> ScriptedRunner {
    self.serve_metadata(ScriptedRunner::new())
  }

  /// Add the `cargo metadata` answer to an existing script
  pub fn serve_metadata(&self, runner: ScriptedRunner) -> ScriptedRunner {
    let command = metadata_command(&self.path);
    let command: Vec<&str> = command.iter().map(String::as_str).collect();
    runner.on(&command, Scripted::success(self.metadata_json()))
  }

  /// Load config and graph exactly as the binary does
  pub fn context(&self, runner: &ScriptedRunner) -> Result<WorkspaceContext> {
    WorkspaceContext::build(&self.path, runner).map_err(|e| anyhow::anyhow!("{}", e))
  }
}

/// Command vectors whose first two words are `cargo <sub>`
pub fn cargo_calls(runner: &ScriptedRunner, sub: &str) -> Vec<Vec<String>> {
  runner
    .commands()
    .into_iter()
    .filter(|c| c.len() > 1 && c[0] == "cargo" && c[1] == sub)
    .collect()
}
