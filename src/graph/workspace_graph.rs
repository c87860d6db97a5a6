//! Workspace dependency graph built from the `cargo metadata` document + petgraph
//!
//! ## Graph Structure
//!
//! - **Directed Graph**: `A → B` means "A depends on B"
//! - **Nodes**: Workspace members only; registry and git dependencies are dropped
//! - **Edges**: Dependency kind (normal/dev/build/unspecified); several edges
//!   between the same pair are kept when a crate depends on another twice
//! - **Index**: Lookups by crate name
//!
//! The graph is immutable once built. Filtering produces a new graph.

use crate::cargo::manifest::{inherits_workspace, read_manifest};
use crate::cargo::metadata::load_metadata_json;
use crate::core::error::{ShipyardResult, WorkspaceModelError};
use crate::exec::CommandRunner;
use crate::utils::normalize_lexically;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Dependency section a manifest entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
  Normal,
  Dev,
  Build,
  /// Kind not recorded in the document; ordered like `Normal`
  Unspecified,
}

impl DependencyKind {
  /// Dev-dependencies are stripped by `cargo package`, so they never force an order
  pub fn gates_publish_order(self) -> bool {
    !matches!(self, DependencyKind::Dev)
  }

  /// `None` when the key is absent, `Some(None)` for an explicit `null`
  fn parse(value: Option<Option<&str>>) -> Result<Self, String> {
    match value {
      None => Ok(DependencyKind::Unspecified),
      Some(None | Some("normal")) => Ok(DependencyKind::Normal),
      Some(Some("dev")) => Ok(DependencyKind::Dev),
      Some(Some("build")) => Ok(DependencyKind::Build),
      Some(Some(other)) => Err(other.to_string()),
    }
  }
}

impl fmt::Display for DependencyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      DependencyKind::Normal => "normal",
      DependencyKind::Dev => "dev",
      DependencyKind::Build => "build",
      DependencyKind::Unspecified => "unspecified",
    };
    f.write_str(s)
  }
}

/// Edge to another workspace member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub target_id: String,
  /// Current package name of the target
  pub name: String,
  /// Key used in the depending manifest; differs from `name` when renamed
  pub manifest_name: String,
  pub kind: DependencyKind,
}

/// A workspace member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub id: String,
  pub name: String,
  /// Opaque; never parsed as semver
  pub version: String,
  pub manifest_path: PathBuf,
  pub root_dir: PathBuf,
  pub publishable: bool,
  /// `readme.workspace = true`
  pub uses_shared_readme: bool,
  /// `license-file.workspace = true`
  pub uses_shared_license: bool,
  pub dependencies: Vec<Dependency>,
}

impl Package {
  /// Minimal eligible package rooted at `root_dir`, for building graphs by hand
  pub fn new(name: impl Into<String>, version: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
    let name = name.into();
    let root_dir = root_dir.into();
    Self {
      id: format!("path+file://{}#{}", root_dir.display(), name),
      manifest_path: root_dir.join("Cargo.toml"),
      name,
      version: version.into(),
      root_dir,
      publishable: true,
      uses_shared_readme: false,
      uses_shared_license: false,
      dependencies: Vec::new(),
    }
  }
}

/// Workspace packages and their intra-workspace dependencies
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
  root: PathBuf,
  packages: Vec<Package>,
  /// Node weight is the index into `packages`
  graph: DiGraph<usize, DependencyKind>,
  name_to_node: HashMap<String, NodeIndex>,
}

impl WorkspaceGraph {
  /// Build from packages in workspace order.
  ///
  /// Package names must be unique and every dependency must target a package
  /// in the list.
  pub fn new(root: impl Into<PathBuf>, packages: Vec<Package>) -> ShipyardResult<Self> {
    let mut graph = DiGraph::new();
    let mut name_to_node = HashMap::new();
    let mut id_to_node = HashMap::new();

    for (idx, package) in packages.iter().enumerate() {
      let node = graph.add_node(idx);
      if name_to_node.insert(package.name.clone(), node).is_some() {
        return Err(
          WorkspaceModelError::DuplicateName {
            name: package.name.clone(),
          }
          .into(),
        );
      }
      id_to_node.insert(package.id.clone(), node);
    }

    for package in &packages {
      let from = name_to_node[&package.name];
      for dep in &package.dependencies {
        let to = *id_to_node
          .get(&dep.target_id)
          .ok_or_else(|| WorkspaceModelError::MissingMember {
            id: dep.target_id.clone(),
          })?;
        graph.add_edge(from, to, dep.kind);
      }
    }

    Ok(Self {
      root: root.into(),
      packages,
      graph,
      name_to_node,
    })
  }

  /// Run `cargo metadata --no-deps` on `workspace_root` through `runner` and build the graph
  pub fn load(workspace_root: &Path, runner: &dyn CommandRunner) -> ShipyardResult<Self> {
    let json = load_metadata_json(workspace_root, runner)?;
    Self::from_metadata_json(&json)
  }

  /// Build from a `cargo metadata --format-version 1` document.
  ///
  /// Package manifests are read to detect workspace-inherited readme and
  /// license-file.
  pub fn from_metadata_json(json: &str) -> ShipyardResult<Self> {
    let doc: MetadataDoc = serde_json::from_str(json).map_err(WorkspaceModelError::from)?;
    let members = member_packages(&doc)?;
    let dirs = members.iter().map(|p| package_dir(p)).collect::<Result<Vec<_>, _>>()?;

    let dir_to_member: HashMap<PathBuf, usize> = dirs
      .iter()
      .enumerate()
      .map(|(i, dir)| (normalize_lexically(dir), i))
      .collect();
    let name_to_member: HashMap<&str, usize> = members.iter().enumerate().map(|(i, p)| (p.name.as_str(), i)).collect();

    let mut packages = Vec::with_capacity(members.len());
    for (pkg, root_dir) in members.iter().zip(dirs) {
      let mut dependencies = Vec::new();
      for dep in &pkg.dependencies {
        let target = dep
          .path
          .as_ref()
          .and_then(|path| dir_to_member.get(&normalize_lexically(path)))
          .or_else(|| {
            // Without a path only an unsourced entry can refer to a member
            (dep.path.is_none() && dep.source.is_none())
              .then(|| name_to_member.get(dep.name.as_str()))
              .flatten()
          });
        let Some(&target) = target else {
          continue;
        };
        let target = members[target];
        let kind = dep.kind.as_ref().map(|kind| kind.as_deref());
        dependencies.push(Dependency {
          target_id: target.id.clone(),
          name: target.name.clone(),
          manifest_name: dep.rename.clone().unwrap_or_else(|| dep.name.clone()),
          kind: DependencyKind::parse(kind).map_err(|kind| WorkspaceModelError::UnsupportedKind {
            package: pkg.name.clone(),
            dependency: dep.name.clone(),
            kind,
          })?,
        });
      }
      let manifest = read_manifest(&pkg.manifest_path).map_err(|reason| WorkspaceModelError::Manifest {
        path: pkg.manifest_path.clone(),
        reason,
      })?;

      packages.push(Package {
        id: pkg.id.clone(),
        name: pkg.name.clone(),
        version: pkg.version.clone(),
        manifest_path: pkg.manifest_path.clone(),
        root_dir,
        publishable: PublishField::allows_publish(pkg.publish.as_ref()),
        uses_shared_readme: inherits_workspace(&manifest, "readme"),
        uses_shared_license: inherits_workspace(&manifest, "license-file"),
        dependencies,
      });
    }

    Self::new(doc.workspace_root.clone(), packages)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Packages in workspace order
  pub fn packages(&self) -> &[Package] {
    &self.packages
  }

  pub fn package(&self, name: &str) -> Option<&Package> {
    self.name_to_node.get(name).map(|node| &self.packages[self.graph[*node]])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.name_to_node.contains_key(name)
  }

  pub fn names(&self) -> Vec<&str> {
    self.packages.iter().map(|p| p.name.as_str()).collect()
  }

  pub fn len(&self) -> usize {
    self.packages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  /// Names of the members `name` must wait for before it can be published
  pub fn ordering_dependencies(&self, name: &str) -> BTreeSet<&str> {
    let Some(&node) = self.name_to_node.get(name) else {
      return BTreeSet::new();
    };
    self
      .graph
      .edges_directed(node, Direction::Outgoing)
      .filter(|edge| edge.weight().gates_publish_order())
      .map(|edge| self.packages[self.graph[edge.target()]].name.as_str())
      .collect()
  }

  /// Graph restricted to `names`, keeping only edges between kept packages
  pub fn subgraph(&self, names: &BTreeSet<String>) -> Self {
    let kept: Vec<Package> = self
      .packages
      .iter()
      .filter(|p| names.contains(&p.name))
      .map(|p| {
        let mut p = p.clone();
        p.dependencies.retain(|dep| names.contains(&dep.name));
        p
      })
      .collect();

    let mut graph = DiGraph::new();
    let mut name_to_node = HashMap::new();
    let mut id_to_node = HashMap::new();
    for (idx, package) in kept.iter().enumerate() {
      let node = graph.add_node(idx);
      name_to_node.insert(package.name.clone(), node);
      id_to_node.insert(package.id.clone(), node);
    }
    for package in &kept {
      let from = name_to_node[&package.name];
      for dep in &package.dependencies {
        graph.add_edge(from, id_to_node[&dep.target_id], dep.kind);
      }
    }

    Self {
      root: self.root.clone(),
      packages: kept,
      graph,
      name_to_node,
    }
  }
}

/// The subset of `cargo metadata --format-version 1` the graph needs
#[derive(Debug, Deserialize)]
struct MetadataDoc {
  workspace_root: PathBuf,
  packages: Vec<MetadataPackage>,
  workspace_members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
  id: String,
  name: String,
  version: String,
  manifest_path: PathBuf,
  #[serde(default)]
  publish: Option<PublishField>,
  #[serde(default)]
  dependencies: Vec<MetadataDependency>,
}

/// `publish` is `null` (any registry), a bool, or the allowed registry list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PublishField {
  Toggle(bool),
  Registries(Vec<String>),
}

impl PublishField {
  fn allows_publish(field: Option<&PublishField>) -> bool {
    match field {
      None => true,
      Some(PublishField::Toggle(allowed)) => *allowed,
      Some(PublishField::Registries(registries)) => !registries.is_empty(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct MetadataDependency {
  name: String,
  #[serde(default)]
  rename: Option<String>,
  #[serde(default)]
  source: Option<String>,
  #[serde(default)]
  path: Option<PathBuf>,
  /// Outer `None`: key absent. Inner `None`: explicit `null`
  #[serde(default, deserialize_with = "present")]
  kind: Option<Option<String>>,
}

/// Deserialize a key that is present, keeping `null` distinct from absent
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  T::deserialize(deserializer).map(Some)
}

/// Workspace members in `workspace_members` order, deduplicated
fn member_packages(doc: &MetadataDoc) -> Result<Vec<&MetadataPackage>, WorkspaceModelError> {
  let by_id: HashMap<&str, &MetadataPackage> = doc.packages.iter().map(|p| (p.id.as_str(), p)).collect();

  let mut seen = BTreeSet::new();
  let mut members = Vec::with_capacity(doc.workspace_members.len());
  for id in &doc.workspace_members {
    if !seen.insert(id.as_str()) {
      continue;
    }
    let package = by_id
      .get(id.as_str())
      .copied()
      .ok_or_else(|| WorkspaceModelError::MissingMember { id: id.clone() })?;
    members.push(package);
  }
  Ok(members)
}

fn package_dir(package: &MetadataPackage) -> Result<PathBuf, WorkspaceModelError> {
  package
    .manifest_path
    .parent()
    .map(Path::to_path_buf)
    .ok_or_else(|| WorkspaceModelError::Field {
      field: format!("{}.manifest_path", package.name),
    })
}
