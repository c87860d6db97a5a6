//! Cargo.toml reading and lossless editing via `toml_edit`

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use toml_edit::{DocumentMut, Item};

/// Parse a manifest, keeping formatting and comments
pub fn read_manifest(path: &Path) -> Result<DocumentMut, String> {
  let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
  content.parse::<DocumentMut>().map_err(|e| e.to_string())
}

/// Write a manifest back out
pub fn write_manifest(path: &Path, doc: &DocumentMut) -> Result<(), String> {
  fs::write(path, doc.to_string()).map_err(|e| e.to_string())
}

/// True when `[package] <key>.workspace = true`, in either inline or dotted form
pub fn inherits_workspace(doc: &DocumentMut, key: &str) -> bool {
  doc
    .get("package")
    .and_then(|package| package.get(key))
    .and_then(|field| field.get("workspace"))
    .and_then(Item::as_bool)
    .unwrap_or(false)
}

/// String value of `[workspace.package] <key>`
pub fn workspace_package_str<'a>(doc: &'a DocumentMut, key: &str) -> Option<&'a str> {
  doc
    .get("workspace")
    .and_then(|ws| ws.get("package"))
    .and_then(|package| package.get(key))
    .and_then(Item::as_str)
}

fn is_empty_table(item: &Item) -> bool {
  match item {
    Item::Table(table) => table.is_empty(),
    Item::Value(value) => value.as_inline_table().is_some_and(|t| t.is_empty()),
    _ => false,
  }
}

/// Remove `[patch.<registry>]` entirely, then `[patch]` if nothing is left.
///
/// Returns true when the document changed.
pub fn remove_patch_table(doc: &mut DocumentMut, registry: &str) -> bool {
  let Some(patch) = doc.get_mut("patch").and_then(Item::as_table_like_mut) else {
    return false;
  };
  let removed = patch.remove(registry).is_some();
  prune_patch(doc);
  removed
}

/// Remove the named entries from `[patch.<registry>]`, pruning tables left empty.
///
/// Returns true when the document changed.
pub fn remove_patch_entries(doc: &mut DocumentMut, registry: &str, names: &BTreeSet<String>) -> bool {
  let Some(entries) = doc
    .get_mut("patch")
    .and_then(|patch| patch.get_mut(registry))
    .and_then(Item::as_table_like_mut)
  else {
    return false;
  };

  let keys: Vec<String> = entries
    .iter()
    .map(|(key, _)| key.to_string())
    .filter(|key| names.contains(key))
    .collect();
  for key in &keys {
    entries.remove(key);
  }

  prune_patch(doc);
  !keys.is_empty()
}

fn prune_patch(doc: &mut DocumentMut) {
  let Some(patch) = doc.get_mut("patch").and_then(Item::as_table_like_mut) else {
    return;
  };
  let empty: Vec<String> = patch
    .iter()
    .filter(|(_, item)| is_empty_table(item))
    .map(|(key, _)| key.to_string())
    .collect();
  for key in &empty {
    patch.remove(key);
  }
  if patch.is_empty() {
    doc.remove("patch");
  }
}
