//! Utility functions for cross-platform path handling

use std::io;
use std::path::{Component, Path, PathBuf};

/// Join `path` onto `base` unless it is already absolute
pub fn absolute_from(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => match out.components().next_back() {
        Some(Component::Normal(_)) => {
          out.pop();
        }
        // `..` at the root stays at the root
        Some(Component::RootDir | Component::Prefix(_)) => {}
        _ => out.push(".."),
      },
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Absolute, symlink-resolved form of a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized and the missing remainder is
/// appended, so `/tmp/build` and `/private/tmp/build` compare equal on macOS
/// even before `build` is created.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
  let absolute = normalize_lexically(&absolute_from(&std::env::current_dir()?, path));

  let mut existing = absolute.as_path();
  let mut missing = Vec::new();
  loop {
    match existing.canonicalize() {
      Ok(canonical) => {
        let mut resolved = canonical;
        for part in missing.iter().rev() {
          resolved.push(part);
        }
        return Ok(resolved);
      }
      Err(e) => match (existing.parent(), existing.file_name()) {
        (Some(parent), Some(name)) => {
          missing.push(name.to_os_string());
          existing = parent;
        }
        _ => return Err(e),
      },
    }
  }
}

/// True when `path` equals `ancestor` or lies beneath it (component-wise)
pub fn is_path_under(path: &Path, ancestor: &Path) -> bool {
  path.starts_with(ancestor)
}

/// Render a path with forward slashes for user-facing output
pub fn display_path(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}
