// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lexical path normalization

use std::path::{Component, Path, PathBuf};

use crate::error::{LinkfsError, LinkfsResult};

/// Normalizes `path` into an absolute path without `.`/`..` components.
///
/// Relative paths are joined onto `base`; without a base they are rejected.
/// Symlinks are not resolved: the table works on names, not inodes.
pub fn normalize(path: &Path, base: Option<&Path>) -> LinkfsResult<PathBuf> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(LinkfsError::InvalidPath("empty path".to_string()));
    }
    if contains_nul(path) {
        return Err(LinkfsError::InvalidPath(format!(
            "path contains NUL: {}",
            path.display()
        )));
    }

    let joined;
    let path = if path.is_absolute() {
        path
    } else {
        match base {
            Some(base) if base.is_absolute() => {
                joined = base.join(path);
                joined.as_path()
            }
            _ => {
                return Err(LinkfsError::InvalidPath(format!(
                    "relative path without an absolute base: {}",
                    path.display()
                )))
            }
        }
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping at the root is a no-op, like the kernel does.
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn contains_nul(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().contains(&0)
}

#[cfg(not(unix))]
fn contains_nul(path: &Path) -> bool {
    path.to_string_lossy().contains('\0')
}

/// Number of normal components in a relative path.
pub(crate) fn depth(rel: &Path) -> usize {
    rel.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}
