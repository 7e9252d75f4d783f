//! Link-target computation and destination directory preparation.
//!
//! # Design
//! - Target text is computed lexically, never by touching the filesystem, so
//!   the text written into the link is exactly what `read_link` returns.
//! - Relative targets carry no leading current-directory marker.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{LinkError, LinkResult};
use crate::model::LinkMode;

/// Compute the link target text for `source` placed in `link_dir`, anchored
/// at the process working directory.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined.
pub fn link_target(source: &Path, link_dir: &Path, mode: LinkMode) -> LinkResult<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|err| LinkError::io("link_target.current_dir", source, err))?;
    Ok(link_target_in(source, link_dir, mode, &cwd))
}

/// Pure form of [`link_target`] with an explicit anchor directory.
#[must_use]
pub fn link_target_in(source: &Path, link_dir: &Path, mode: LinkMode, cwd: &Path) -> PathBuf {
    let source_abs = absolutize(source, cwd);
    match mode {
        LinkMode::Absolute => source_abs,
        LinkMode::Relative => relative_from(&source_abs, &absolutize(link_dir, cwd)),
    }
}

/// Re-anchor `path` through `cwd` and fold `.`/`..` components lexically.
#[must_use]
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            // Popping at the root is a no-op, which swallows excess `..`.
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Relative path from `base` to `target`; both must be absolute and
/// normalised. Yields `.` only when the two paths are identical. Paths on
/// different prefixes (drive letters, UNC shares) admit no relative walk and
/// yield the target unchanged.
#[must_use]
pub fn relative_from(target: &Path, base: &Path) -> PathBuf {
    let target_components: Vec<Component<'_>> = target.components().collect();
    let base_components: Vec<Component<'_>> = base.components().collect();

    if let (Some(Component::Prefix(target_prefix)), Some(Component::Prefix(base_prefix))) =
        (target_components.first(), base_components.first())
    {
        if target_prefix != base_prefix {
            return target.to_path_buf();
        }
    }

    let mut shared = 0;
    while shared < target_components.len()
        && shared < base_components.len()
        && target_components[shared] == base_components[shared]
    {
        shared += 1;
    }

    let mut out = PathBuf::new();
    for _ in shared..base_components.len() {
        out.push(Component::ParentDir);
    }
    for component in &target_components[shared..] {
        out.push(component);
    }
    if out.as_os_str().is_empty() {
        out.push(Component::CurDir);
    }
    out
}

/// Ensure `dir` and any missing ancestors exist.
///
/// Idempotent; a concurrent creator racing us to the same path is treated as
/// success.
///
/// # Errors
///
/// Returns an error when directory creation fails for any reason other than
/// the path already existing.
pub fn ensure_dir(dir: &Path) -> LinkResult<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(LinkError::io("prepare_directory.create_all", dir, err)),
    }
}
