//! Filesystem helpers for symlink handling.

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

/// Read a symlink and return its target as an absolute path.
///
/// Relative targets are joined onto `currdir` and canonicalized;
/// absolute targets are returned as-is (the sandbox check
/// canonicalizes them anyway).
///
/// # Errors
///
/// Propagates readlink failure, and canonicalization failure for
/// relative targets that point at nothing.
pub fn resolve_link_target(link: &Path, currdir: &Path) -> io::Result<PathBuf> {
    let dest = fs::read_link(link)?;

    if dest.is_absolute() {
        Ok(dest)
    } else {
        fs::canonicalize(currdir.join(dest))
    }
}

/// Relative path from `base` to `dest`, both absolute.
///
/// Mirrors the usual relpath semantics: strip the common component
/// prefix, climb out of what remains of `base` with `..`, descend into
/// the rest of `dest`. Identical inputs yield `.`.
#[must_use]
pub fn relative_path(dest: &Path, base: &Path) -> PathBuf {
    let dest_parts: Vec<Component<'_>> = dest.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = dest_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(d, b)| d == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &dest_parts[common..] {
        out.push(part);
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
