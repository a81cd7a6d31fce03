//! Path sandboxing.
//!
//! The server only ever touches paths under an allowlist of directory
//! prefixes. Each entry pairs a real prefix with an alias prefix the
//! client may use instead; both are absolute and slash-terminated.
//! Request paths are rewritten alias→real, canonicalized (resolving
//! every symlink and `..`), and accepted only if the canonical result
//! still sits under a real prefix and is a regular file or directory.
//! Everything else on the filesystem is invisible.
//!
//! Prefix matching is byte-wise on the OS path bytes; the stored
//! trailing slash keeps it component-safe.

use std::{
    ffi::OsString,
    fs, io,
    os::unix::ffi::{OsStrExt, OsStringExt},
    path::{Path, PathBuf},
};

/// Ordered allowlist of `(real, alias)` prefix pairs.
#[derive(Debug, Default, Clone)]
pub struct Sandbox {
    /// Slash-terminated byte prefixes, checked in insertion order.
    prefixes: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Append a trailing slash unless one is present.
fn add_slash(p: &[u8]) -> Vec<u8> {
    let mut out = p.to_vec();
    if !out.ends_with(b"/") {
        out.push(b'/');
    }
    out
}

impl Sandbox {
    /// Empty sandbox; rejects every path until roots are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a directory, visible to clients under its own path.
    ///
    /// # Errors
    ///
    /// Propagates failure to make the path absolute.
    pub fn add_root(&mut self, real: impl AsRef<Path>) -> io::Result<()> {
        let real = std::path::absolute(real)?;
        let real = add_slash(real.as_os_str().as_bytes());
        tracing::debug!(real = %String::from_utf8_lossy(&real), "sandbox prefix added");
        self.prefixes.push((real.clone(), real));
        Ok(())
    }

    /// Allow a directory, visible to clients under `alias`.
    ///
    /// Several aliases may map to one real prefix; add each with its
    /// own call.
    ///
    /// # Errors
    ///
    /// Propagates failure to make either path absolute.
    pub fn add_alias(&mut self, real: impl AsRef<Path>, alias: impl AsRef<Path>) -> io::Result<()> {
        let real = std::path::absolute(real)?;
        let alias = std::path::absolute(alias)?;
        let real = add_slash(real.as_os_str().as_bytes());
        let alias = add_slash(alias.as_os_str().as_bytes());
        tracing::debug!(
            real = %String::from_utf8_lossy(&real),
            alias = %String::from_utf8_lossy(&alias),
            "sandbox prefix added"
        );
        self.prefixes.push((real, alias));
        Ok(())
    }

    /// True when no prefixes are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Rewrite any alias prefix in `path` to its real prefix.
    ///
    /// Handles three shapes per table entry: `alias/...` (prefix),
    /// `alias/` (exact), and `alias` without its trailing slash.
    #[must_use]
    pub fn resolve_alias(&self, path: &[u8]) -> Vec<u8> {
        let with_slash = add_slash(path);
        let mut current = path.to_vec();

        for (real, alias) in &self.prefixes {
            if current.starts_with(alias) {
                let mut rewritten = real.clone();
                rewritten.extend_from_slice(&current[alias.len()..]);
                current = rewritten;
            } else if current == *alias {
                current = real.clone();
            } else if with_slash == *alias {
                current = real[..real.len() - 1].to_vec();
            }
        }

        current
    }

    /// True if a canonical path sits under some real prefix (the
    /// prefix root itself, without its trailing slash, counts).
    #[must_use]
    pub fn contains(&self, canonical: &Path) -> bool {
        let bytes = canonical.as_os_str().as_bytes();
        self.prefixes
            .iter()
            .any(|(real, _)| bytes.starts_with(real) || bytes == &real[..real.len() - 1])
    }

    /// Resolve a client path to its canonical on-disk location.
    ///
    /// Returns `None` when the path escapes the sandbox, does not
    /// exist, or is neither a regular file nor a directory.
    #[must_use]
    pub fn resolve(&self, path: &[u8]) -> Option<PathBuf> {
        let unaliased = OsString::from_vec(self.resolve_alias(path));
        let canonical = fs::canonicalize(&unaliased).ok()?;

        if !self.contains(&canonical) {
            tracing::debug!(path = %canonical.display(), "path escapes sandbox");
            return None;
        }

        let meta = fs::metadata(&canonical).ok()?;
        (meta.is_file() || meta.is_dir()).then_some(canonical)
    }

    /// Like [`Self::resolve`], but only accepts regular files.
    #[must_use]
    pub fn resolve_file(&self, path: &[u8]) -> Option<PathBuf> {
        let canonical = self.resolve(path)?;
        canonical.is_file().then_some(canonical)
    }

    /// The alias-rewritten path as an `OsStr`-backed `PathBuf`, before
    /// any canonicalization. Symlink-ness of the client-visible path is
    /// tested against this.
    #[must_use]
    pub fn unaliased_path(&self, path: &[u8]) -> PathBuf {
        PathBuf::from(OsString::from_vec(self.resolve_alias(path)))
    }
}
