//! Filesystem naming helpers.
//!
//! Everything written to disk goes through this module: titles and declared
//! attachment names are reduced to a filesystem- and URL-safe form, and
//! candidate filenames are made unique within their target directory by
//! appending a numeric counter before the extension.

use std::{fs, path::Path};

use log::debug;

use crate::{DumpError, Result};

/// Maximum length for a filename base, applied before the extension.
pub const MAX_BASE_LEN: usize = 128;

/// Returns a filesystem- and URL-safe version of `input`.
///
/// Characters outside the allow-list (letters, digits, `.`, `_`, `-`) are
/// dropped, whitespace runs collapse to a single space, and the result is
/// trimmed. Applying the function twice yields the same string.
pub fn url_safe_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true; // leading whitespace is trimmed

    for c in input.chars() {
        if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    out.trim_end().to_string()
}

/// Truncates a filename base to [`MAX_BASE_LEN`] characters, respecting
/// character boundaries.
pub fn truncate_base(base: &str) -> String {
    base.chars().take(MAX_BASE_LEN).collect()
}

/// Resolves a filename collision without touching the filesystem.
///
/// Returns `base.ext` when `exists` reports it free, otherwise the first
/// free `base_<n>.ext` with n counting up from 1.
pub fn resolve_collision<F>(base: &str, ext: &str, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let candidate = join_ext(base, ext);
    if !exists(&candidate) {
        return candidate;
    }

    let mut counter = 1usize;
    loop {
        let candidate = join_ext(&format!("{}_{}", base, counter), ext);
        if !exists(&candidate) {
            debug!("Resolved filename collision: {}", candidate);
            return candidate;
        }
        counter += 1;
    }
}

/// Binds [`resolve_collision`] to the contents of a real directory.
///
/// A directory that does not exist yet cannot hold collisions, so the
/// candidate is returned unchanged.
pub fn unique_in_dir(dir: &Path, filename: &str) -> String {
    let (base, ext) = split_ext(filename);
    resolve_collision(base, ext, |name| dir.join(name).exists())
}

/// Ensures `path` exists as a directory, creating parents as needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|_| DumpError::DirectoryError {
        path: path.to_path_buf(),
    })
}

fn join_ext(base: &str, ext: &str) -> String {
    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, ext)
    }
}

/// Splits `filename` at the last dot. A name without a dot has an empty
/// extension.
pub fn split_ext(filename: &str) -> (&str, &str) {
    match filename.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, ext),
        _ => (filename, ""),
    }
}
