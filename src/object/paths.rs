//! Mudlib path canonicalization
//!
//! Every script-visible path is absolute within the mudlib root and is
//! normalized before use. `..` components are resolved textually; a path
//! that would climb above the root is rejected rather than clamped.

use std::path::PathBuf;

use crate::errors::RuntimeError;

/// Canonicalize a script path against a working directory.
///
/// Paths starting with `/` are absolute within the mudlib; others resolve
/// against `cwd` (itself a canonical absolute path). A trailing `.c` is
/// stripped so `"/std/object.c"` and `"/std/object"` name the same
/// blueprint.
pub fn canonicalize(path: &str, cwd: &str) -> Result<String, RuntimeError> {
    if path.is_empty() {
        return Err(RuntimeError::path("empty path"));
    }
    let joined = if path.starts_with('/') {
        path.to_string()
    } else if cwd == "/" {
        format!("/{}", path)
    } else {
        format!("{}/{}", cwd, path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for comp in joined.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(RuntimeError::path(format!(
                        "path escapes mudlib root: {}",
                        path
                    )));
                }
            }
            other => parts.push(other),
        }
    }

    let mut canon = format!("/{}", parts.join("/"));
    if let Some(stripped) = canon.strip_suffix(".c") {
        canon = stripped.to_string();
    }
    if canon.is_empty() {
        canon = "/".to_string();
    }
    Ok(canon)
}

/// Filesystem location of the source file for a canonical path.
pub fn source_file(root: &std::path::Path, canon: &str) -> PathBuf {
    root.join(format!("{}.c", &canon[1..]))
}

/// Filesystem location of an arbitrary data file for a canonical path.
pub fn data_file(root: &std::path::Path, canon: &str) -> PathBuf {
    root.join(&canon[1..])
}

/// Save files live next to the name the script gave, with `.o` appended.
pub fn save_file(root: &std::path::Path, canon: &str) -> PathBuf {
    root.join(format!("{}.o", &canon[1..]))
}

/// The last path component, used for `present` matching.
pub fn basename(canon: &str) -> &str {
    canon.rsplit('/').next().unwrap_or(canon)
}
