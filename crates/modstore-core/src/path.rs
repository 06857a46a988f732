//! Manifest path rules.
//!
//! Manifest and bucket paths are relative, `/`-separated and already clean:
//! no empty, `.` or `..` components, no leading slash. Newlines are rejected
//! because they would break the line-oriented manifest encoding.

use crate::error::{CasError, CasResult};

/// Check that a path is already in normalized form.
pub fn validate_path(path: &str) -> CasResult<()> {
    let invalid = |reason: &str| CasError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must be relative"));
    }
    if path.contains('\\') {
        return Err(invalid("path must use '/' separators"));
    }
    if path.contains('\n') || path.contains('\r') {
        return Err(invalid("path must not contain line breaks"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(invalid("path has an empty component")),
            "." | ".." => return Err(invalid("path has a relative component")),
            _ => {}
        }
    }
    Ok(())
}

/// Clean a relative path into normalized form.
///
/// Collapses repeated separators and `.` components and resolves `..`
/// against earlier components. Fails if the result escapes the root or is
/// empty.
pub fn normalize_path(path: &str) -> CasResult<String> {
    if path.starts_with('/') {
        return Err(CasError::InvalidPath {
            path: path.to_string(),
            reason: "path must be relative".to_string(),
        });
    }

    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(CasError::InvalidPath {
                        path: path.to_string(),
                        reason: "path escapes the root".to_string(),
                    });
                }
            }
            other => components.push(other),
        }
    }

    let normalized = components.join("/");
    validate_path(&normalized).map_err(|_| CasError::InvalidPath {
        path: path.to_string(),
        reason: "path does not normalize to a file path".to_string(),
    })?;
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_clean_paths() {
        for path in ["a.proto", "acme/weather/v1/weather.proto", "with space/x y"] {
            validate_path(path).unwrap();
        }
    }

    #[test]
    fn test_validate_rejects() {
        for path in [
            "",
            "/abs.proto",
            "a//b",
            "./a",
            "a/../b",
            "a/.",
            "dir/",
            "win\\path",
            "line\nbreak",
        ] {
            assert!(
                matches!(validate_path(path), Err(CasError::InvalidPath { .. })),
                "expected {:?} to be rejected",
                path
            );
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_path("./a//b/./c.proto").unwrap(), "a/b/c.proto");
        assert_eq!(normalize_path("a/x/../b").unwrap(), "a/b");
        assert!(normalize_path("../a").is_err());
        assert!(normalize_path("/a").is_err());
        assert!(normalize_path("a/..").is_err());
        assert!(normalize_path("").is_err());
    }
}
