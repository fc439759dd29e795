//! Local source directories backing cache points.

use std::path::{Component, Path, PathBuf};

use crate::domain::error::DomainError;

/// Validate a source path relative to the install root.
///
/// Leading and trailing slashes are dropped; absolute paths and `..`
/// segments are rejected.
pub fn normalize_source_path(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(DomainError::validation("source path must not be empty"));
    }

    let relative = safe_relative(trimmed)
        .ok_or_else(|| DomainError::validation(format!("source path `{raw}` escapes the root")))?;

    Ok(relative.to_string_lossy().into_owned())
}

/// Convert a URL-relative path into a filesystem path that stays below its base.
pub fn safe_relative(relative: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_path_is_trimmed() {
        assert_eq!(
            normalize_source_path("/themes/demo/").expect("valid"),
            "themes/demo"
        );
    }

    #[test]
    fn source_path_rejects_escape() {
        assert!(normalize_source_path("../etc").is_err());
        assert!(normalize_source_path("themes/../../etc").is_err());
        assert!(normalize_source_path("  ").is_err());
    }

    #[test]
    fn relative_path_stays_below_base() {
        assert_eq!(
            safe_relative("css/./style.css"),
            Some(PathBuf::from("css/style.css"))
        );
        assert_eq!(safe_relative("../secret"), None);
        assert_eq!(safe_relative(""), None);
    }
}
