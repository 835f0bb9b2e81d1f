//! Helpers for sanitizing names and paths before they reach archive names,
//! tracing span attributes or HTTP headers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the site layout.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short deterministic hash of a path, for ETags and correlation without
/// exposing the path itself.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Lowercase ASCII slug: runs of anything other than `[a-z0-9]` collapse to a
/// single `-`, leading and trailing dashes are dropped.
///
/// - `My Blog!` → `my-blog`
/// - `   ` → `site`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "site".to_string()
    } else {
        slug
    }
}

/// Cleans a caller-supplied archive file name so it is a single safe path
/// component. Returns `None` when nothing usable is left.
///
/// Directory parts are stripped, characters outside `[A-Za-z0-9._-]` become
/// `_`, and leading dots are removed so the result is never hidden or `..`.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/var/www/content/uploads/photo.jpg")),
            "photo.jpg"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_hash_path_deterministic() {
        let path = Path::new("/backups/site.sitepack");
        let h1 = hash_path(path);
        let h2 = hash_path(path);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_hash_path_different_paths_differ() {
        assert_ne!(hash_path(Path::new("/a/b")), hash_path(Path::new("/c/d")));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Blog!"), "my-blog");
        assert_eq!(slugify("  --Shop__2024-- "), "shop-2024");
        assert_eq!(slugify("???"), "site");
    }

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\temp\\nightly.sitepack").as_deref(),
            Some("nightly.sitepack")
        );
    }

    #[test]
    fn test_sanitize_filename_replaces_unsafe_characters() {
        assert_eq!(
            sanitize_filename("my backup (1).sitepack").as_deref(),
            Some("my_backup__1_.sitepack")
        );
        assert_eq!(sanitize_filename(".hidden").as_deref(), Some("hidden"));
    }

    #[test]
    fn test_sanitize_filename_rejects_empty() {
        assert!(sanitize_filename("").is_none());
        assert!(sanitize_filename("..").is_none());
        assert!(sanitize_filename("dir/").is_none());
        assert!(sanitize_filename("***").is_none());
    }
}
