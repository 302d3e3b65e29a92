use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::address::is_contained;

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("invalid domain {0:?}")]
    Domain(String),
    #[error("invalid path {path:?}: {reason}")]
    Path { path: String, reason: &'static str },
}

/// Where one published path ends up: the URL it is served from and the
/// file that backs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub url: String,
    pub file: PathBuf,
}

impl Target {
    pub fn new(scheme: &str, domain: &str, path: &str, sites_dir: &Path) -> Result<Self, TargetError> {
        validate_domain(domain)?;
        let relative = relative_file(path)?;

        Ok(Self {
            url: format!("{scheme}://{domain}{path}"),
            file: sites_dir.join(site_dir_name(domain)).join(relative),
        })
    }
}

/// Output directory name for a domain, labels reversed so sibling
/// subdomains sort together: `www.example.com` -> `com.example.www`.
pub fn site_dir_name(domain: &str) -> String {
    domain.split('.').rev().collect::<Vec<_>>().join(".")
}

fn validate_domain(domain: &str) -> Result<(), TargetError> {
    let valid = !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !domain.contains(['/', '\\', '?', '#', '@'])
        && !domain.chars().any(char::is_whitespace);

    if valid {
        Ok(())
    } else {
        Err(TargetError::Domain(domain.to_string()))
    }
}

/// File path below the domain directory. Directory-style paths (trailing
/// `/`) are backed by `index.html`.
fn relative_file(path: &str) -> Result<PathBuf, TargetError> {
    let invalid = |reason| TargetError::Path {
        path: path.to_string(),
        reason,
    };

    let Some(stripped) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if path.contains(['?', '#', '\\']) || path.chars().any(char::is_whitespace) {
        return Err(invalid("must be a plain path without query, fragment or whitespace"));
    }
    if path.contains("//") || !is_contained(stripped) {
        return Err(invalid("must stay inside the site"));
    }

    let mut file = PathBuf::from(stripped);
    if stripped.is_empty() || stripped.ends_with('/') {
        file.push("index.html");
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_dir_name() {
        assert_eq!(site_dir_name("www.example.com"), "com.example.www");
        assert_eq!(site_dir_name("localhost"), "localhost");
    }

    #[test]
    fn test_target_for_file_path() {
        let target = Target::new("https", "www.example.com", "/css/site.css", Path::new("/srv")).unwrap();
        assert_eq!(target.url, "https://www.example.com/css/site.css");
        assert_eq!(target.file, PathBuf::from("/srv/com.example.www/css/site.css"));
    }

    #[test]
    fn test_directory_paths_use_index() {
        let root = Target::new("https", "example.com", "/", Path::new("/srv")).unwrap();
        assert_eq!(root.url, "https://example.com/");
        assert_eq!(root.file, PathBuf::from("/srv/com.example/index.html"));

        let docs = Target::new("http", "example.com", "/docs/", Path::new("/srv")).unwrap();
        assert_eq!(docs.url, "http://example.com/docs/");
        assert_eq!(docs.file, PathBuf::from("/srv/com.example/docs/index.html"));
    }

    #[test]
    fn test_rejects_bad_paths() {
        for bad in ["relative", "/../escape", "/a/../../b", "//double", "/a//b", "/q?x=1", "/frag#x", "/sp ace"] {
            assert!(
                matches!(
                    Target::new("https", "example.com", bad, Path::new("/srv")),
                    Err(TargetError::Path { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_domains() {
        for bad in ["", "a/b", ".example.com", "exa mple.com", "user@example.com", "a..b"] {
            assert_eq!(
                Target::new("https", bad, "/", Path::new("/srv")),
                Err(TargetError::Domain(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_domain_with_port() {
        let target = Target::new("http", "127.0.0.1:8080", "/index.html", Path::new("/srv")).unwrap();
        assert_eq!(target.url, "http://127.0.0.1:8080/index.html");
        assert_eq!(target.file, PathBuf::from("/srv/1:8080.0.0.127/index.html"));
    }
}
