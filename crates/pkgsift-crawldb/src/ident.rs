//! Identifier normalization and validity

/// Decides whether a package path is fetchable at all.
///
/// The real check lives with the fetch code; the database only asks.
pub trait RemotePathCheck: Send + Sync {
    fn is_valid_remote_path(&self, path: &str) -> bool;
}

impl<F> RemotePathCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid_remote_path(&self, path: &str) -> bool {
        self(path)
    }
}

/// Structural check used when no fetcher-specific one is wired in:
/// `host.tld/elem[/elem...]`, printable ASCII, no empty or dot elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPathCheck;

impl RemotePathCheck for HostPathCheck {
    fn is_valid_remote_path(&self, path: &str) -> bool {
        if !path.bytes().all(|b| b.is_ascii_graphic()) {
            return false;
        }
        let mut elems = path.split('/');
        let Some(host) = elems.next() else {
            return false;
        };
        if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
            return false;
        }
        let rest: Vec<&str> = elems.collect();
        !rest.is_empty()
            && rest
                .iter()
                .all(|e| !e.is_empty() && *e != "." && *e != "..")
    }
}

/// Strip non-ASCII noise (and surrounding whitespace) from both ends.
pub fn trim_package_name(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_ascii() || c.is_ascii_whitespace())
}

/// Grouping key for crawl lists: the host of a package path, or the site
/// of a person id.
pub fn host_of(id: &str) -> &str {
    match parse_person_id(id) {
        Some((site, _)) if !id.contains('/') => site,
        _ => id.split('/').next().unwrap_or(id),
    }
}

/// `site:username`, e.g. `github.com:alice`.
pub fn person_id(site: &str, username: &str) -> String {
    format!("{site}:{username}")
}

pub fn parse_person_id(id: &str) -> Option<(&str, &str)> {
    let (site, user) = id.split_once(':')?;
    (!site.is_empty() && !user.is_empty()).then_some((site, user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_non_ascii_noise() {
        assert_eq!(trim_package_name("github.com/a/b\u{200b}"), "github.com/a/b");
        assert_eq!(trim_package_name("“github.com/a/b”"), "github.com/a/b");
        assert_eq!(trim_package_name("  github.com/a/b\n"), "github.com/a/b");
        assert_eq!(trim_package_name("github.com/ü/b"), "github.com/ü/b");
    }

    #[test]
    fn host_path_check() {
        let c = HostPathCheck;
        assert!(c.is_valid_remote_path("github.com/acme/widgets"));
        assert!(c.is_valid_remote_path("gopkg.in/yaml.v2"));
        assert!(!c.is_valid_remote_path("github.com"));
        assert!(!c.is_valid_remote_path("localhost/x"));
        assert!(!c.is_valid_remote_path("github.com//x"));
        assert!(!c.is_valid_remote_path("github.com/a/../b"));
        assert!(!c.is_valid_remote_path("github.com/a b"));
        assert!(!c.is_valid_remote_path(""));
    }

    #[test]
    fn closures_are_checks() {
        let only_github = |p: &str| p.starts_with("github.com/");
        assert!(only_github.is_valid_remote_path("github.com/x/y"));
        assert!(!only_github.is_valid_remote_path("gitlab.com/x/y"));
    }

    #[test]
    fn hosts_and_persons() {
        assert_eq!(host_of("github.com/a/b"), "github.com");
        assert_eq!(host_of("github.com:alice"), "github.com");
        assert_eq!(host_of("example.org:8080/x"), "example.org:8080");
        assert_eq!(person_id("github.com", "alice"), "github.com:alice");
        assert_eq!(parse_person_id("github.com:alice"), Some(("github.com", "alice")));
        assert_eq!(parse_person_id("github.com:"), None);
        assert_eq!(parse_person_id("github.com/a"), None);
    }
}
