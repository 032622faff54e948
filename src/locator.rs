//! Document locators.
//!
//! A locator is the store's primary key for "this file, in this repository,
//! at this revision-identifier". It is derived from the repository-relative
//! path so two checkouts of the same repository produce the same keys.

use urlencoding::encode;

use crate::backend::Backend;
use crate::models::Repository;

/// Maps `(repository, revision, relative path)` to a URI.
///
/// Returns `None` when the inputs cannot be expressed as a locator; the
/// caller skips that path.
pub trait LocatorResolver: Send + Sync {
    fn to_locator(
        &self,
        repository_identifier: Option<&str>,
        revision: Option<&str>,
        relative_path: &str,
    ) -> Option<String>;
}

/// Builds repository-browser style paths:
/// `{base}/projects/{project}/repository[/{repo}]/revisions/{rev}/entry/{path}`.
///
/// Without a revision the `revisions/{rev}` segment is dropped, pointing at
/// the head of the default branch.
#[derive(Debug, Clone)]
pub struct RouteLocator {
    base: String,
    project: String,
}

impl RouteLocator {
    pub fn new(base: &str, project: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            project: project.to_string(),
        }
    }
}

impl LocatorResolver for RouteLocator {
    fn to_locator(
        &self,
        repository_identifier: Option<&str>,
        revision: Option<&str>,
        relative_path: &str,
    ) -> Option<String> {
        let path = relative_path.trim_start_matches('/');
        if self.project.is_empty() || path.is_empty() {
            return None;
        }

        let mut uri = format!("{}/projects/{}/repository", self.base, encode(&self.project));
        if let Some(id) = repository_identifier.filter(|id| !id.is_empty()) {
            uri.push('/');
            uri.push_str(&encode(id));
        }
        if let Some(rev) = revision.filter(|rev| !rev.is_empty()) {
            uri.push_str("/revisions/");
            uri.push_str(&encode(rev));
        }
        uri.push_str("/entry");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            uri.push('/');
            uri.push_str(&encode(segment));
        }
        Some(uri)
    }
}

/// Locator for `path` in `repository` at `revision`.
///
/// `path` may be absolute from the backend's point of view; it is reduced to
/// the repository-relative form before resolution.
pub fn locator(
    resolver: &dyn LocatorResolver,
    backend: &dyn Backend,
    repository: &Repository,
    revision: Option<&str>,
    path: &str,
) -> Option<String> {
    let relative = backend.relative_path(repository, path);
    resolver.to_locator(repository.identifier.as_deref(), revision, &relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;

    #[test]
    fn test_route_locator_with_revision() {
        let r = RouteLocator::new("", "platform");
        assert_eq!(
            r.to_locator(Some("api"), Some("main"), "dir/b.txt").unwrap(),
            "/projects/platform/repository/api/revisions/main/entry/dir/b.txt"
        );
    }

    #[test]
    fn test_route_locator_trunk_and_main_repository() {
        let r = RouteLocator::new("https://example.org/", "platform");
        assert_eq!(
            r.to_locator(None, None, "/a.txt").unwrap(),
            "https://example.org/projects/platform/repository/entry/a.txt"
        );
    }

    #[test]
    fn test_route_locator_escapes_segments() {
        let r = RouteLocator::new("", "p");
        assert_eq!(
            r.to_locator(None, Some("feature/x"), "my file.txt").unwrap(),
            "/projects/p/repository/revisions/feature%2Fx/entry/my%20file.txt"
        );
    }

    #[test]
    fn test_route_locator_encodes_reserved_and_non_ascii() {
        let r = RouteLocator::new("", "p");
        assert_eq!(
            r.to_locator(Some("web app"), None, "docs/na\u{ef}ve#1?.txt").unwrap(),
            "/projects/p/repository/web%20app/entry/docs/na%C3%AFve%231%3F.txt"
        );
        assert_eq!(
            r.to_locator(None, Some("v1.0-rc~2_x"), "a.txt").unwrap(),
            "/projects/p/repository/revisions/v1.0-rc~2_x/entry/a.txt"
        );
    }

    #[test]
    fn test_route_locator_unresolvable() {
        let r = RouteLocator::new("", "p");
        assert!(r.to_locator(None, None, "").is_none());
        assert!(r.to_locator(None, None, "/").is_none());
        assert!(RouteLocator::new("", "").to_locator(None, None, "a").is_none());
    }

    #[test]
    fn test_locator_uses_relative_path() {
        let backend = InMemoryBackend::new().with_root_prefix("/srv/checkout");
        let repo = Repository::new("p/[main]", None);
        let r = RouteLocator::new("", "p");
        let absolute = locator(&r, &backend, &repo, Some("main"), "/srv/checkout/a.txt");
        let relative = locator(&r, &backend, &repo, Some("main"), "a.txt");
        assert_eq!(absolute, relative);
        assert_eq!(
            absolute.unwrap(),
            "/projects/p/repository/revisions/main/entry/a.txt"
        );
    }
}
