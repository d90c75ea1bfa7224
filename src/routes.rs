//! Static route table
//!
//! Every request belongs to exactly one [`RouteGroup`]. The group decides the
//! access policy and whether CSRF tokens are checked; the actix router then
//! picks the handler inside the group.

use actix_web::http::Method;

use crate::csrf::is_mutating;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    Auth,
    Courses,
    Tutorials,
    Posts,
    Comments,
    TuteFiles,
    Health,
}

const RESOURCE_METHODS: &[Method] = &[
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];
const AUTH_METHODS: &[Method] = &[Method::GET, Method::POST];
const READ_METHODS: &[Method] = &[Method::GET, Method::HEAD];

impl RouteGroup {
    pub const ALL: [Self; 7] = [
        Self::Auth,
        Self::Courses,
        Self::Tutorials,
        Self::Posts,
        Self::Comments,
        Self::TuteFiles,
        Self::Health,
    ];

    /// Resource groups backed by a document collection
    pub const RESOURCES: [Self; 4] = [Self::Courses, Self::Tutorials, Self::Posts, Self::Comments];

    #[must_use]
    pub const fn mount(self) -> &'static str {
        match self {
            Self::Auth => "/auth",
            Self::Courses => "/courses",
            Self::Tutorials => "/tutorials",
            Self::Posts => "/api/posts",
            Self::Comments => "/api/comments",
            Self::TuteFiles => "/TuteFiles",
            Self::Health => "/ping",
        }
    }

    /// Collection name for resource groups
    #[must_use]
    pub const fn collection(self) -> Option<&'static str> {
        match self {
            Self::Courses => Some("courses"),
            Self::Tutorials => Some("tutorials"),
            Self::Posts => Some("posts"),
            Self::Comments => Some("comments"),
            Self::Auth | Self::TuteFiles | Self::Health => None,
        }
    }

    const fn methods(self) -> &'static [Method] {
        match self {
            Self::Auth => AUTH_METHODS,
            Self::Courses | Self::Tutorials | Self::Posts | Self::Comments => RESOURCE_METHODS,
            Self::TuteFiles | Self::Health => READ_METHODS,
        }
    }

    fn matches_path(self, path: &str) -> bool {
        let mount = self.mount();
        match path.strip_prefix(mount) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Find the group for a request
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no group is mounted at `path` or the
    /// group does not register `method`
    pub fn classify(method: &Method, path: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|group| group.matches_path(path))
            .filter(|group| group.methods().contains(method))
            .ok_or_else(|| AppError::NotFound(format!("{method} {path}")))
    }

    /// Whether the request needs a live session before reaching a handler
    #[must_use]
    pub fn requires_session(self, method: &Method, public_reads: bool) -> bool {
        match self {
            Self::Courses | Self::Tutorials | Self::Posts | Self::Comments => {
                !public_reads || is_mutating(method)
            }
            Self::Auth | Self::TuteFiles | Self::Health => false,
        }
    }

    /// Whether mutating requests must carry a CSRF token
    #[must_use]
    pub const fn csrf_protected(self) -> bool {
        self.collection().is_some()
    }

    /// Whether a presented session cookie is looked up at all
    #[must_use]
    pub const fn uses_session(self) -> bool {
        !matches!(self, Self::TuteFiles | Self::Health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_mounts() {
        let cases = [
            ("/auth/login", RouteGroup::Auth),
            ("/courses", RouteGroup::Courses),
            ("/courses/5f0c", RouteGroup::Courses),
            ("/tutorials/", RouteGroup::Tutorials),
            ("/api/posts", RouteGroup::Posts),
            ("/api/comments/1", RouteGroup::Comments),
            ("/TuteFiles/intro.pdf", RouteGroup::TuteFiles),
            ("/ping", RouteGroup::Health),
        ];
        for (path, group) in cases {
            assert_eq!(RouteGroup::classify(&Method::GET, path).unwrap(), group, "{path}");
        }
    }

    #[test]
    fn test_unknown_paths_are_not_found() {
        for path in ["/", "/coursesx", "/api", "/api/users", "/tutefiles/a"] {
            assert!(
                matches!(RouteGroup::classify(&Method::GET, path), Err(AppError::NotFound(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn test_unregistered_methods_are_not_found() {
        assert!(RouteGroup::classify(&Method::POST, "/TuteFiles/a.pdf").is_err());
        assert!(RouteGroup::classify(&Method::DELETE, "/auth/logout").is_err());
        assert!(RouteGroup::classify(&Method::PATCH, "/api/posts/1").is_ok());
    }

    #[test]
    fn test_session_policy() {
        assert!(RouteGroup::Courses.requires_session(&Method::GET, false));
        assert!(!RouteGroup::Courses.requires_session(&Method::GET, true));
        assert!(RouteGroup::Courses.requires_session(&Method::POST, true));
        assert!(!RouteGroup::Auth.requires_session(&Method::POST, false));
        assert!(!RouteGroup::TuteFiles.requires_session(&Method::GET, false));
    }

    #[test]
    fn test_csrf_scope() {
        for group in RouteGroup::RESOURCES {
            assert!(group.csrf_protected());
        }
        assert!(!RouteGroup::Auth.csrf_protected());
        assert!(!RouteGroup::Health.csrf_protected());
    }
}
