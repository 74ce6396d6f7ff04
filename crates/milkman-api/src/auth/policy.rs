//! Route access policy
//!
//! An explicit table of which roles each route requires. Rules come in three
//! kinds:
//! - exempt paths, which are never checked
//! - group rules keyed by path prefix
//! - route rules keyed by method and route pattern
//!
//! A route rule overrides any group rule; among group rules the longest
//! matching prefix wins. A path with no rule has no requirement.

use axum::http::Method;

/// What a request must present before it reaches its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// Path is on the exemption list
    Exempt,
    /// No rule applies
    Open,
    /// Role claim must be one of these
    Roles(&'a [String]),
}

impl Requirement<'_> {
    pub fn is_checked(&self) -> bool {
        matches!(self, Self::Roles(_))
    }
}

#[derive(Debug, Clone)]
struct RouteRule {
    method: Method,
    pattern: String,
    roles: Vec<String>,
}

#[derive(Debug, Clone)]
struct GroupRule {
    prefix: String,
    roles: Vec<String>,
}

/// Registration table mapping routes to required roles
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    exempt: Vec<String>,
    groups: Vec<GroupRule>,
    routes: Vec<RouteRule>,
}

fn to_roles(roles: &[&str]) -> Vec<String> {
    roles.iter().map(|r| r.to_string()).collect()
}

/// `pattern` ending in `/*` matches everything below that prefix
fn exempt_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => prefix_matches(prefix, path),
        None => pattern == path,
    }
}

/// Prefix match on a path segment boundary
fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never check this path (`/*` suffix exempts a whole subtree)
    pub fn exempt(mut self, pattern: impl Into<String>) -> Self {
        self.exempt.push(pattern.into());
        self
    }

    /// Require one of `roles` for every path under `prefix`
    pub fn group(mut self, prefix: impl Into<String>, roles: &[&str]) -> Self {
        self.groups.push(GroupRule {
            prefix: prefix.into(),
            roles: to_roles(roles),
        });
        self
    }

    /// Require one of `roles` for a single route
    ///
    /// `pattern` is the route pattern as registered with the router, so
    /// parameterised routes are keyed by their template.
    pub fn route(mut self, method: Method, pattern: impl Into<String>, roles: &[&str]) -> Self {
        self.routes.push(RouteRule {
            method,
            pattern: pattern.into(),
            roles: to_roles(roles),
        });
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|p| exempt_matches(p, path))
    }

    /// Resolve the requirement for a request
    ///
    /// # Arguments
    ///
    /// * `method` - Request method
    /// * `path` - Concrete request path
    /// * `matched` - Route pattern the router matched, if any
    pub fn resolve(&self, method: &Method, path: &str, matched: Option<&str>) -> Requirement<'_> {
        if self.is_exempt(path) {
            return Requirement::Exempt;
        }

        let pattern = matched.unwrap_or(path);
        if let Some(rule) = self
            .routes
            .iter()
            .find(|r| &r.method == method && r.pattern == pattern)
        {
            return Requirement::Roles(&rule.roles);
        }

        self.groups
            .iter()
            .filter(|g| prefix_matches(&g.prefix, path))
            .max_by_key(|g| g.prefix.trim_end_matches('/').len())
            .map(|g| Requirement::Roles(&g.roles))
            .unwrap_or(Requirement::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(req: Requirement<'_>) -> Vec<&str> {
        match req {
            Requirement::Roles(r) => r.iter().map(String::as_str).collect(),
            other => panic!("expected roles, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_route_is_open() {
        let policy = AccessPolicy::new().route(Method::GET, "/customer/getAll", &["ADMIN"]);

        assert_eq!(policy.resolve(&Method::GET, "/orders", None), Requirement::Open);
        assert_eq!(
            policy.resolve(&Method::POST, "/customer/getAll", None),
            Requirement::Open
        );
        assert!(!Requirement::Open.is_checked());
    }

    #[test]
    fn test_route_rule() {
        let policy = AccessPolicy::new().route(Method::GET, "/customer/getAll", &["ADMIN"]);

        let req = policy.resolve(&Method::GET, "/customer/getAll", Some("/customer/getAll"));
        assert!(req.is_checked());
        assert_eq!(roles(req), vec!["ADMIN"]);
    }

    #[test]
    fn test_route_rule_uses_matched_pattern() {
        let policy = AccessPolicy::new().route(
            Method::DELETE,
            "/customer/:customer_id",
            &["ADMIN"],
        );

        let req = policy.resolve(
            &Method::DELETE,
            "/customer/5b1c",
            Some("/customer/:customer_id"),
        );
        assert_eq!(roles(req), vec!["ADMIN"]);
    }

    #[test]
    fn test_route_overrides_group() {
        let policy = AccessPolicy::new()
            .group("/customer", &["ADMIN"])
            .route(Method::GET, "/customer/:customer_id", &["ADMIN", "CUSTOMER"]);

        let req = policy.resolve(&Method::GET, "/customer/abc", Some("/customer/:customer_id"));
        assert_eq!(roles(req), vec!["ADMIN", "CUSTOMER"]);

        let req = policy.resolve(&Method::GET, "/customer/getAll", Some("/customer/getAll"));
        assert_eq!(roles(req), vec!["ADMIN"]);
    }

    #[test]
    fn test_longest_group_prefix_wins() {
        let policy = AccessPolicy::new()
            .group("/admin", &["ADMIN"])
            .group("/admin/reports", &["ADMIN", "AUDITOR"]);

        assert_eq!(
            roles(policy.resolve(&Method::GET, "/admin/reports/daily", None)),
            vec!["ADMIN", "AUDITOR"]
        );
        assert_eq!(
            roles(policy.resolve(&Method::GET, "/admin/users", None)),
            vec!["ADMIN"]
        );
    }

    #[test]
    fn test_group_matches_on_segment_boundary() {
        let policy = AccessPolicy::new().group("/admin", &["ADMIN"]);

        assert!(policy.resolve(&Method::GET, "/admin", None).is_checked());
        assert!(policy.resolve(&Method::GET, "/admin/x", None).is_checked());
        assert_eq!(
            policy.resolve(&Method::GET, "/administrator", None),
            Requirement::Open
        );
    }

    #[test]
    fn test_exempt_beats_every_rule() {
        let policy = AccessPolicy::new()
            .exempt("/customer/register")
            .exempt("/api-docs/*")
            .group("/customer", &["ADMIN"])
            .group("/api-docs", &["ADMIN"]);

        assert_eq!(
            policy.resolve(&Method::POST, "/customer/register", Some("/customer/register")),
            Requirement::Exempt
        );
        assert_eq!(
            policy.resolve(&Method::GET, "/api-docs/openapi.json", None),
            Requirement::Exempt
        );
        assert!(policy
            .resolve(&Method::POST, "/customer/register/extra", None)
            .is_checked());
    }
}
