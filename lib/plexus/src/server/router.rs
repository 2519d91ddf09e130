//! Method and path routing.
//!
//! Each method owns a segment trie. Literal children are tried before the
//! parameter child at every depth, so at the first position where two
//! patterns differ the literal one wins; a dead end backtracks and unbinds
//! whatever the abandoned branch captured.
//!
//! ```text
//! GET /users/list      ──  literal "users" → literal "list"
//! GET /users/:id       ──  literal "users" → param
//! GET /users/{id}/posts ── literal "users" → param → literal "posts"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::{Error, Method, Params, PathTemplate, Result};

/// One `/`-separated piece of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches the identical text.
    Literal(String),
    /// Matches any non-empty segment and binds it to the name.
    Param(String),
}

impl Segment {
    fn parse(pattern: &str, part: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::invalid_route(format!("`{pattern}`: {reason}"));

        let name = if let Some(name) = part.strip_prefix(':') {
            Some(name)
        } else if let Some(inner) = part.strip_prefix('{') {
            Some(
                inner
                    .strip_suffix('}')
                    .ok_or_else(|| invalid(&format!("unclosed parameter `{part}`")))?,
            )
        } else {
            None
        };

        match name {
            Some(name) => {
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid(&format!("invalid parameter name `{name}`")));
                }
                Ok(Self::Param(name.to_string()))
            }
            None if part.is_empty() => Err(invalid("empty segment")),
            None if part.contains(['{', '}']) => {
                Err(invalid(&format!("stray brace in segment `{part}`")))
            }
            None => Ok(Self::Literal(part.to_string())),
        }
    }
}

/// A parsed route pattern such as `/users/:id` or `/users/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse and validate a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoute`] when the pattern does not start with `/`,
    /// has an empty segment (including a trailing `/`), a malformed or
    /// repeated parameter name, or a brace inside a literal.
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| Error::invalid_route(format!("`{raw}`: pattern must start with `/`")))?;

        let segments = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/')
                .map(|part| Segment::parse(raw, part))
                .collect::<Result<Vec<_>>>()?
        };

        let mut names = BTreeSet::new();
        for segment in &segments {
            if let Segment::Param(name) = segment
                && !names.insert(name.as_str())
            {
                return Err(Error::invalid_route(format!(
                    "`{raw}`: parameter `{name}` is bound twice"
                )));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of [`Router::resolve`].
#[derive(Debug)]
pub enum Resolution<'a, T> {
    /// A route matched.
    Matched(RouteMatch<'a, T>),
    /// The path matches routes of other methods only.
    MethodNotAllowed {
        /// Methods with a matching route, in [`Method`] order.
        allowed: Vec<Method>,
    },
    /// No route of any method matches the path.
    NotFound,
}

/// A matched route with its bound parameters.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// Value registered for the route.
    pub route: &'a T,
    /// Percent-decoded parameter values, in pattern order.
    pub params: Params,
    /// Pattern the route was registered with.
    pub pattern: &'a PathTemplate,
}

#[derive(Debug)]
struct Route<T> {
    pattern: Pattern,
    template: PathTemplate,
    value: T,
}

#[derive(Debug)]
struct Node<T> {
    literals: BTreeMap<String, Node<T>>,
    param: Option<Box<Node<T>>>,
    route: Option<Route<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: BTreeMap::new(),
            param: None,
            route: None,
        }
    }
}

impl<T> Node<T> {
    fn find<'p>(&self, segments: &[&'p str], captured: &mut Vec<&'p str>) -> Option<&Route<T>> {
        let Some((first, rest)) = segments.split_first() else {
            return self.route.as_ref();
        };

        if let Some(route) = self
            .literals
            .get(*first)
            .and_then(|child| child.find(rest, captured))
        {
            return Some(route);
        }

        if first.is_empty() {
            return None;
        }
        let child = self.param.as_deref()?;
        let mark = captured.len();
        captured.push(*first);
        let found = child.find(rest, captured);
        if found.is_none() {
            captured.truncate(mark);
        }
        found
    }

    fn map<U>(self, method: Method, f: &mut impl FnMut(Method, &PathTemplate, T) -> U) -> Node<U> {
        Node {
            literals: self
                .literals
                .into_iter()
                .map(|(text, child)| (text, child.map(method, &mut *f)))
                .collect(),
            param: self.param.map(|child| Box::new(child.map(method, &mut *f))),
            route: self.route.map(|route| Route {
                value: f(method, &route.template, route.value),
                pattern: route.pattern,
                template: route.template,
            }),
        }
    }

    fn count(&self) -> usize {
        usize::from(self.route.is_some())
            + self.literals.values().map(Self::count).sum::<usize>()
            + self.param.as_deref().map_or(0, Self::count)
    }
}

/// Route table: one trie per method.
///
/// # Example
///
/// ```ignore
/// let mut router = Router::new();
/// router.insert(Method::Get, "/users/list", "list")?;
/// router.insert(Method::Get, "/users/:id", "show")?;
///
/// let Resolution::Matched(found) = router.resolve(Method::Get, "/users/7") else { panic!() };
/// assert_eq!(*found.route, "show");
/// assert_eq!(found.params.get("id"), Some("7"));
/// ```
#[derive(Debug)]
pub struct Router<T> {
    methods: BTreeMap<Method, Node<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }
}

impl<T> Router<T> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `method` and `pattern`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoute`] if the pattern is malformed
    /// - [`Error::RouteConflict`] if the method already has a pattern with the
    ///   same literals and parameters at the same positions
    pub fn insert(&mut self, method: Method, pattern: &str, value: T) -> Result<()> {
        let pattern = Pattern::parse(pattern)?;

        let mut node = self.methods.entry(method).or_default();
        for segment in pattern.segments() {
            node = match segment {
                Segment::Literal(text) => node.literals.entry(text.clone()).or_default(),
                Segment::Param(_) => node.param.get_or_insert_with(Box::default).as_mut(),
            };
        }

        if let Some(existing) = &node.route {
            return Err(Error::RouteConflict {
                method,
                pattern: pattern.raw,
                existing: existing.pattern.raw.clone(),
            });
        }

        node.route = Some(Route {
            template: PathTemplate::new(pattern.as_str()),
            pattern,
            value,
        });
        Ok(())
    }

    /// Find the route for a concrete, still percent-encoded, path.
    #[must_use]
    pub fn resolve(&self, method: Method, path: &str) -> Resolution<'_, T> {
        let segments = split_path(path);

        if let Some(found) = self.lookup(method, &segments) {
            return Resolution::Matched(found);
        }

        let allowed = self.allowed(&segments);
        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allowed }
        }
    }

    /// Methods having a route that matches `path`.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        self.allowed(&split_path(path))
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.values().map(Node::count).sum()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transform every registered value, keeping the table shape.
    pub fn map<U>(self, mut f: impl FnMut(Method, &PathTemplate, T) -> U) -> Router<U> {
        Router {
            methods: self
                .methods
                .into_iter()
                .map(|(method, root)| (method, root.map(method, &mut f)))
                .collect(),
        }
    }

    fn lookup(&self, method: Method, segments: &[&str]) -> Option<RouteMatch<'_, T>> {
        let root = self.methods.get(&method)?;
        let mut captured = Vec::new();
        let route = root.find(segments, &mut captured)?;

        let params = route
            .pattern
            .param_names()
            .zip(captured)
            .map(|(name, raw)| (name.to_string(), percent_decode_str(raw).decode_utf8_lossy().into_owned()))
            .collect();

        Some(RouteMatch {
            route: &route.value,
            params,
            pattern: &route.template,
        })
    }

    fn allowed(&self, segments: &[&str]) -> Vec<Method> {
        self.methods
            .iter()
            .filter(|(_, root)| root.find(segments, &mut Vec::new()).is_some())
            .map(|(method, _)| *method)
            .collect()
    }
}

/// `/` and the empty path have no segments; a trailing `/` is an empty last segment.
fn split_path(path: &str) -> Vec<&str> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    if rest.is_empty() {
        Vec::new()
    } else {
        rest.split('/').collect()
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    fn router(routes: &[(Method, &'static str)]) -> Router<&'static str> {
        let mut router = Router::new();
        for (method, pattern) in routes {
            router.insert(*method, pattern, *pattern).expect("valid route");
        }
        router
    }

    #[test]
    fn both_param_syntaxes_parse_the_same() {
        let colon = Pattern::parse("/users/:id").expect("valid");
        let brace = Pattern::parse("/users/{id}").expect("valid");
        check!(colon.segments() == brace.segments());
        check!(Pattern::parse("/").expect("valid").segments().is_empty());
    }

    #[test]
    fn invalid_patterns() {
        for raw in [
            "users",
            "/users/",
            "//users",
            "/users/:",
            "/users/{}",
            "/users/{id",
            "/users/{id}x",
            "/users/:id-x",
            "/a{b",
            "/:id/:id",
        ] {
            let_assert!(Err(err) = Pattern::parse(raw), "{raw}");
            check!(err.is_configuration(), "{raw}");
        }
    }

    #[test]
    fn literal_outranks_param() {
        let router = router(&[(Method::Get, "/users/:id"), (Method::Get, "/users/list")]);

        let_assert!(Resolution::Matched(found) = router.resolve(Method::Get, "/users/list"));
        check!(*found.route == "/users/list");
        check!(found.params.is_empty());

        let_assert!(Resolution::Matched(found) = router.resolve(Method::Get, "/users/42"));
        check!(*found.route == "/users/:id");
        check!(found.params.get("id") == Some("42"));
        check!(found.pattern.as_str() == "/users/:id");
    }

    #[test]
    fn backtracking_unbinds_params() {
        let router = router(&[
            (Method::Get, "/:org/settings"),
            (Method::Get, "/teams/:team/members"),
        ]);

        // "teams" is tried as a literal first and fails at the next segment
        let_assert!(Resolution::Matched(found) = router.resolve(Method::Get, "/teams/settings"));
        check!(*found.route == "/:org/settings");
        check!(found.params.iter().collect::<Vec<_>>() == [("org", "teams")]);
    }

    #[test]
    fn params_bind_in_order_and_are_decoded() {
        let router = router(&[(Method::Get, "/orgs/{org}/users/:name")]);

        let_assert!(
            Resolution::Matched(found) = router.resolve(Method::Get, "/orgs/acme/users/jane%20doe")
        );
        check!(found.params.iter().collect::<Vec<_>>() == [("org", "acme"), ("name", "jane doe")]);
    }

    #[test]
    fn segment_count_and_empty_segments() {
        let router = router(&[(Method::Get, "/users/:id"), (Method::Get, "/")]);

        check!(matches!(router.resolve(Method::Get, "/users"), Resolution::NotFound));
        check!(matches!(router.resolve(Method::Get, "/users/"), Resolution::NotFound));
        check!(matches!(router.resolve(Method::Get, "/users/1/x"), Resolution::NotFound));
        check!(matches!(router.resolve(Method::Get, "/"), Resolution::Matched(_)));
        check!(matches!(router.resolve(Method::Get, ""), Resolution::Matched(_)));
    }

    #[test]
    fn same_shape_conflicts_regardless_of_names() {
        let mut router = router(&[(Method::Get, "/users/:id")]);

        let_assert!(Err(err) = router.insert(Method::Get, "/users/{user_id}", "dup"));
        check!(err.kind() == crate::ErrorKind::RouteAmbiguity);
        insta::assert_snapshot!(
            err.to_string(),
            @"route conflict: GET /users/{user_id} collides with /users/:id"
        );

        // other methods and other shapes are fine
        check!(router.insert(Method::Put, "/users/{user_id}", "put").is_ok());
        check!(router.insert(Method::Get, "/users/me", "me").is_ok());
        check!(router.len() == 3);
    }

    #[test]
    fn other_methods_give_method_not_allowed() {
        let router = router(&[
            (Method::Get, "/items/:id"),
            (Method::Delete, "/items/{id}"),
            (Method::Post, "/items"),
        ]);

        let_assert!(
            Resolution::MethodNotAllowed { allowed } = router.resolve(Method::Put, "/items/3")
        );
        check!(allowed == [Method::Get, Method::Delete]);
        check!(router.allowed_methods("/items") == [Method::Post]);
        check!(matches!(router.resolve(Method::Put, "/nothing"), Resolution::NotFound));
    }

    #[test]
    fn head_is_not_routed_to_get() {
        let router = router(&[(Method::Get, "/")]);
        check!(matches!(
            router.resolve(Method::Head, "/"),
            Resolution::MethodNotAllowed { .. }
        ));
    }

    #[test]
    fn map_keeps_shape() {
        let router = router(&[(Method::Get, "/a/:x"), (Method::Post, "/b")]);
        let lengths = router.map(|method, template, value| format!("{method} {template} {}", value.len()));

        let_assert!(Resolution::Matched(found) = lengths.resolve(Method::Get, "/a/1"));
        check!(found.route == "GET /a/:x 5");
        check!(lengths.len() == 2);
    }
}
