//! Route pattern for middleware access.

use std::sync::Arc;

/// The registered pattern a request was routed through.
///
/// The mux stores it in request extensions so middleware can label requests
/// by route (e.g., `/users/{id}`) rather than by concrete path
/// (e.g., `/users/123`).
///
/// # Example
///
/// ```ignore
/// // In middleware
/// if let Some(template) = request.extensions().get::<PathTemplate>() {
///     tracing::info!(route = %template, "routed");
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate(Arc<str>);

impl PathTemplate {
    /// Create a new path template.
    #[must_use]
    pub fn new(template: impl Into<Arc<str>>) -> Self {
        Self(template.into())
    }

    /// Get the template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathTemplate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
