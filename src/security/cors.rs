//! Cross-Origin Resource Sharing, built from ordinary routes.
//!
//! [`Cors::install`] prepends three entries to a [`Router`]:
//!
//! 1. a preflight route (`OPTIONS` on the covered URLs) that answers `204` with
//!    `Access-Control-Allow-Origin: *`, echoes the requested method and headers,
//!    disables preflight caching, and stops the chain;
//! 2. a flag route (any method on the covered URLs) that sets the response's
//!    CORS flag and continues;
//! 3. an error route that re-applies the flag on failures, as long as the
//!    response has not been committed.
//!
//! The flag makes the response expose every staged header and allow any
//! origin when it is committed.

use tracing::debug;

use crate::http::StatusCode;
use crate::router::{ErrorRoute, Flow, Pattern, PatternError, Route, Router};

/// CORS configuration for a set of URL regexes.
///
/// # Examples
///
/// ```rust
/// use waypoint::router::Router;
/// use waypoint::security::Cors;
///
/// # fn main() -> Result<(), waypoint::router::PatternError> {
/// let mut router = Router::new();
/// Cors::new().endpoint("/api/.*").endpoint("/health").install(&mut router)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cors {
    endpoints: Vec<String>,
}

impl Cors {
    /// CORS for every URL, until an endpoint is added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URL regex to the covered set.
    #[must_use]
    pub fn endpoint(mut self, pattern: impl Into<String>) -> Self {
        self.endpoints.push(pattern.into());
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// The combined URL regex, or `None` when every URL is covered.
    pub fn url_pattern(&self) -> Option<String> {
        if self.endpoints.is_empty() {
            return None;
        }
        let alternatives: Vec<String> = self.endpoints.iter().map(|ep| format!("(?:{ep})")).collect();
        Some(alternatives.join("|"))
    }

    /// Prepends the preflight route, the flag route, and the error route.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if an endpoint regex fails to compile. The
    /// router is left untouched in that case.
    pub fn install(&self, router: &mut Router) -> Result<(), PatternError> {
        let url = self.url_pattern();
        let preflight = Pattern::regex(Some("OPTIONS"), url.as_deref())?;
        let flagged = Pattern::regex(None, url.as_deref())?;

        router
            .prepend_route(Route::exchange(flagged, |_request, response| {
                response.set_allow_cors(true);
                Box::pin(async { Ok(Flow::Continue) })
            }))
            .prepend_error_route(ErrorRoute::new(|_error, _request, response| {
                if !response.is_committed() {
                    response.set_allow_cors(true);
                }
                Box::pin(async { Ok(Flow::Continue) })
            }))
            .prepend_route(Route::exchange(preflight, |request, response| {
                debug!(request_id = request.id(), path = request.path(), "CORS preflight");
                response.set_header("Access-Control-Allow-Origin", "*");
                if let Some(method) = request.header("access-control-request-method") {
                    response.set_header("Access-Control-Allow-Methods", method);
                }
                if let Some(headers) = request.header("access-control-request-headers") {
                    response.set_header("Access-Control-Allow-Headers", headers);
                }
                response
                    .set_header("Access-Control-Max-Age", "-1")
                    .set_status(StatusCode::NoContent);
                Box::pin(async { Ok(Flow::Stop) })
            }));

        Ok(())
    }
}
