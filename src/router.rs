//! Radix-tree route table.
//!
//! One tree per HTTP method. O(path-length) lookup. The router only resolves
//! a method + path to an [`Endpoint`] and its path parameters; everything
//! else happens in the endpoint.

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::dispatch::Endpoint;

/// The application route table.
///
/// Build it once at startup; it is frozen once handed to the
/// [`Server`](crate::Server). Each [`Router::on`] call returns `self` so
/// registrations chain naturally.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax.
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    /// Routes are registered at startup, so this fails before serving begins.
    pub fn on(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Resolves `method` + `path` to an endpoint and its extracted parameters.
    pub fn resolve(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Endpoint, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }
}
