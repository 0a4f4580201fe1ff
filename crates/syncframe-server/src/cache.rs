//! Compiled-route cache.
//!
//! Routes compile on first request and stay cached for the life of the
//! process. There is no invalidation; edits to route files need a restart.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    compiler::{CompiledRoute, compile},
    error::CompileError,
    module::ModuleRegistry,
    routes::RouteEntry,
    source::TemplateSource,
};

/// Endpoint to compiled route.
#[derive(Debug, Default)]
pub struct RouteCache {
    routes: Mutex<HashMap<String, Arc<CompiledRoute>>>,
}

impl RouteCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached route for `endpoint`, if compiled.
    pub fn get(&self, endpoint: &str) -> Option<Arc<CompiledRoute>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).get(endpoint).cloned()
    }

    /// Return the cached route for `entry`, compiling it on first use.
    ///
    /// The flag is `true` if this call compiled the route. Two requests
    /// racing on a cold route may both compile; the first insert wins.
    pub async fn get_or_compile(
        &self,
        source: &dyn TemplateSource,
        modules: &ModuleRegistry,
        entry: &RouteEntry,
    ) -> Result<(Arc<CompiledRoute>, bool), CompileError> {
        if let Some(route) = self.get(&entry.endpoint) {
            return Ok((route, false));
        }

        let compiled = Arc::new(compile(source, modules, entry).await?);

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let route = routes.entry(entry.endpoint.clone()).or_insert(compiled);
        Ok((Arc::clone(route), true))
    }

    /// Number of compiled routes.
    pub fn len(&self) -> usize {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
