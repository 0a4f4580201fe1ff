//! Application-scoped state.
//!
//! Everything shared between requests and connections lives in one
//! [`AppStore`] built at boot and passed around by `Arc`: the route table and
//! compiled-route cache, error pages, open panels, pending mounts, the
//! connection registry and the session store. Locks are short and
//! synchronous and are never held across `.await`.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::{Map, Value, json};
use syncframe_core::{Scope, Template, template::escape_html};
use tracing::{debug, error};

use crate::{
    cache::RouteCache,
    compiler::{CompiledRoute, compile_error_page},
    connection::Mounted,
    context::Env,
    error::{CompileError, SourceError},
    module::ModuleRegistry,
    panel::PanelRegistry,
    registry::ConnectionRegistry,
    routes::{RouteEntry, RouteTable},
    session::SessionStore,
    source::TemplateSource,
};

/// Tunables for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Page loads whose socket has not connected yet. The oldest is dropped
    /// once the limit is reached.
    pub max_pending_mounts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_pending_mounts: 1024 }
    }
}

/// Bounded FIFO of mounted states waiting for their socket.
#[derive(Debug)]
struct PendingMounts {
    order: VecDeque<String>,
    mounts: HashMap<String, Mounted>,
    capacity: usize,
}

impl PendingMounts {
    fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), mounts: HashMap::new(), capacity: capacity.max(1) }
    }

    fn insert(&mut self, token: String, mounted: Mounted) {
        while self.mounts.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if self.mounts.remove(&oldest).is_some() {
                debug!("dropping unclaimed mount {oldest}");
            }
        }
        self.order.push_back(token.clone());
        self.mounts.insert(token, mounted);
    }

    fn claim(&mut self, token: &str) -> Option<Mounted> {
        let mounted = self.mounts.remove(token)?;
        self.order.retain(|t| t != token);
        Some(mounted)
    }
}

/// Shared application state.
pub struct AppStore {
    source: Arc<dyn TemplateSource>,
    modules: ModuleRegistry,
    routes: RouteTable,
    cache: RouteCache,
    error_pages: Mutex<HashMap<(String, u16), Arc<Template>>>,
    panels: PanelRegistry,
    pending: Mutex<PendingMounts>,
    connections: Mutex<ConnectionRegistry>,
    sessions: Arc<dyn SessionStore>,
}

impl AppStore {
    /// Discover routes and build the store.
    pub async fn load(
        source: Arc<dyn TemplateSource>,
        modules: ModuleRegistry,
        sessions: Arc<dyn SessionStore>,
        config: StoreConfig,
    ) -> Result<Self, SourceError> {
        let files = source.list().await?;
        let routes = RouteTable::discover(&files);
        debug!("discovered {} routes in {} files", routes.len(), files.len());

        Ok(Self {
            source,
            modules,
            routes,
            cache: RouteCache::new(),
            error_pages: Mutex::new(HashMap::new()),
            panels: PanelRegistry::new(),
            pending: Mutex::new(PendingMounts::new(config.max_pending_mounts)),
            connections: Mutex::new(ConnectionRegistry::new()),
            sessions,
        })
    }

    /// Discovered routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Compiled-route cache.
    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Registered route modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Compiled route for `entry`; `true` if this call compiled it.
    pub async fn compiled(&self, entry: &RouteEntry) -> Result<(Arc<CompiledRoute>, bool), CompileError> {
        self.cache.get_or_compile(self.source.as_ref(), &self.modules, entry).await
    }

    /// Open panels.
    pub fn panels(&self) -> &PanelRegistry {
        &self.panels
    }

    /// Session store.
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Live connections.
    pub fn connections(&self) -> MutexGuard<'_, ConnectionRegistry> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of page loads waiting for their socket.
    pub fn pending_mounts(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).mounts.len()
    }

    pub(crate) fn stash_mount(&self, token: String, mounted: Mounted) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).insert(token, mounted);
    }

    pub(crate) fn claim_mount(&self, token: &str) -> Option<Mounted> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).claim(token)
    }

    /// Render the nearest `_<status>.html` for a route in `dir`.
    pub async fn render_error_page(&self, dir: &str, status: u16, error: Value, env: &Env) -> String {
        let key = (dir.to_string(), status);
        let cached = self.error_pages.lock().unwrap_or_else(PoisonError::into_inner).get(&key).cloned();

        let page = match cached {
            Some(page) => page,
            None => match compile_error_page(self.source.as_ref(), dir, status).await {
                Ok(page) => {
                    let page = Arc::new(page);
                    let mut pages = self.error_pages.lock().unwrap_or_else(PoisonError::into_inner);
                    Arc::clone(pages.entry(key).or_insert(page))
                },
                Err(e) => {
                    error!("unable to compile error page {status} for /{dir}: {e}");
                    return fallback_error_page(&error);
                },
            },
        };

        let scope = Scope::new()
            .with("$", Value::Object(Map::new()))
            .with("flash", Value::Object(Map::new()))
            .with("error", error)
            .with("env", env.to_value())
            .with("params", json!({}));
        page.render(&scope)
    }
}

fn fallback_error_page(error: &Value) -> String {
    let mut title = String::new();
    escape_html(error.get("title").and_then(Value::as_str).unwrap_or("Error"), &mut title);
    format!("<!DOCTYPE html>\n<html><body><h1>{title}</h1></body></html>\n")
}

impl fmt::Debug for AppStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppStore")
            .field("routes", &self.routes.len())
            .field("compiled", &self.cache.len())
            .field("panels", &self.panels.len())
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{session::MemorySessionStore, source::MemorySource};

    async fn store(source: MemorySource, config: StoreConfig) -> AppStore {
        AppStore::load(Arc::new(source), ModuleRegistry::new(), Arc::new(MemorySessionStore::new()), config)
            .await
            .unwrap()
    }

    async fn mounted(store: &AppStore, path: &str) -> Mounted {
        let found = store.routes().resolve(path).unwrap();
        let entry = found.entry.clone();
        let (route, _) = store.compiled(&entry).await.unwrap();
        Mounted::new(route, Map::new(), found.params.clone(), "session")
    }

    #[tokio::test]
    async fn pending_mounts_are_bounded_fifo() {
        let source = MemorySource::new().with_file("a.html", "<p>a</p>");
        let store = store(source, StoreConfig { max_pending_mounts: 2 }).await;

        for token in ["t1", "t2", "t3"] {
            let mounted = mounted(&store, "/a").await;
            store.stash_mount(token.to_string(), mounted);
        }

        assert_eq!(store.pending_mounts(), 2);
        assert!(store.claim_mount("t1").is_none());
        assert!(store.claim_mount("t3").is_some());
        assert!(store.claim_mount("t3").is_none());
        assert_eq!(store.pending_mounts(), 1);
    }

    #[tokio::test]
    async fn error_pages_are_cached_per_directory() {
        let source = MemorySource::new()
            .with_file("_404.html", "<h1>root <%= error.title %></h1>")
            .with_file("docs/_404.html", "<h1>docs <%= error.title %></h1>");
        let store = store(source, StoreConfig::default()).await;
        let error = json!({"title": "Not Found"});
        let env = Env::default();

        assert_eq!(store.render_error_page("docs", 404, error.clone(), &env).await, "<h1>docs Not Found</h1>");
        assert_eq!(store.render_error_page("blog", 404, error.clone(), &env).await, "<h1>root Not Found</h1>");
        assert_eq!(store.error_pages.lock().unwrap().len(), 2);
    }
}
