//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the app and its tabs at one
//! point in time, so every invariant sees the same consistent view.

use syncframe_client::binding;
use syncframe_server::App;

use crate::browser::Browser;

/// Snapshot of the server and every tab connected to it.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Server-side registries.
    pub server: ServerSnapshot,
    /// Per-tab state.
    pub tabs: Vec<TabSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no tabs, empty registries).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture `app` and `tabs`.
    pub fn capture(app: &App, tabs: &[Browser]) -> Self {
        let server = {
            let connections = app.store().connections();
            ServerSnapshot { connections: connections.len(), open_panels: app.store().panels().len() }
        };
        let tabs = tabs
            .iter()
            .map(|tab| {
                let id = tab.runtime().connection_id().map(str::to_string);
                let registered = id.as_deref().is_some_and(|id| app.store().connections().has_connection(id));
                TabSnapshot::capture(tab, registered)
            })
            .collect();
        Self { server, tabs }
    }
}

/// Server registries.
#[derive(Debug, Clone, Default)]
pub struct ServerSnapshot {
    /// Live connections in the registry.
    pub connections: usize,
    /// Panels in the panel registry.
    pub open_panels: usize,
}

/// One tab's observable state.
#[derive(Debug, Clone, Default)]
pub struct TabSnapshot {
    /// Location shown in the address bar.
    pub location: String,
    /// Connection id announced by the server.
    pub connection_id: Option<String>,
    /// The server registry knows the connection.
    pub registered: bool,
    /// Registered listeners.
    pub listeners: usize,
    /// The listener list equals what the current markup declares.
    pub listeners_match_markup: bool,
    /// Listeners whose element is no longer in the document.
    pub dangling_listeners: usize,
}

impl TabSnapshot {
    fn capture(tab: &Browser, registered: bool) -> Self {
        let runtime = tab.runtime();
        let doc = runtime.document();
        let listeners = runtime.listeners();
        let declared = binding::collect(doc, runtime.morph_enabled());
        Self {
            location: runtime.location().to_string(),
            connection_id: runtime.connection_id().map(str::to_string),
            registered,
            listeners: listeners.len(),
            listeners_match_markup: declared == listeners,
            dangling_listeners: listeners.iter().filter(|listener| !doc.is_connected(listener.element)).count(),
        }
    }
}
