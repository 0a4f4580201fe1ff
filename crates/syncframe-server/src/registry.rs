//! Connection registry for live sockets and the routes they display.
//!
//! The registry maintains bidirectional mappings: endpoint → connections
//! (which sockets show a route) and connection → info (session, current
//! endpoint, inbox). Morph navigation rebinds a connection to a new endpoint,
//! which moves it between route sets.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};

use crate::connection::ConnectionInput;

/// Information about a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Session the connection belongs to.
    pub session_id: String,
    /// Endpoint the connection currently displays.
    pub endpoint: String,
    /// Inbox of the connection task. Weak so the registry never keeps a
    /// closed connection alive.
    inbox: WeakUnboundedSender<ConnectionInput>,
}

impl ConnectionInfo {
    pub(crate) fn new(
        session_id: impl Into<String>,
        endpoint: impl Into<String>,
        inbox: WeakUnboundedSender<ConnectionInput>,
    ) -> Self {
        Self { session_id: session_id.into(), endpoint: endpoint.into(), inbox }
    }
}

/// Registry of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection id → info
    connections: HashMap<String, ConnectionInfo>,
    /// Endpoint → connection ids displaying it
    routes: HashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns `false` if the id is already registered.
    pub fn register(&mut self, connection_id: &str, info: ConnectionInfo) -> bool {
        if self.connections.contains_key(connection_id) {
            return false;
        }
        self.routes.entry(info.endpoint.clone()).or_default().insert(connection_id.to_string());
        self.connections.insert(connection_id.to_string(), info);
        true
    }

    /// Unregister a connection. Returns its info if it existed.
    pub fn unregister(&mut self, connection_id: &str) -> Option<ConnectionInfo> {
        let info = self.connections.remove(connection_id)?;
        self.leave_route(connection_id, &info.endpoint);
        Some(info)
    }

    /// Move a connection to another endpoint.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn rebind(&mut self, connection_id: &str, endpoint: &str) -> bool {
        let Some(info) = self.connections.get_mut(connection_id) else {
            return false;
        };
        let previous = std::mem::replace(&mut info.endpoint, endpoint.to_string());
        self.leave_route(connection_id, &previous);
        self.routes.entry(endpoint.to_string()).or_default().insert(connection_id.to_string());
        true
    }

    /// Connection metadata. `None` if not registered.
    pub fn info(&self, connection_id: &str) -> Option<&ConnectionInfo> {
        self.connections.get(connection_id)
    }

    /// Check if a connection is registered.
    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Connections displaying `endpoint`.
    pub fn connections_on(&self, endpoint: &str) -> impl Iterator<Item = &str> {
        self.routes.get(endpoint).into_iter().flatten().map(String::as_str)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Live inbox of a connection. `None` if unknown or already closed.
    pub(crate) fn inbox(&self, connection_id: &str) -> Option<UnboundedSender<ConnectionInput>> {
        self.connections.get(connection_id)?.inbox.upgrade()
    }

    fn leave_route(&mut self, connection_id: &str, endpoint: &str) {
        if let Some(members) = self.routes.get_mut(endpoint) {
            members.remove(connection_id);
            if members.is_empty() {
                self.routes.remove(endpoint);
            }
        }
    }
}
