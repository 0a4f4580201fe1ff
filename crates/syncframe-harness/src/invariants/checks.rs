//! Standard invariant checks.

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Listeners are rebuilt after every update.
///
/// Each tab's listener list must equal the list its current markup declares,
/// and no listener may point at an element that left the document.
pub struct ListenersMatchMarkup;

impl Invariant for ListenersMatchMarkup {
    fn name(&self) -> &'static str {
        "ListenersMatchMarkup"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in &state.tabs {
            if !tab.listeners_match_markup || tab.dangling_listeners > 0 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "tab at {}: {} listeners, {} dangling, matches markup: {}",
                        tab.location, tab.listeners, tab.dangling_listeners, tab.listeners_match_markup
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every connected tab is known to the server's connection registry.
pub struct TabsAreRegistered;

impl Invariant for TabsAreRegistered {
    fn name(&self) -> &'static str {
        "TabsAreRegistered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in &state.tabs {
            if let Some(id) = &tab.connection_id {
                if !tab.registered {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("tab at {}: connection {id} is not registered", tab.location),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A connection holds at most one open panel.
pub struct OnePanelPerConnection;

impl Invariant for OnePanelPerConnection {
    fn name(&self) -> &'static str {
        "OnePanelPerConnection"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.server.open_panels > state.server.connections {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} panels open across {} connections",
                    state.server.open_panels, state.server.connections
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::{ServerSnapshot, TabSnapshot};

    fn tab() -> TabSnapshot {
        TabSnapshot {
            location: "/".into(),
            connection_id: Some("c".into()),
            registered: true,
            listeners: 2,
            listeners_match_markup: true,
            dangling_listeners: 0,
        }
    }

    #[test]
    fn stale_listeners_are_reported() {
        let mut stale = tab();
        stale.listeners_match_markup = false;
        let state = SystemSnapshot { server: ServerSnapshot::default(), tabs: vec![stale] };

        assert!(ListenersMatchMarkup.check(&state).is_err());
    }

    #[test]
    fn unregistered_tab_is_reported() {
        let mut lost = tab();
        lost.registered = false;
        let state = SystemSnapshot { server: ServerSnapshot::default(), tabs: vec![lost] };

        let violation = TabsAreRegistered.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "TabsAreRegistered");
    }

    #[test]
    fn more_panels_than_connections_is_reported() {
        let state = SystemSnapshot { server: ServerSnapshot { connections: 1, open_panels: 2 }, tabs: Vec::new() };
        assert!(OnePanelPerConnection.check(&state).is_err());
    }
}
