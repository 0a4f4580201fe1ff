//! Scripted browser tab for end-to-end tests.

use std::time::Duration;

use syncframe_client::{ClientAction, ClientEvent, ClientRuntime, Driver, EventType, NodeId};
use syncframe_server::App;
use tokio::time::timeout;

use crate::{error::HarnessError, loopback::LoopbackTransport};

/// How long [`Browser::receive`] waits for a server message.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// A page loaded in a simulated tab, connected over a loopback channel.
#[derive(Debug)]
pub struct Browser {
    driver: Driver<LoopbackTransport>,
}

impl Browser {
    /// Load `path` and wait for the channel's hello.
    pub async fn open(app: &App, path: &str) -> Result<Self, HarnessError> {
        let driver = LoopbackTransport::open(app, path).await?;
        let mut browser = Self { driver };
        browser.receive().await?;
        Ok(browser)
    }

    /// The client runtime.
    pub fn runtime(&self) -> &ClientRuntime {
        self.driver.runtime()
    }

    /// The loopback transport.
    pub fn transport(&self) -> &LoopbackTransport {
        self.driver.transport()
    }

    /// Current location.
    pub fn location(&self) -> &str {
        self.runtime().location()
    }

    /// Outer markup of the element with `id`.
    pub fn html(&self, id: &str) -> Option<String> {
        let node = self.runtime().element_by_id(id)?;
        Some(self.runtime().document().outer_html(node))
    }

    /// Text content of the element with `id`.
    pub fn text(&self, id: &str) -> Option<String> {
        let node = self.runtime().element_by_id(id)?;
        Some(self.runtime().document().text_content(node))
    }

    /// `true` if the element with `id` carries `class`.
    pub fn has_class(&self, id: &str, class: &str) -> bool {
        self.runtime()
            .element_by_id(id)
            .and_then(|node| self.runtime().document().element(node))
            .is_some_and(|element| element.classes().any(|existing| existing == class))
    }

    /// Live `checked` property of the element with `id`.
    pub fn is_checked(&self, id: &str) -> bool {
        self.runtime()
            .element_by_id(id)
            .and_then(|node| self.runtime().document().element(node))
            .is_some_and(|element| element.live.checked)
    }

    fn node(&self, id: &str) -> Result<NodeId, HarnessError> {
        self.runtime().element_by_id(id).ok_or_else(|| HarnessError::MissingElement(id.to_string()))
    }

    /// Dispatch `event` to the element with `id`.
    pub async fn fire(&mut self, event: EventType, id: &str) -> Result<(), HarnessError> {
        let target = self.node(id)?;
        self.driver.dispatch(ClientEvent::Dom { event, target }).await?;
        Ok(())
    }

    /// Click the element with `id`.
    pub async fn click(&mut self, id: &str) -> Result<(), HarnessError> {
        self.fire(EventType::Click, id).await
    }

    /// Replace the value of an input and fire `input`.
    pub async fn type_into(&mut self, id: &str, value: &str) -> Result<(), HarnessError> {
        let node = self.node(id)?;
        self.driver.runtime_mut().set_value(node, value);
        self.fire(EventType::Input, id).await
    }

    /// Flip a checkbox and fire `change`.
    pub async fn toggle(&mut self, id: &str) -> Result<(), HarnessError> {
        let checked = self.is_checked(id);
        let node = self.node(id)?;
        self.driver.runtime_mut().set_checked(node, !checked);
        self.fire(EventType::Change, id).await
    }

    /// Change a checkbox without firing any event.
    pub fn set_checked(&mut self, id: &str, checked: bool) -> Result<(), HarnessError> {
        let node = self.node(id)?;
        self.driver.runtime_mut().set_checked(node, checked);
        Ok(())
    }

    /// Submit the form with `id`.
    pub async fn submit(&mut self, id: &str) -> Result<(), HarnessError> {
        self.fire(EventType::Submit, id).await
    }

    /// Browser back button.
    pub async fn back(&mut self) -> Result<(), HarnessError> {
        self.driver.dispatch(ClientEvent::Back).await?;
        Ok(())
    }

    /// Browser forward button.
    pub async fn forward(&mut self) -> Result<(), HarnessError> {
        self.driver.dispatch(ClientEvent::Forward).await?;
        Ok(())
    }

    /// Wait for one server message and apply it.
    pub async fn receive(&mut self) -> Result<(), HarnessError> {
        match timeout(RECEIVE_TIMEOUT, self.driver.next_message()).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(HarnessError::Closed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(HarnessError::Timeout),
        }
    }

    /// Apply every message that arrives within `quiet` of the previous
    /// one. Returns how many were applied.
    pub async fn drain(&mut self, quiet: Duration) -> Result<usize, HarnessError> {
        let mut applied = 0;
        while let Ok(result) = timeout(quiet, self.driver.next_message()).await {
            if !result? {
                break;
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Scroll requests and document events produced so far.
    pub fn take_effects(&mut self) -> Vec<ClientAction> {
        self.driver.take_effects()
    }
}
