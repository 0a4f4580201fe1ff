//! Drives a [`ClientRuntime`] over a [`Transport`].
//!
//! The runtime is Sans-IO; [`Driver`] is the thin layer that executes its
//! actions: messages go out on the channel, fetches are performed and fed
//! back in, and everything else is kept as an effect for the embedder.

use std::collections::VecDeque;

use async_trait::async_trait;
use syncframe_proto::{ClientMessage, ServerMessage};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, FetchRequest, FetchResponse},
    runtime::ClientRuntime,
};

/// Connection to a server: the persistent channel plus morph fetches.
#[async_trait]
pub trait Transport: Send {
    /// Send a message on the channel.
    async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError>;

    /// Wait for the next server message. `None` once the channel closed.
    async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError>;

    /// Perform a morph-navigation GET.
    async fn fetch(&mut self, request: &FetchRequest) -> Result<FetchResponse, ClientError>;
}

/// A runtime bound to a transport.
#[derive(Debug)]
pub struct Driver<T> {
    runtime: ClientRuntime,
    transport: T,
    effects: Vec<ClientAction>,
}

impl<T: Transport> Driver<T> {
    /// Bind `runtime` to `transport`.
    pub fn new(runtime: ClientRuntime, transport: T) -> Self {
        Self { runtime, transport, effects: Vec::new() }
    }

    /// The runtime.
    pub fn runtime(&self) -> &ClientRuntime {
        &self.runtime
    }

    /// The runtime, for simulating user input.
    pub fn runtime_mut(&mut self) -> &mut ClientRuntime {
        &mut self.runtime
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Feed an event and execute every action it leads to.
    pub async fn dispatch(&mut self, event: ClientEvent) -> Result<(), ClientError> {
        let mut pending: VecDeque<ClientAction> = self.runtime.handle(event)?.into();
        while let Some(action) = pending.pop_front() {
            match action {
                ClientAction::Send(message) => self.transport.send(message).await?,
                ClientAction::Fetch(request) => {
                    let response = self.transport.fetch(&request).await?;
                    pending.extend(self.runtime.handle(ClientEvent::FetchCompleted { request, response })?);
                },
                effect => self.effects.push(effect),
            }
        }
        Ok(())
    }

    /// Receive and apply one server message. Returns `false` once the
    /// channel is closed.
    pub async fn next_message(&mut self) -> Result<bool, ClientError> {
        match self.transport.recv().await? {
            Some(message) => {
                self.dispatch(ClientEvent::Server(message)).await?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Scroll requests and document events produced so far.
    pub fn take_effects(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.effects)
    }
}
