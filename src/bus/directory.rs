//! Directory - static name → mailbox map shared by every agent
//!
//! Built once at startup: every agent registers its name and receives the
//! receiving half of a bounded mailbox. After `build()` the map is frozen and
//! cheap to clone. Delivery is fire-and-forget (`try_send`); a full or closed
//! mailbox drops the message.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{PlantError, Result};
use crate::protocol::{Content, Envelope, Performative};

/// Out-of-band requests answered by every agent loop
#[derive(Debug)]
pub enum ControlCommand {
    /// Reply with a JSON snapshot of the agent's private state
    Report(oneshot::Sender<serde_json::Value>),
}

/// Everything that can land in an agent's mailbox
#[derive(Debug)]
pub enum Inbound {
    Message(Envelope),
    Control(ControlCommand),
}

/// Collects mailboxes before the agents start
pub struct DirectoryBuilder {
    capacity: usize,
    senders: HashMap<String, mpsc::Sender<Inbound>>,
}

impl DirectoryBuilder {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            capacity: mailbox_capacity.max(1),
            senders: HashMap::new(),
        }
    }

    /// Create the mailbox for `name`. Names must be unique.
    pub fn register(&mut self, name: impl Into<String>) -> Result<mpsc::Receiver<Inbound>> {
        let name = name.into();
        if self.senders.contains_key(&name) {
            return Err(PlantError::Validation(format!(
                "mailbox '{}' registered twice",
                name
            )));
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(name, tx);
        Ok(rx)
    }

    pub fn build(self) -> Directory {
        Directory {
            senders: Arc::new(self.senders),
        }
    }
}

/// Frozen name → mailbox map
#[derive(Clone)]
pub struct Directory {
    senders: Arc<HashMap<String, mpsc::Sender<Inbound>>>,
}

impl Directory {
    pub fn contains(&self, name: &str) -> bool {
        self.senders.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver one message without waiting for mailbox space
    pub fn deliver(&self, to: &str, envelope: Envelope) -> Result<()> {
        let tx = self
            .senders
            .get(to)
            .ok_or_else(|| PlantError::UnknownRecipient(to.to_string()))?;

        tx.try_send(Inbound::Message(envelope)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                PlantError::ChannelClosed(format!("{} mailbox full", to))
            }
            mpsc::error::TrySendError::Closed(_) => {
                PlantError::ChannelClosed(format!("{} mailbox closed", to))
            }
        })
    }

    /// Fire-and-forget send: failures are logged and the message is dropped
    pub fn send(&self, from: &str, to: &str, performative: Performative, content: Content) {
        debug!(from, to, %performative, message = %content, "send");
        let envelope = Envelope::new(performative, from, content);
        if let Err(e) = self.deliver(to, envelope) {
            warn!(from, to, error = %e, "message dropped");
        }
    }

    /// Decode a text message and send it with its default performative.
    ///
    /// Malformed text is logged and dropped; the error is returned so callers
    /// that care (the CLI) can report it.
    pub fn send_wire(&self, from: &str, to: &str, text: &str) -> Result<()> {
        let content = match Content::decode(text) {
            Ok(content) => content,
            Err(e) => {
                warn!(from, to, text, error = %e, "malformed message dropped");
                return Err(e.into());
            }
        };
        let performative = content.performative();
        self.deliver(to, Envelope::new(performative, from, content))
    }

    /// Ask an agent for a snapshot of its state
    pub async fn report(&self, name: &str) -> Result<serde_json::Value> {
        let tx = self
            .senders
            .get(name)
            .ok_or_else(|| PlantError::UnknownRecipient(name.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Inbound::Control(ControlCommand::Report(reply_tx)))
            .await
            .map_err(|_| PlantError::ChannelClosed(format!("{} mailbox closed", name)))?;

        reply_rx
            .await
            .map_err(|_| PlantError::ChannelClosed(format!("{} dropped report request", name)))
    }
}
