//! AgentContext - an agent's handle on the bus
//!
//! Owns the agent's mailbox and shutdown receiver (not Clone). The sending
//! side, `Outbox`, is Clone and can be handed to spawned helpers.

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Duration, Interval, MissedTickBehavior};

use crate::protocol::{Content, Performative};

use super::directory::{Directory, Inbound};

pub struct AgentContext {
    pub name: String,
    directory: Directory,
    inbox: mpsc::Receiver<Inbound>,
    shutdown: broadcast::Receiver<()>,
}

impl AgentContext {
    pub fn new(
        name: impl Into<String>,
        directory: Directory,
        inbox: mpsc::Receiver<Inbound>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            directory,
            inbox,
            shutdown,
        }
    }

    pub fn outbox(&self) -> Outbox {
        Outbox {
            name: self.name.clone(),
            directory: self.directory.clone(),
        }
    }

    /// Split into the pieces a `select!` loop needs
    pub fn into_parts(self) -> (Outbox, mpsc::Receiver<Inbound>, broadcast::Receiver<()>) {
        let outbox = self.outbox();
        (outbox, self.inbox, self.shutdown)
    }
}

/// Sending half of an agent's bus access, stamped with the agent's name
#[derive(Clone)]
pub struct Outbox {
    name: String,
    directory: Directory,
}

impl Outbox {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Send with the content's default performative
    pub fn send(&self, to: &str, content: Content) {
        let performative = content.performative();
        self.directory.send(&self.name, to, performative, content);
    }

    pub fn send_as(&self, to: &str, performative: Performative, content: Content) {
        self.directory.send(&self.name, to, performative, content);
    }

    pub fn send_all<'a, I>(&self, recipients: I, content: &Content)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for to in recipients {
            self.send(to, content.clone());
        }
    }

    /// Send pre-encoded text through the wire codec
    pub fn send_wire(&self, to: &str, text: &str) -> crate::error::Result<()> {
        self.directory.send_wire(&self.name, to, text)
    }
}

/// Periodic timer whose first tick fires one period from now. Missed ticks
/// are delayed rather than burst.
pub fn ticker(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
