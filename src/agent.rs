//! Agent trait - every participant owns its main loop
//!
//! `run()` consumes `self`: an agent is a one-shot tokio task holding its
//! state privately and talking to the rest of the plant only through the
//! `AgentContext` (mailbox in, `Outbox` out, shutdown broadcast).

use async_trait::async_trait;
use serde::Serialize;

use crate::bus::AgentContext;
use crate::error::Result;

/// Level an agent occupies in the control hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Unit,
    Site,
    Global,
    /// Generator, monitor, transport: outside the hierarchy
    Collaborator,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Unit => write!(f, "unit"),
            Tier::Site => write!(f, "site"),
            Tier::Global => write!(f, "global"),
            Tier::Collaborator => write!(f, "collaborator"),
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Mailbox name
    fn name(&self) -> &str;

    fn tier(&self) -> Tier;

    /// Main loop. Returns on shutdown.
    async fn run(self, ctx: AgentContext) -> Result<()>;
}
