pub mod context;
pub mod directory;

pub use context::{ticker, AgentContext, Outbox};
pub use directory::{ControlCommand, Directory, DirectoryBuilder, Inbound};
