pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::{ChannelError, ChannelResult};
pub use orchestrator::{ChannelOrchestrator, ChannelSet};
pub use types::{ChannelRecord, ChannelStatus, Direction, FundingPolicy};
