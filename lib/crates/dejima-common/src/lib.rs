pub mod agent;
pub mod signals;
pub mod types;

pub use agent::{AgentRecord, AgentStatus};
pub use signals::{CostSignal, RevenueSignal, SignalKind, SignalSummary};
pub use types::*;
