pub mod filter;
pub mod orchestrator;
pub mod state;
pub mod status;
pub mod timing;

pub use filter::{FilterPipeline, FilterVerdict, ReasonCode};
pub use orchestrator::{Collaborators, Orchestrator, RunSummary};
pub use state::{RunPhase, RunState, StopReason};
pub use status::{StatusHub, StatusListener, TracingStatusListener};
pub use timing::{ActionWindow, TimingController};
