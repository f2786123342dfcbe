//! Stream session subsystem

pub mod endpoint;
pub mod state;
pub mod stream;

pub use endpoint::MonitorEndpoints;
pub use state::{DisconnectReason, RetryBudget, SessionState};
pub use stream::{ListenSession, SessionStats};
