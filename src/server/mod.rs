//! The read-only status/health reporting surface (§6): never an ACME
//! server, since acting as a CA is an explicit non-goal.
pub mod health;
pub mod status;

pub use health::HealthCheck;
pub use status::{StatusServerState, serve};
