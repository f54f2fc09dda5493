//! Native shell integration: a versioned JSON contract, a command router,
//! shell-backed leaves, and a stdin/stdout bridge.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod leaves;
pub mod stdio;
