//! The conversation loop: inbox messages, states, the controller, and its
//! async runner.

pub mod coordinator;
pub mod messages;
pub mod runner;
pub mod state;
