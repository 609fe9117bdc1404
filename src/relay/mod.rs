//! Relay loop for signed multisig outputs
//!
//! The poller pages through pending outputs on a fixed interval and the
//! handler broadcasts each one whose signatures are complete.

pub mod handler;
pub mod poller;

pub use poller::Poller;
