//! Shared test utilities for the Antigravity Sync workspace.
//!
//! Dev-dependency only. Everything here panics on failure with a message
//! naming the fixture that broke.
//!
//! # Modules
//!
//! - [`remote`]: bare "hosted" repositories reachable over `file://`
//! - [`sandbox`]: [`Replica`] directories standing in for one device

pub mod remote;
pub mod sandbox;

pub use remote::BareRemote;
pub use sandbox::Replica;
