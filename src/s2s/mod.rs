//! Server-to-server (S2S) linking.
//!
//! TS6-like protocol: each server has a 3-character SID, users are
//! addressed by 9-character UIDs, and state floods across a spanning
//! tree of direct links. Conflicts resolve by timestamp.

pub mod burst;
pub mod handlers;
pub mod link;
pub mod manager;

pub use manager::{LinkManager, PeerHandle, ServerNode};
