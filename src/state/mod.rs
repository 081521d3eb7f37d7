//! Shared server state.

pub mod channel;
pub mod channels;
pub mod monitor;
pub mod network;
pub mod registration;
pub mod stats;
pub mod uid;
pub mod user;
pub mod users;
pub mod whowas;

pub use channel::{Channel, ChannelModes, ListEntry, Member, MemberModes, Topic};
pub use channels::ChannelManager;
pub use monitor::MonitorManager;
pub use network::{Network, ServerInfo};
pub use registration::{Handshake, Phase};
pub use stats::StatsTracker;
pub use uid::UidGenerator;
pub use user::{User, UserModes};
pub use users::UserManager;
pub use whowas::{WhowasEntry, WhowasStore};

/// A TS6 user identifier (`SID` + 6 chars).
pub type Uid = String;

/// A TS6 server identifier (3 chars).
pub type Sid = String;
