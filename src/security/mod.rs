//! Security: host cloaking, server bans, flood protection.

pub mod bans;
pub mod cloak;
pub mod flood;
pub mod password;

pub use bans::{BanKind, BanManager, ServerBan};
pub use flood::{ConnectionThrottle, TokenBucket};
