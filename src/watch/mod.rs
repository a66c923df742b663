mod children;
mod data;
mod hashring;

pub use self::children::ChildrenWatch;
pub use self::children::ChildrenWatchObserver;
pub use self::data::DataSnapshot;
pub use self::data::DataWatch;
pub use self::data::DataWatchObserver;
pub use self::hashring::HashringChange;
pub use self::hashring::HashringWatch;
pub use self::hashring::HashringWatchObserver;
pub use self::hashring::RingNode;
pub use self::hashring::hex_to_token;
pub use self::hashring::token_to_hex;

/// Consecutive watch failures tolerated before a watcher gives up and reports
/// `NotWatching`.
pub(crate) const MAX_CONSECUTIVE_FAILURES: u32 = 10;
