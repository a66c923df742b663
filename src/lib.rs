extern crate crossbeam_channel;
extern crate failure;
extern crate failure_derive;
extern crate humthreads;
#[macro_use]
extern crate lazy_static;
extern crate md5;
extern crate prometheus;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
#[macro_use]
extern crate slog;
extern crate zookeeper;

mod async_result;
mod backend;
mod config;
mod error;
mod event;
mod facade;
mod metrics;
mod session;
mod watch;

pub mod testing;

pub use self::async_result::AsyncResult;
pub use self::backend::zookeeper::Client;
pub use self::config::ClientConfig;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::error::Result;
pub use self::event::Event;
pub use self::event::EventType;
pub use self::event::SessionState;
pub use self::facade::EventWatcher;
pub use self::facade::Facade;
pub use self::metrics::register_metrics;
pub use self::session::SessionManager;
pub use self::session::SessionObserver;
pub use self::watch::ChildrenWatch;
pub use self::watch::ChildrenWatchObserver;
pub use self::watch::DataSnapshot;
pub use self::watch::DataWatch;
pub use self::watch::DataWatchObserver;
pub use self::watch::HashringChange;
pub use self::watch::HashringWatch;
pub use self::watch::HashringWatchObserver;
pub use self::watch::RingNode;
pub use self::watch::hex_to_token;
pub use self::watch::token_to_hex;
