pub mod client;
pub mod metrics;

pub use self::client::Client;
pub use self::metrics::register_metrics;
