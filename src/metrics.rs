use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Opts;
use prometheus::Registry;
use slog::Logger;


lazy_static! {
    pub static ref ZOO_SESSION_EXPIRED_COUNT: Counter = Counter::new(
        "zk_coordinator_session_expired",
        "Number of times the zookeeper session was observed as expired"
    ).expect("Failed to create ZOO_SESSION_EXPIRED_COUNT counter");

    /// Counter for watch notifications delivered to observers, keyed by watch kind.
    pub static ref WATCH_NOTIFICATIONS_COUNT: CounterVec = CounterVec::new(
        Opts::new(
            "zk_coordinator_watch_notifications",
            "Number of watch notifications delivered to observers"
        ),
        &["kind"]
    ).expect("Failed to create WATCH_NOTIFICATIONS_COUNT counter");

    /// Counter for hashring position churn, keyed by direction (gained/lost).
    pub static ref HASHRING_CHURN_COUNT: CounterVec = CounterVec::new(
        Opts::new(
            "zk_coordinator_hashring_churn",
            "Number of hashring positions gained or lost"
        ),
        &["direction"]
    ).expect("Failed to create HASHRING_CHURN_COUNT counter");
}


/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(err) = registry.register(Box::new(ZOO_SESSION_EXPIRED_COUNT.clone())) {
        debug!(logger, "Failed to register ZOO_SESSION_EXPIRED_COUNT"; "error" => ?err);
    }
    if let Err(err) = registry.register(Box::new(WATCH_NOTIFICATIONS_COUNT.clone())) {
        debug!(logger, "Failed to register WATCH_NOTIFICATIONS_COUNT"; "error" => ?err);
    }
    if let Err(err) = registry.register(Box::new(HASHRING_CHURN_COUNT.clone())) {
        debug!(logger, "Failed to register HASHRING_CHURN_COUNT"; "error" => ?err);
    }
    super::backend::zookeeper::register_metrics(logger, registry);
}
