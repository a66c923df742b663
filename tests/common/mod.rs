use std::env;

use slog::Discard;
use slog::Logger;
use slog::o;

use zk_coordinator::ClientConfig;

/// Build a config pointed at `ZK_COORDINATOR_TEST_SERVERS` (default
/// `localhost:2181`), namespaced under a fresh, randomly suffixed chroot so
/// concurrent test runs don't collide.
pub fn test_config(chroot_suffix: &str) -> ClientConfig {
    let servers = env::var("ZK_COORDINATOR_TEST_SERVERS")
        .unwrap_or_else(|_| "localhost:2181".to_string())
        .split(',')
        .map(String::from)
        .collect();
    ClientConfig {
        servers,
        session_timeout_ms: 10_000,
        chroot: format!("/zk-coordinator-tests-{}", chroot_suffix),
    }
}

pub fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}
