mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use zk_coordinator::Facade;
use zk_coordinator::SessionManager;
use zk_coordinator::SessionState;

/// Requires a live zookeeper ensemble reachable at `ZK_COORDINATOR_TEST_SERVERS`
/// (default `localhost:2181`). Run with `cargo test -- --ignored`.
#[test]
#[ignore]
fn expiration_notifies_observers_and_drops_ephemeral_nodes() {
    let config = common::test_config("session-expiration");
    let manager = SessionManager::start(config, common::test_logger()).expect("start session manager");
    let facade = Facade::new(manager.client(), common::test_logger());

    facade.create("/persistent", Some(b"data".to_vec()), None, false, false).unwrap();
    facade.create("/ephemeral", Some(b"data".to_vec()), None, false, true).unwrap();

    let observed_expired = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&observed_expired);
    manager.add_session_observer(Box::new(move |state| {
        if state == SessionState::Expired {
            *flag.lock().unwrap() = true;
        }
    }));

    zk_coordinator::testing::force_session_expiration(&manager.client(), &common::test_logger())
        .expect("force session expiration");
    thread::sleep(Duration::from_secs(1));

    assert!(*observed_expired.lock().unwrap(), "session manager did not observe Expired");

    // The session re-establishes on demand; the ephemeral node died with the
    // old one, the persistent node survives.
    let ephemeral_gone = facade.exists("/ephemeral", None).unwrap().is_none();
    assert!(ephemeral_gone);
    let (data, _) = facade.get_data("/persistent", None).unwrap();
    assert_eq!(data, b"data".to_vec());

    facade.delete("/persistent", -1).unwrap();
}
