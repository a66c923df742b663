mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use zk_coordinator::Client;
use zk_coordinator::ChildrenWatch;
use zk_coordinator::DataWatch;
use zk_coordinator::Facade;
use zk_coordinator::HashringWatch;

fn client(chroot_suffix: &str) -> Arc<Client> {
    let config = common::test_config(chroot_suffix);
    let logger = common::test_logger();
    Arc::new(Client::new(config, logger).expect("connect to zookeeper"))
}

/// Requires a live zookeeper ensemble reachable at `ZK_COORDINATOR_TEST_SERVERS`
/// (default `localhost:2181`). Run with `cargo test -- --ignored`.
#[test]
#[ignore]
fn data_watch_observes_creation_and_change() {
    let client = client("data-watch");
    let facade = Facade::new(Arc::clone(&client), common::test_logger());
    let snapshots: Arc<Mutex<Vec<Option<Vec<u8>>>>> = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&snapshots);
    let watch = DataWatch::new(
        Arc::clone(&client),
        "/watched-node",
        common::test_logger(),
        Box::new(move |snapshot| {
            recorded.lock().unwrap().push(snapshot.data.clone());
        }),
        None,
    );
    watch.start().expect("start data watch");
    thread::sleep(Duration::from_millis(200));

    facade.create("/watched-node", Some(b"v1".to_vec()), None, false, true).unwrap();
    thread::sleep(Duration::from_millis(500));
    facade.set_data("/watched-node", b"v2".to_vec(), -1).unwrap();
    thread::sleep(Duration::from_millis(500));

    let seen = snapshots.lock().unwrap().clone();
    assert!(seen.iter().any(|data| data.as_deref() == Some(&b"v1"[..])));
    assert!(seen.iter().any(|data| data.as_deref() == Some(&b"v2"[..])));

    watch.stop();
    facade.delete("/watched-node", -1).unwrap();
}

#[test]
#[ignore]
fn children_watch_tracks_membership_changes() {
    let client = client("children-watch");
    let facade = Facade::new(Arc::clone(&client), common::test_logger());
    facade.create("/members", None, None, false, false).unwrap();

    let last: Arc<Mutex<BTreeMap<String, (Vec<u8>, zookeeper::Stat)>>> =
        Arc::new(Mutex::new(BTreeMap::new()));
    let recorded = Arc::clone(&last);
    let watch = ChildrenWatch::new(
        Arc::clone(&client),
        "/members",
        common::test_logger(),
        Box::new(move |children| {
            *recorded.lock().unwrap() = children.clone();
        }),
        None,
    );
    watch.start().expect("start children watch");
    thread::sleep(Duration::from_millis(200));

    facade.create("/members/a", Some(b"a-data".to_vec()), None, false, true).unwrap();
    thread::sleep(Duration::from_millis(500));
    assert!(last.lock().unwrap().contains_key("a"));

    facade.delete("/members/a", -1).unwrap();
    thread::sleep(Duration::from_millis(500));
    assert!(!last.lock().unwrap().contains_key("a"));

    watch.stop();
    facade.delete("/members", -1).unwrap();
}

#[test]
#[ignore]
fn hashring_watch_adds_and_removes_positions() {
    let client_a = client("hashring");
    let client_b = client("hashring");

    let ring_a: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
    let recorded_a = Arc::clone(&ring_a);
    let watch_a = HashringWatch::new(
        Arc::clone(&client_a),
        "/ring",
        vec![None],
        None,
        common::test_logger(),
        Box::new(move |change| {
            *recorded_a.lock().unwrap() = change.current.len();
        }),
        None,
    );
    watch_a.start().expect("start hashring watch a");
    thread::sleep(Duration::from_millis(300));
    assert_eq!(*ring_a.lock().unwrap(), 1);

    let watch_b = HashringWatch::new(
        Arc::clone(&client_b),
        "/ring",
        vec![None, None],
        None,
        common::test_logger(),
        Box::new(|_| {}),
        None,
    );
    watch_b.start().expect("start hashring watch b");
    thread::sleep(Duration::from_millis(500));
    assert_eq!(*ring_a.lock().unwrap(), 3);

    let key = b"some-routing-key";
    let preference = watch_a.preference_list(key);
    assert_eq!(preference.len(), 3);

    watch_b.stop();
    thread::sleep(Duration::from_millis(500));
    assert_eq!(*ring_a.lock().unwrap(), 1);

    watch_a.stop();
}
