mod common;

use std::sync::Arc;
use std::time::Duration;

use zk_coordinator::Client;
use zk_coordinator::ErrorKind;
use zk_coordinator::Facade;

fn facade(chroot_suffix: &str) -> Facade {
    let config = common::test_config(chroot_suffix);
    let logger = common::test_logger();
    let client = Arc::new(Client::new(config, logger.clone()).expect("connect to zookeeper"));
    Facade::new(client, logger)
}

/// Requires a live zookeeper ensemble reachable at `ZK_COORDINATOR_TEST_SERVERS`
/// (default `localhost:2181`). Run with `cargo test -- --ignored`.
#[test]
#[ignore]
fn create_then_get_data_roundtrips() {
    let facade = facade("create");
    let path = facade
        .create("/widget", Some(b"hello".to_vec()), None, false, true)
        .expect("create widget");
    assert_eq!(path, "/widget");

    let (data, _stat) = facade.get_data("/widget", None).expect("get widget data");
    assert_eq!(data, b"hello".to_vec());

    let error = facade
        .create("/widget", None, None, false, true)
        .expect_err("recreate must fail");
    assert_eq!(error.kind(), ErrorKind::NodeExists("/widget".to_string()));

    facade.delete("/widget", -1).expect("delete widget");
}

#[test]
#[ignore]
fn create_path_fills_in_missing_ancestors() {
    let facade = facade("create-path");
    let created = facade
        .create_path("/a/b/c", Some(b"leaf".to_vec()), None, false, false)
        .expect("create_path");
    assert_eq!(created, "/a/b/c");

    let (data, _) = facade.get_data("/a/b/c", None).expect("get leaf data");
    assert_eq!(data, b"leaf".to_vec());

    // Ancestors were created empty, not carrying the leaf's payload.
    let (ancestor_data, _) = facade.get_data("/a/b", None).expect("get ancestor data");
    assert!(ancestor_data.is_empty());

    facade.delete("/a/b/c", -1).unwrap();
    facade.delete("/a/b", -1).unwrap();
    facade.delete("/a", -1).unwrap();
}

#[test]
#[ignore]
fn exists_reports_absence_then_presence() {
    let facade = facade("exists");
    assert!(facade.exists("/maybe", None).unwrap().is_none());

    facade.create("/maybe", None, None, false, true).unwrap();
    assert!(facade.exists("/maybe", None).unwrap().is_some());

    facade.delete("/maybe", -1).unwrap();
}

#[test]
#[ignore]
fn set_data_then_get_data_observes_new_version() {
    let facade = facade("set-data");
    facade.create("/counter", Some(b"0".to_vec()), None, false, true).unwrap();
    let (_, stat) = facade.get_data("/counter", None).unwrap();

    facade.set_data("/counter", b"1".to_vec(), stat.version).unwrap();
    let (data, new_stat) = facade.get_data("/counter", None).unwrap();
    assert_eq!(data, b"1".to_vec());
    assert!(new_stat.version > stat.version);

    facade.delete("/counter", -1).unwrap();
}

#[test]
#[ignore]
fn async_create_and_async_get_data_complete() {
    let facade = facade("async");
    let created = facade
        .async_create("/async-widget", Some(b"payload".to_vec()), None, false, true)
        .wait()
        .expect("async create completes");
    assert_eq!(created, "/async-widget");

    let (data, _) = facade
        .async_get_data("/async-widget")
        .get(Duration::from_secs(5))
        .expect("async get_data completes");
    assert_eq!(data, b"payload".to_vec());

    facade.async_delete("/async-widget", -1).wait().expect("async delete completes");
}
