use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use slog::Logger;
use zookeeper::Stat;
use zookeeper::WatchedEvent;

use super::super::ErrorKind;
use super::super::Result;
use super::super::backend::zookeeper::client::Client;
use super::super::event::Event;
use super::super::facade::EventWatcher;
use super::super::metrics::WATCH_NOTIFICATIONS_COUNT;
use super::MAX_CONSECUTIVE_FAILURES;

/// Observer invoked whenever a `ChildrenWatch`'s cached child set changes.
/// Receives the full current mapping of child name to its initial snapshot.
pub type ChildrenWatchObserver = Box<dyn Fn(&BTreeMap<String, (Vec<u8>, Stat)>) + Send + Sync>;

struct Inner {
    path: String,
    children: BTreeMap<String, (Vec<u8>, Stat)>,
    watching: bool,
    running: bool,
    failures: u32,
    client: Arc<Client>,
    logger: Logger,
    observer: ChildrenWatchObserver,
    lifecycle: Option<EventWatcher>,
}

/// A long-lived watcher over a node's children, caching each child's data as
/// first observed and re-arming its one-shot zookeeper watch on every
/// notification.
pub struct ChildrenWatch {
    inner: Arc<Mutex<Inner>>,
}

impl ChildrenWatch {
    pub fn new(
        client: Arc<Client>, path: &str, logger: Logger, observer: ChildrenWatchObserver,
        lifecycle: Option<EventWatcher>,
    ) -> ChildrenWatch {
        let inner = Inner {
            path: path.to_string(),
            children: BTreeMap::new(),
            watching: false,
            running: false,
            failures: 0,
            client,
            logger,
            observer,
            lifecycle,
        };
        ChildrenWatch { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Snapshot of the current cached child set.
    pub fn children(&self) -> BTreeMap<String, (Vec<u8>, Stat)> {
        self.inner.lock().expect("children watch lock was poisoned").children.clone()
    }

    pub fn start(&self) -> Result<()> {
        {
            let mut guard = self.inner.lock().expect("children watch lock was poisoned");
            guard.watching = true;
            if guard.running {
                return Ok(());
            }
            guard.running = true;
        }
        ChildrenWatch::poll(&self.inner);
        Ok(())
    }

    pub fn stop(&self) {
        let mut guard = self.inner.lock().expect("children watch lock was poisoned");
        guard.watching = false;
        guard.running = false;
    }

    /// Clear the cached child set after the owning session is observed as
    /// `Expired`; ephemeral children died with it.
    pub fn reset_for_new_session(&self) {
        let mut guard = self.inner.lock().expect("children watch lock was poisoned");
        guard.children.clear();
        guard.running = false;
    }

    /// Re-issue `poll` off the zookeeper dispatch thread: watcher callbacks run
    /// on the library's own I/O thread and must not block it with a
    /// synchronous call back into `Client`.
    fn rearm(inner: &Arc<Mutex<Inner>>) {
        let inner = Arc::clone(inner);
        thread::spawn(move || ChildrenWatch::poll(&inner));
    }

    fn poll(inner: &Arc<Mutex<Inner>>) {
        let (client, path, still_wanted) = {
            let guard = inner.lock().expect("children watch lock was poisoned");
            (Arc::clone(&guard.client), guard.path.clone(), guard.watching)
        };
        if !still_wanted {
            return;
        }

        let closure_inner = Arc::clone(inner);
        let result = client.get_children_w(&path, move |event: WatchedEvent| {
            let _ = event;
            ChildrenWatch::rearm(&closure_inner);
        });

        match result {
            Ok(names) => ChildrenWatch::reconcile(inner, &client, &path, names),
            Err(ref error) if error.kind() == ErrorKind::NoNode(path.clone()) => {
                ChildrenWatch::watch_for_creation(inner, &client, &path);
            }
            Err(ref error) if error.kind() == ErrorKind::Closing => (),
            Err(error) => ChildrenWatch::fail(inner, error),
        }
    }

    /// Parent does not exist yet: install an `exists` watch and pick the
    /// children back up as soon as it is created, mirroring `DataWatch`.
    fn watch_for_creation(inner: &Arc<Mutex<Inner>>, client: &Arc<Client>, path: &str) {
        let closure_inner = Arc::clone(inner);
        let result = client.exists_w(path, move |event: WatchedEvent| {
            let _ = event;
            ChildrenWatch::rearm(&closure_inner);
        });
        match result {
            // Race: the parent may have appeared between the failed
            // get_children and this exists call. Re-poll to pick it up now.
            Ok(Some(_)) => ChildrenWatch::poll(inner),
            Ok(None) => ChildrenWatch::succeed(inner, BTreeMap::new()),
            Err(error) => ChildrenWatch::fail(inner, error),
        }
    }

    /// Diff the server-returned child names against the cache: fetch data for
    /// new children, drop entries for children no longer present.
    fn reconcile(inner: &Arc<Mutex<Inner>>, client: &Arc<Client>, path: &str, names: Vec<String>) {
        let previous = inner.lock().expect("children watch lock was poisoned").children.clone();
        let mut next = BTreeMap::new();
        for name in &names {
            if let Some(existing) = previous.get(name) {
                next.insert(name.clone(), existing.clone());
                continue;
            }
            let child_path = format!("{}/{}", path.trim_end_matches('/'), name);
            match client.get_data(&child_path, false) {
                Ok(snapshot) => {
                    next.insert(name.clone(), snapshot);
                }
                Err(ref error) if error.kind() == ErrorKind::NoNode(child_path.clone()) => {
                    // Deleted between get_children and get_data; simply omit it.
                }
                Err(error) => {
                    ChildrenWatch::fail(inner, error);
                    return;
                }
            }
        }
        ChildrenWatch::succeed(inner, next);
    }

    fn succeed(inner: &Arc<Mutex<Inner>>, children: BTreeMap<String, (Vec<u8>, Stat)>) {
        let mut guard = inner.lock().expect("children watch lock was poisoned");
        guard.failures = 0;
        guard.children = children.clone();
        WATCH_NOTIFICATIONS_COUNT.with_label_values(&["children"]).inc();
        (guard.observer)(&children);
    }

    fn fail(inner: &Arc<Mutex<Inner>>, error: super::super::Error) {
        let retry = {
            let mut guard = inner.lock().expect("children watch lock was poisoned");
            guard.failures += 1;
            warn!(
                guard.logger, "Children watch poll failed";
                "path" => &guard.path, "error" => %error, "failures" => guard.failures
            );
            if guard.failures >= MAX_CONSECUTIVE_FAILURES {
                guard.watching = false;
                guard.running = false;
                guard.children.clear();
                warn!(guard.logger, "Children watch giving up after too many consecutive failures"; "path" => &guard.path);
                if let Some(lifecycle) = &guard.lifecycle {
                    lifecycle(Event::not_watching(&guard.path));
                }
                false
            } else {
                true
            }
        };
        if retry {
            ChildrenWatch::poll(inner);
        }
    }
}
