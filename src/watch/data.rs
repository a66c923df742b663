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

/// Observer invoked whenever a `DataWatch`'s cached snapshot changes.
pub type DataWatchObserver = Box<dyn Fn(&DataSnapshot) + Send + Sync>;

/// Cached data and stat for the watched node, or absence thereof.
#[derive(Clone, Debug, Default)]
pub struct DataSnapshot {
    pub data: Option<Vec<u8>>,
    pub stat: Option<Stat>,
}

struct Inner {
    path: String,
    snapshot: DataSnapshot,
    watching: bool,
    running: bool,
    failures: u32,
    client: Arc<Client>,
    logger: Logger,
    observer: DataWatchObserver,
    lifecycle: Option<EventWatcher>,
}

/// A long-lived watcher over a single node's data that survives node absence
/// and session expiration, re-arming its one-shot zookeeper watch on every
/// notification.
pub struct DataWatch {
    inner: Arc<Mutex<Inner>>,
}

impl DataWatch {
    pub fn new(
        client: Arc<Client>, path: &str, logger: Logger, observer: DataWatchObserver,
        lifecycle: Option<EventWatcher>,
    ) -> DataWatch {
        let inner = Inner {
            path: path.to_string(),
            snapshot: DataSnapshot::default(),
            watching: false,
            running: false,
            failures: 0,
            client,
            logger,
            observer,
            lifecycle,
        };
        DataWatch { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Current cached snapshot.
    pub fn snapshot(&self) -> DataSnapshot {
        self.inner.lock().expect("data watch lock was poisoned").snapshot.clone()
    }

    /// Mark the watch as wanted and install it if not already running.
    pub fn start(&self) -> Result<()> {
        {
            let mut guard = self.inner.lock().expect("data watch lock was poisoned");
            guard.watching = true;
            if guard.running {
                return Ok(());
            }
            guard.running = true;
        }
        DataWatch::poll(&self.inner);
        Ok(())
    }

    /// Stop wanting the watch; an in-flight notification still fires but will
    /// not re-arm.
    pub fn stop(&self) {
        let mut guard = self.inner.lock().expect("data watch lock was poisoned");
        guard.watching = false;
        guard.running = false;
    }

    /// Clear the cached snapshot and allow `start` to re-install the watch
    /// (called after the owning session is observed as `Expired`).
    pub fn reset_for_new_session(&self) {
        let mut guard = self.inner.lock().expect("data watch lock was poisoned");
        guard.snapshot = DataSnapshot::default();
        guard.running = false;
    }

    /// Re-issue `poll` off the zookeeper dispatch thread: watcher callbacks run
    /// on the library's own I/O thread and must not block it with a
    /// synchronous call back into `Client`.
    fn rearm(inner: &Arc<Mutex<Inner>>) {
        let inner = Arc::clone(inner);
        thread::spawn(move || DataWatch::poll(&inner));
    }

    fn poll(inner: &Arc<Mutex<Inner>>) {
        let (client, path, still_wanted) = {
            let guard = inner.lock().expect("data watch lock was poisoned");
            (Arc::clone(&guard.client), guard.path.clone(), guard.watching)
        };
        if !still_wanted {
            return;
        }

        let closure_inner = Arc::clone(inner);
        let result = client.get_data_w(&path, move |event: WatchedEvent| {
            let _ = event;
            DataWatch::rearm(&closure_inner);
        });

        match result {
            Ok((data, stat)) => {
                DataWatch::succeed(inner, DataSnapshot { data: Some(data), stat: Some(stat) });
            }
            Err(ref error) if error.kind() == ErrorKind::NoNode(path.clone()) => {
                DataWatch::watch_for_creation(inner, &client, &path);
            }
            Err(ref error) if error.kind() == ErrorKind::Closing => (),
            Err(error) => DataWatch::fail(inner, error),
        }
    }

    fn watch_for_creation(inner: &Arc<Mutex<Inner>>, client: &Arc<Client>, path: &str) {
        let closure_inner = Arc::clone(inner);
        let result = client.exists_w(path, move |event: WatchedEvent| {
            let _ = event;
            DataWatch::rearm(&closure_inner);
        });
        match result {
            // Race: the node may have appeared between the failed get_data and
            // this exists call. Re-issue get_data to pick it up immediately.
            Ok(Some(_)) => DataWatch::poll(inner),
            Ok(None) => DataWatch::succeed(inner, DataSnapshot::default()),
            Err(error) => DataWatch::fail(inner, error),
        }
    }

    fn succeed(inner: &Arc<Mutex<Inner>>, snapshot: DataSnapshot) {
        let mut guard = inner.lock().expect("data watch lock was poisoned");
        guard.failures = 0;
        guard.snapshot = snapshot.clone();
        WATCH_NOTIFICATIONS_COUNT.with_label_values(&["data"]).inc();
        (guard.observer)(&snapshot);
    }

    fn fail(inner: &Arc<Mutex<Inner>>, error: super::super::Error) {
        let retry = {
            let mut guard = inner.lock().expect("data watch lock was poisoned");
            guard.failures += 1;
            warn!(
                guard.logger, "Data watch poll failed";
                "path" => &guard.path, "error" => %error, "failures" => guard.failures
            );
            if guard.failures >= MAX_CONSECUTIVE_FAILURES {
                guard.watching = false;
                guard.running = false;
                guard.snapshot = DataSnapshot::default();
                warn!(guard.logger, "Data watch giving up after too many consecutive failures"; "path" => &guard.path);
                if let Some(lifecycle) = &guard.lifecycle {
                    lifecycle(Event::not_watching(&guard.path));
                }
                false
            } else {
                true
            }
        };
        if retry {
            DataWatch::poll(inner);
        }
    }
}
