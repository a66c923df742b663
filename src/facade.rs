use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::time::Duration;

use slog::Logger;
use zookeeper::Acl;
use zookeeper::CreateMode;
use zookeeper::Stat;
use zookeeper::WatchedEvent;

use super::ErrorKind;
use super::Result;
use super::async_result::AsyncResult;
use super::backend::zookeeper::client::Client;
use super::event::Event;

/// A user-supplied watcher callback, adapted from the raw zookeeper event shape.
pub type EventWatcher = Box<dyn Fn(Event) + Send + Sync>;

/// Adapt a user-supplied watcher into the shape the zookeeper crate's callback
/// dispatcher expects. The watcher runs behind `catch_unwind`: a panicking
/// watcher is logged and swallowed rather than unwinding into the library's
/// own event-dispatch thread.
fn adapt(logger: Logger, watcher: EventWatcher) -> impl Fn(WatchedEvent) + Send + 'static {
    move |raw: WatchedEvent| {
        let event = Event::from(raw);
        debug!(logger, "Delivering watch event"; "kind" => ?event.kind, "path" => ?event.path);
        let result = catch_unwind(AssertUnwindSafe(|| watcher(event)));
        if result.is_err() {
            error!(logger, "Watcher callback panicked, ignoring");
        }
    }
}

/// Blocking and asynchronous node operations against a single zookeeper session.
///
/// This is the only way code outside of this crate talks to zookeeper: every
/// operation is metrics-wrapped and error-mapped by the underlying `Client`,
/// and watcher callbacks are always delivered as a typed `Event`, never as a
/// raw `zookeeper::WatchedEvent`.
pub struct Facade {
    client: Arc<Client>,
    logger: Logger,
}

impl Facade {
    pub fn new(client: Arc<Client>, logger: Logger) -> Facade {
        Facade { client, logger }
    }

    /// Create a node at `path`.
    ///
    /// `acl` defaults to `Acl::open_unsafe()`. When `sequence` is set, the
    /// server appends a monotonic suffix and the actual created path is
    /// returned. When `ephemeral` is set, the node is removed when this
    /// session ends.
    pub fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        acl: Option<Vec<Acl>>,
        sequence: bool,
        ephemeral: bool,
    ) -> Result<String> {
        let data = data.unwrap_or_default();
        let acl = acl.unwrap_or_else(|| Acl::open_unsafe().clone());
        let mode = Facade::create_mode(sequence, ephemeral);
        self.client.create(path, data, acl, mode)
    }

    /// Create `path` and every missing ancestor. Ancestors are created empty
    /// with `acl`; only the leaf carries `data`, `sequence` and `ephemeral`.
    pub fn create_path(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        acl: Option<Vec<Acl>>,
        sequence: bool,
        ephemeral: bool,
    ) -> Result<String> {
        let acl = acl.unwrap_or_else(|| Acl::open_unsafe().clone());
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        let mut prefix = String::new();
        let ancestors = &segments[..segments.len().saturating_sub(1)];
        for segment in ancestors {
            prefix.push('/');
            prefix.push_str(segment);
            match self.client.create(&prefix, Vec::new(), acl.clone(), CreateMode::Persistent) {
                Ok(_) => (),
                Err(ref error) if error.kind() == ErrorKind::NodeExists(prefix.clone()) => (),
                Err(error) => return Err(error),
            }
        }
        self.create(path, data, Some(acl), sequence, ephemeral)
    }

    /// Check whether `path` exists, optionally installing a one-shot watch.
    pub fn exists(&self, path: &str, watcher: Option<EventWatcher>) -> Result<Option<Stat>> {
        match watcher {
            None => self.client.exists(path, false),
            Some(watcher) => {
                let adapted = adapt(self.logger.clone(), watcher);
                self.client.exists_w(path, adapted)
            }
        }
    }

    /// List the children of `path`, optionally installing a one-shot watch.
    pub fn get_children(&self, path: &str, watcher: Option<EventWatcher>) -> Result<Vec<String>> {
        match watcher {
            None => self.client.get_children(path, false),
            Some(watcher) => {
                let adapted = adapt(self.logger.clone(), watcher);
                self.client.get_children_w(path, adapted)
            }
        }
    }

    /// Read the data and stat of `path`, optionally installing a one-shot watch.
    pub fn get_data(&self, path: &str, watcher: Option<EventWatcher>) -> Result<(Vec<u8>, Stat)> {
        match watcher {
            None => self.client.get_data(path, false),
            Some(watcher) => {
                let adapted = adapt(self.logger.clone(), watcher);
                self.client.get_data_w(path, adapted)
            }
        }
    }

    /// Overwrite the data at `path`. `version = -1` matches any version.
    pub fn set_data(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat> {
        let version = if version < 0 { None } else { Some(version) };
        self.client.set_data(path, data, version)
    }

    /// Delete `path`. `version = -1` matches any version.
    pub fn delete(&self, path: &str, version: i32) -> Result<()> {
        let version = if version < 0 { None } else { Some(version) };
        self.client.delete(path, version)
    }

    fn create_mode(sequence: bool, ephemeral: bool) -> CreateMode {
        match (sequence, ephemeral) {
            (false, false) => CreateMode::Persistent,
            (false, true) => CreateMode::Ephemeral,
            (true, false) => CreateMode::PersistentSequential,
            (true, true) => CreateMode::EphemeralSequential,
        }
    }
}

/// Async completion handles mirroring each blocking operation.
///
/// Every `async_*` call spawns the blocking call on a throwaway thread and
/// completes the returned `AsyncResult` with its outcome. This keeps the
/// `zookeeper` crate's own synchronous API as the only I/O path while still
/// giving callers a non-blocking handle to wait on with a timeout.
impl Facade {
    pub fn async_create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        acl: Option<Vec<Acl>>,
        sequence: bool,
        ephemeral: bool,
    ) -> AsyncResult<String> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let data = data.unwrap_or_default();
        let acl = acl.unwrap_or_else(|| Acl::open_unsafe().clone());
        let mode = Facade::create_mode(sequence, ephemeral);
        let handle = result.clone();
        ::std::thread::spawn(move || match client.create(&path, data, acl, mode) {
            Ok(created) => handle.set(created),
            Err(error) => handle.fail(error),
        });
        result
    }

    pub fn async_exists(&self, path: &str) -> AsyncResult<Option<Stat>> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let handle = result.clone();
        ::std::thread::spawn(move || match client.exists(&path, false) {
            Ok(stat) => handle.set(stat),
            Err(error) => handle.fail(error),
        });
        result
    }

    pub fn async_get_children(&self, path: &str) -> AsyncResult<Vec<String>> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let handle = result.clone();
        ::std::thread::spawn(move || match client.get_children(&path, false) {
            Ok(children) => handle.set(children),
            Err(error) => handle.fail(error),
        });
        result
    }

    pub fn async_get_data(&self, path: &str) -> AsyncResult<(Vec<u8>, Stat)> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let handle = result.clone();
        ::std::thread::spawn(move || match client.get_data(&path, false) {
            Ok(data) => handle.set(data),
            Err(error) => handle.fail(error),
        });
        result
    }

    pub fn async_set_data(&self, path: &str, data: Vec<u8>, version: i32) -> AsyncResult<Stat> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let version = if version < 0 { None } else { Some(version) };
        let handle = result.clone();
        ::std::thread::spawn(move || match client.set_data(&path, data, version) {
            Ok(stat) => handle.set(stat),
            Err(error) => handle.fail(error),
        });
        result
    }

    pub fn async_delete(&self, path: &str, version: i32) -> AsyncResult<()> {
        let result = AsyncResult::new(self.logger.clone());
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        let version = if version < 0 { None } else { Some(version) };
        let handle = result.clone();
        ::std::thread::spawn(move || match client.delete(&path, version) {
            Ok(()) => handle.set(()),
            Err(error) => handle.fail(error),
        });
        result
    }
}

/// Bound for how long a facade's `async_*` handles may be waited on in tests.
#[cfg(test)]
pub(crate) const TEST_WAIT: Duration = Duration::from_secs(5);
