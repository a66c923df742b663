use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use failure::ResultExt;
use slog::Logger;

use zookeeper::Acl;
use zookeeper::CreateMode;
use zookeeper::Stat;
use zookeeper::Watcher;
use zookeeper::ZkError;
use zookeeper::ZkResult;
use zookeeper::ZkState;
use zookeeper::ZooKeeper;

use super::super::super::ErrorKind;
use super::super::super::Result;
use super::super::super::config::ClientConfig;
use super::super::super::event::SessionState;

use super::metrics::ZOO_CONNECTION_COUNT;
use super::metrics::ZOO_OP_DURATION;
use super::metrics::ZOO_OP_ERRORS_COUNT;
use super::metrics::ZOO_TIMEOUTS_COUNT;


/// Wrapper around a `ZooKeeper` instance to handle [re]connection requests.
///
/// Every operation is a metrics-wrapped, reconnect-on-demand call against
/// whatever handle is currently active; callers never see a stale or closed
/// `ZooKeeper` instance.
pub struct Client {
    config: ClientConfig,
    keeper: Mutex<Option<CurrentClient>>,
    logger: Logger,
    session_state: Arc<Mutex<SessionState>>,
    session_generation: AtomicU64,
}

impl Client {
    pub fn new(config: ClientConfig, logger: Logger) -> Result<Client> {
        let client = Client {
            config,
            keeper: Mutex::new(None),
            logger,
            session_state: Arc::new(Mutex::new(SessionState::Connecting)),
            session_generation: AtomicU64::new(0),
        };
        let current = client.new_client()?;
        *client.keeper.lock().expect("zookeeper client lock was poisoned") = Some(current);
        Ok(client)
    }

    /// Current session connection state, as last observed by the connection listener.
    pub fn session_state(&self) -> SessionState {
        *self.session_state.lock().expect("session state lock was poisoned")
    }

    /// Configured session timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.config.session_timeout_ms)
    }

    /// Monotonically increasing counter bumped every time a brand new
    /// zookeeper session is established (including the initial connect).
    /// Stands in for the session id the underlying `zookeeper` crate does not
    /// expose: a caller observing this value change has observed a new
    /// session.
    pub fn session_generation(&self) -> u64 {
        self.session_generation.load(Ordering::Relaxed)
    }

    /// Return the current or a freshly reconnected zookeeper client.
    pub fn get(&self) -> Result<Arc<ZooKeeper>> {
        let mut guard = self.keeper.lock().expect("zookeeper client lock was poisoned");
        let reconnect = match guard.as_ref() {
            Some(current) => !current.active(),
            None => true,
        };
        if reconnect {
            let current = self.new_client()?;
            *guard = Some(current);
        }
        Ok(guard.as_ref().expect("client set above").client())
    }

    /// Wrapper for `ZooKeeper::create` to track metrics and map errors.
    pub fn create(
        &self, path: &str, payload: Vec<u8>, acl: Vec<Acl>, mode: CreateMode,
    ) -> Result<String> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        let created = Client::timed(path, "create", || keeper.create(&full, payload, acl, mode))?;
        Ok(self.relative_path(&created))
    }

    /// Wrapper for `ZooKeeper::delete` to track metrics and map errors.
    pub fn delete(&self, path: &str, version: Option<i32>) -> Result<()> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "delete", || keeper.delete(&full, version))
    }

    /// Wrapper for `ZooKeeper::exists` to track metrics and map errors.
    pub fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "exists", || keeper.exists(&full, watch))
    }

    /// Wrapper for `ZooKeeper::exists_w` to track metrics and map errors.
    pub fn exists_w<W>(&self, path: &str, watcher: W) -> Result<Option<Stat>>
        where W: Watcher + 'static
    {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "exists_w", || keeper.exists_w(&full, watcher))
    }

    /// Wrapper for `ZooKeeper::get_children` to track metrics and map errors.
    pub fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "get_children", || keeper.get_children(&full, watch))
    }

    /// Wrapper for `ZooKeeper::get_children_w` to track metrics and map errors.
    pub fn get_children_w<W>(&self, path: &str, watcher: W) -> Result<Vec<String>>
        where W: Watcher + 'static
    {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "get_children_w", || keeper.get_children_w(&full, watcher))
    }

    /// Wrapper for `ZooKeeper::get_data` to track metrics and map errors.
    pub fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat)> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "get_data", || keeper.get_data(&full, watch))
    }

    /// Wrapper for `ZooKeeper::get_data_w` to track metrics and map errors.
    pub fn get_data_w<W>(&self, path: &str, watcher: W) -> Result<(Vec<u8>, Stat)>
        where W: Watcher + 'static
    {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "get_data_w", || keeper.get_data_w(&full, watcher))
    }

    /// Wrapper for `ZooKeeper::set_data` to track metrics and map errors.
    pub fn set_data(&self, path: &str, data: Vec<u8>, version: Option<i32>) -> Result<Stat> {
        let keeper = self.get()?;
        let full = self.full_path(path);
        Client::timed(path, "set_data", || keeper.set_data(&full, data, version))
    }

    /// Create the given path as an empty persistent node, tolerating a racing creator.
    pub fn mkcontainer(&self, path: &str) -> Result<()> {
        let result = self.create(path, Vec::new(), Acl::open_unsafe().clone(), CreateMode::Persistent);
        match result {
            Ok(_) => Ok(()),
            Err(ref error) if error.kind() == ErrorKind::NodeExists(path.to_string()) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Prefix a caller-supplied, chroot-relative path with the configured root.
    fn full_path(&self, path: &str) -> String {
        if self.config.chroot == "/" {
            return path.to_string();
        }
        if path == "/" {
            return self.config.chroot.clone();
        }
        format!("{}{}", self.config.chroot, path)
    }

    /// Strip the configured root back off a path returned by the underlying client.
    fn relative_path(&self, path: &str) -> String {
        if self.config.chroot == "/" {
            return path.to_string();
        }
        path.strip_prefix(&self.config.chroot).unwrap_or(path).to_string()
    }

    fn timed<F, R>(path: &str, operation: &'static str, call: F) -> Result<R>
        where F: FnOnce() -> ZkResult<R>
    {
        let timer = ZOO_OP_DURATION.with_label_values(&[operation]).start_timer();
        let result = call();
        timer.observe_duration();
        result.map_err(|error| {
            ZOO_OP_ERRORS_COUNT.with_label_values(&[operation]).inc();
            if error == ZkError::OperationTimeout {
                ZOO_TIMEOUTS_COUNT.inc();
            }
            ErrorKind::from_zk(error, path).into()
        })
    }

    /// Ensure the given path exists as a persistent node, creating it if needed.
    fn ensure_persistent(&self, path: &str, keeper: &ZooKeeper) -> Result<()> {
        let not_exists = Client::timed(path, "exists", || keeper.exists(path, false))?.is_none();
        if not_exists {
            info!(self.logger, "Creating missing persistent container"; "path" => path);
            let result = Client::timed(path, "create", || {
                keeper.create(path, Vec::new(), Acl::open_unsafe().clone(), CreateMode::Persistent)
            });
            match result {
                Ok(_) => (),
                Err(ref error) if error.kind() == ErrorKind::NodeExists(path.to_string()) => (),
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Establish a brand new zookeeper session and wire the connection listener.
    fn new_client(&self) -> Result<CurrentClient> {
        info!(self.logger, "Initiating new zookeeper session");
        self.session_generation.fetch_add(1, Ordering::Relaxed);
        let timeout = Duration::from_millis(self.config.session_timeout_ms);
        ZOO_CONNECTION_COUNT.inc();
        let connect_string = self.config.connect_string();
        let timer = ZOO_OP_DURATION.with_label_values(&["connect"]).start_timer();
        let keeper = ZooKeeper::connect(&connect_string, timeout, |_| {})
            .map_err(|error| {
                ZOO_OP_ERRORS_COUNT.with_label_values(&["connect"]).inc();
                error
            })
            .with_context(|_| ErrorKind::BackendConnect)?;
        timer.observe_duration();

        if self.config.chroot != "/" {
            self.ensure_persistent(&self.config.chroot, &keeper)
                .with_context(|_| ErrorKind::Backend("ensure chroot exists"))?;
        }

        let logger = self.logger.clone();
        let active = Arc::new(AtomicBool::new(true));
        let notify_close = Arc::clone(&active);
        let session_state = Arc::clone(&self.session_state);
        keeper.add_listener(move |state| {
            let mut current_state = session_state.lock().expect("session state lock was poisoned");
            *current_state = SessionState::from(state);
            let reset = match state {
                ZkState::AuthFailed => {
                    error!(logger, "Zookeeper authentication error");
                    true
                }
                ZkState::Closed => {
                    warn!(logger, "Zookeeper session closed");
                    true
                }
                ZkState::Connected => {
                    info!(logger, "Zookeeper connection established");
                    false
                }
                ZkState::ConnectedReadOnly => {
                    warn!(logger, "Zookeeper connection is read-only");
                    false
                }
                ZkState::Connecting => {
                    debug!(logger, "Zookeeper session connecting");
                    false
                }
                ZkState::Associating | ZkState::NotConnected => false,
            };
            if reset {
                notify_close.store(false, Ordering::Relaxed);
                debug!(logger, "Zookeeper session marked as not active");
            }
        });

        Ok(CurrentClient {
            active,
            keeper: Arc::new(keeper),
        })
    }
}


/// Holder of the current zookeeper client with its `active` flag.
struct CurrentClient {
    active: Arc<AtomicBool>,
    keeper: Arc<ZooKeeper>,
}

impl CurrentClient {
    fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn client(&self) -> Arc<ZooKeeper> {
        Arc::clone(&self.keeper)
    }
}
