use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use failure::ResultExt;
use humthreads::Builder as ThreadBuilder;
use humthreads::Thread;
use humthreads::ThreadScope;
use slog::Logger;

use super::ErrorKind;
use super::Result;
use super::backend::zookeeper::client::Client;
use super::config::ClientConfig;
use super::event::SessionState;
use super::metrics::ZOO_SESSION_EXPIRED_COUNT;


/// A session observer: invoked, in registration order, on every session state change.
///
/// Observers run on the session manager's private worker thread, copied out of
/// the registered list before the call so they never run with the observers
/// lock held. A panicking observer is caught, logged, and does not stop the
/// remaining observers or the worker thread.
pub type SessionObserver = Arc<dyn Fn(SessionState) + Send + Sync>;

enum Command {
    Stop,
}

/// Owns exactly one zookeeper session and serializes delivery of its state
/// transitions to registered observers from a single private worker thread.
pub struct SessionManager {
    client: Arc<Client>,
    logger: Logger,
    observers: Arc<Mutex<Vec<SessionObserver>>>,
    worker: Mutex<Option<Thread<()>>>,
    commands: Option<Sender<Command>>,
}

impl SessionManager {
    /// Connect to the ensemble and spawn the private worker thread.
    pub fn start(config: ClientConfig, logger: Logger) -> Result<SessionManager> {
        let client = Arc::new(Client::new(config, logger.clone())?);
        let observers: Arc<Mutex<Vec<SessionObserver>>> = Arc::new(Mutex::new(Vec::new()));
        let (commands_tx, commands_rx) = bounded(16);

        let worker_logger = logger.clone();
        let worker_observers = Arc::clone(&observers);
        let worker_client = Arc::clone(&client);
        let thread = ThreadBuilder::new("zk-session")
            .full_name("zk-coordinator:session-manager")
            .spawn(move |scope: ThreadScope| {
                scope.activity("watching zookeeper session state");
                SessionManager::worker_loop(
                    &scope, worker_client, worker_observers, commands_rx, worker_logger,
                );
            })
            .with_context(|_| ErrorKind::SpawnThread("session manager"))?;

        Ok(SessionManager {
            client,
            logger,
            observers,
            worker: Mutex::new(Some(thread)),
            commands: Some(commands_tx),
        })
    }

    /// Register a session observer; returns its index for later removal.
    pub fn add_session_observer<F>(&self, observer: F) -> usize
        where F: Fn(SessionState) + Send + Sync + 'static
    {
        let mut observers = self.observers.lock().expect("observers lock was poisoned");
        observers.push(Arc::new(observer));
        observers.len() - 1
    }

    /// Remove a previously registered observer by index.
    pub fn remove_session_observer(&self, index: usize) {
        let mut observers = self.observers.lock().expect("observers lock was poisoned");
        if index < observers.len() {
            observers.remove(index);
        }
    }

    /// Current connection state, as last observed by the underlying client.
    pub fn state(&self) -> SessionState {
        self.client.session_state()
    }

    /// Identifier of the current session: bumped every time a brand new
    /// zookeeper session is established. Two calls returning different values
    /// have seen the client go through an intervening expiry and reconnect.
    /// The underlying `zookeeper` crate does not expose the server-assigned
    /// session id/password, so this generation counter stands in for it.
    pub fn session(&self) -> u64 {
        self.client.session_generation()
    }

    /// Configured session timeout.
    pub fn session_timeout(&self) -> Duration {
        self.client.session_timeout()
    }

    /// Access to the underlying client, for the facade and watchers to issue operations.
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }

    /// Request the worker to stop. Does not block; the worker is joined on drop.
    pub fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Stop);
        }
    }

    fn worker_loop(
        scope: &ThreadScope,
        client: Arc<Client>,
        observers: Arc<Mutex<Vec<SessionObserver>>>,
        commands: Receiver<Command>,
        logger: Logger,
    ) {
        let mut last_state = client.session_state();
        SessionManager::dispatch(&observers, last_state, &logger);
        loop {
            let _activity = scope.scoped_activity("polling zookeeper session state");
            match commands.recv_timeout(Duration::from_millis(200)) {
                Ok(Command::Stop) => break,
                Err(_) => {
                    let state = client.session_state();
                    if state != last_state {
                        if state == SessionState::Expired {
                            ZOO_SESSION_EXPIRED_COUNT.inc();
                        }
                        last_state = state;
                        SessionManager::dispatch(&observers, state, &logger);
                    }
                }
            }
        }
        debug!(logger, "Session manager worker stopping");
    }

    /// Invoke every registered observer, in order. The observer list is copied
    /// out and the lock dropped before any observer runs, so a re-entrant
    /// `add_session_observer`/`remove_session_observer` from inside a callback
    /// does not deadlock. Each observer is called behind `catch_unwind`: a
    /// panic is logged and does not stop the remaining observers or poison
    /// the lock.
    fn dispatch(observers: &Arc<Mutex<Vec<SessionObserver>>>, state: SessionState, logger: &Logger) {
        let observers: Vec<SessionObserver> = {
            let guard = observers.lock().expect("observers lock was poisoned");
            guard.clone()
        };
        for observer in observers.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| observer(state)));
            if let Err(panic) = result {
                error!(
                    logger, "Session observer panicked, ignoring";
                    "state" => ?state, "panic" => %panic_message(&panic)
                );
            }
        }
        debug!(logger, "Dispatched session state to observers"; "state" => ?state);
    }
}

/// Best-effort extraction of a human-readable message from a caught panic payload.
fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Stop);
        }
        let worker = self.worker.lock().expect("worker lock was poisoned").take();
        if let Some(worker) = worker {
            if let Err(error) = worker.join() {
                error!(self.logger, "Session manager worker thread panicked"; "error" => ?error);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use slog::Discard;
    use slog::Logger;

    use super::SessionManager;
    use super::SessionObserver;
    use super::super::event::SessionState;

    fn discard_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[test]
    fn observers_are_dispatched_in_registration_order() {
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut observers: Vec<SessionObserver> = Vec::new();
        for name in ["first", "second", "third"].iter() {
            let seen = Arc::clone(&seen);
            let name = *name;
            observers.push(Arc::new(move |_state: SessionState| {
                seen.lock().unwrap().push(name);
            }));
        }
        for observer in &observers {
            observer(SessionState::Connected);
        }
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn dispatch_survives_a_panicking_observer() {
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let observers: Arc<Mutex<Vec<SessionObserver>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let mut guard = observers.lock().unwrap();
            let before = Arc::clone(&seen);
            guard.push(Arc::new(move |_state: SessionState| {
                before.lock().unwrap().push("before");
            }));
            guard.push(Arc::new(|_state: SessionState| {
                panic!("observer exploded");
            }));
            let after = Arc::clone(&seen);
            guard.push(Arc::new(move |_state: SessionState| {
                after.lock().unwrap().push("after");
            }));
        }
        let logger = discard_logger();
        SessionManager::dispatch(&observers, SessionState::Connected, &logger);
        assert_eq!(*seen.lock().unwrap(), vec!["before", "after"]);
        // The lock must not be poisoned: a further lock attempt succeeds.
        assert_eq!(observers.lock().unwrap().len(), 3);
    }
}
