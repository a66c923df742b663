use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

use slog::Logger;

use super::Error;
use super::ErrorKind;
use super::Result;


enum Outcome<T> {
    Pending,
    Done(Result<T>),
}

/// A single-assignment completion cell.
///
/// `AsyncResult` is the handle returned by every `async_*` operation in the
/// facade. It is completed exactly once, from whatever thread the underlying
/// zookeeper callback runs on, and observed by blocking on `get`/`get_timeout`
/// from the calling thread. A second attempt to complete an already-completed
/// result is a programming error: it is logged and otherwise ignored.
pub struct AsyncResult<T> {
    inner: Arc<(Mutex<Outcome<T>>, Condvar)>,
    logger: Logger,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        AsyncResult {
            inner: Arc::clone(&self.inner),
            logger: self.logger.clone(),
        }
    }
}

impl<T> AsyncResult<T> {
    pub fn new(logger: Logger) -> AsyncResult<T> {
        AsyncResult {
            inner: Arc::new((Mutex::new(Outcome::Pending), Condvar::new())),
            logger,
        }
    }

    /// Complete the result with a value. Ignored (and logged) if already complete.
    pub fn set(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Complete the result with a failure. Ignored (and logged) if already complete.
    pub fn fail(&self, error: Error) {
        self.complete(Err(error));
    }

    fn complete(&self, outcome: Result<T>) {
        let (lock, condvar) = &*self.inner;
        let mut guard = lock.lock().expect("AsyncResult mutex was poisoned");
        if let Outcome::Done(_) = *guard {
            warn!(self.logger, "AsyncResult completed more than once; ignoring second completion");
            return;
        }
        *guard = Outcome::Done(outcome);
        condvar.notify_all();
    }
}

impl<T: Clone> AsyncResult<T> {
    /// Block until the result is available, or fail with `ErrorKind::Timeout` after `timeout`.
    ///
    /// May be called more than once (including from multiple clones of the
    /// same handle): the completed outcome is cloned out, not consumed.
    pub fn get(&self, timeout: Duration) -> Result<T> {
        let (lock, condvar) = &*self.inner;
        let mut guard = lock.lock().expect("AsyncResult mutex was poisoned");
        loop {
            match *guard {
                Outcome::Done(Ok(ref value)) => return Ok(value.clone()),
                Outcome::Done(Err(ref error)) => return Err(error.kind().into()),
                Outcome::Pending => {
                    let (new_guard, wait_result) = condvar
                        .wait_timeout(guard, timeout)
                        .expect("AsyncResult mutex was poisoned");
                    guard = new_guard;
                    if wait_result.timed_out() {
                        if let Outcome::Pending = *guard {
                            return Err(ErrorKind::Timeout.into());
                        }
                    }
                }
            }
        }
    }

    /// Block indefinitely until the result is available.
    pub fn wait(&self) -> Result<T> {
        self.get(Duration::from_secs(u64::max_value() / 1000))
    }
}


#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use slog::Discard;
    use slog::Logger;
    use slog::o;

    use super::AsyncResult;
    use super::super::ErrorKind;

    fn logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[test]
    fn set_then_get_returns_value() {
        let result: AsyncResult<u32> = AsyncResult::new(logger());
        result.set(42);
        let value = result.get(Duration::from_millis(100)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn fail_then_get_returns_error() {
        let result: AsyncResult<u32> = AsyncResult::new(logger());
        result.fail(ErrorKind::Closing.into());
        let error = result.get(Duration::from_millis(100)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Closing);
    }

    #[test]
    fn get_times_out_when_never_completed() {
        let result: AsyncResult<u32> = AsyncResult::new(logger());
        let error = result.get(Duration::from_millis(10)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn completion_from_another_thread_is_observed() {
        let result: AsyncResult<u32> = AsyncResult::new(logger());
        let sender = result.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            sender.set(7);
        });
        let value = result.get(Duration::from_secs(1)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn second_completion_is_ignored() {
        let result: AsyncResult<u32> = AsyncResult::new(logger());
        result.set(1);
        result.set(2);
        let value = result.get(Duration::from_millis(100)).unwrap();
        assert_eq!(value, 1);
    }
}
