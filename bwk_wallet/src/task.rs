//! # Task handles
//!
//! Work submitted to a background worker returns a [`TaskHandle`], which can be waited on
//! (blocking), polled, or observed with listeners dispatched on an [`Executor`] chosen by the
//! caller. The worker side publishes the outcome through the paired [`Completer`].
//!
//! Cancellation is best-effort: the worker stops awaiting the operation at its next suspension
//! point, an HTTP request already sent is not recalled. Once a handle is cancelled no listener
//! registered on it is ever called.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Error;

/// Runs listener callbacks
pub trait Executor: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}

/// Runs the callback on the thread completing the task
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        job()
    }
}

impl Executor for tokio::runtime::Handle {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        self.spawn(async move { job() });
    }
}

type Callback<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;

struct Listener<T> {
    executor: Arc<dyn Executor>,
    callback: Callback<T>,
}

impl<T: Send + 'static> Listener<T> {
    fn dispatch(self, result: Result<T, Error>) {
        let callback = self.callback;
        self.executor.execute(Box::new(move || callback(result)));
    }
}

enum State<T> {
    Pending(Vec<Listener<T>>),
    Done(Result<T, Error>),
    Cancelled,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
    cancel: watch::Sender<bool>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // listeners run outside the lock, a poisoned state is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a connected completer and handle
pub fn channel<T: Clone + Send + 'static>() -> (Completer<T>, TaskHandle<T>) {
    let (cancel, cancel_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending(vec![])),
        cond: Condvar::new(),
        cancel,
    });
    let completer = Completer {
        shared: shared.clone(),
        cancel_rx,
        completed: false,
    };
    (completer, TaskHandle { shared })
}

/// The caller side of a submitted task
pub struct TaskHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// A handle already completed with `result`
    pub fn ready(result: Result<T, Error>) -> Self {
        let (completer, handle) = channel();
        completer.complete(result);
        handle
    }

    /// Block the current thread until the task completes or is cancelled.
    ///
    /// Must not be called from within an async context.
    pub fn wait(&self) -> Result<T, Error> {
        let mut state = self.shared.lock();
        loop {
            if let Some(result) = outcome(&state) {
                return result;
            }
            state = self
                .shared
                .cond
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`TaskHandle::wait()`] but gives up after `timeout`, returning `None`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, Error>> {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .cond
            .wait_timeout_while(state, timeout, |s| matches!(s, State::Pending(_)))
            .unwrap_or_else(|e| e.into_inner());
        outcome(&state)
    }

    /// The outcome if the task already finished, without blocking
    pub fn try_result(&self) -> Option<Result<T, Error>> {
        outcome(&self.shared.lock())
    }

    /// True once the task completed or was cancelled
    pub fn is_done(&self) -> bool {
        !matches!(*self.shared.lock(), State::Pending(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.shared.lock(), State::Cancelled)
    }

    /// Request cancellation, returns false if the task already finished.
    pub fn cancel(&self) -> bool {
        let listeners = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Cancelled;
                    listeners
                }
                _ => return false,
            }
        };
        log::debug!("task cancelled, dropping {} listeners", listeners.len());
        self.shared.cond.notify_all();
        self.shared.cancel.send_replace(true);
        true
    }

    /// Call `callback` on `executor` with the outcome of the task.
    ///
    /// If the task is already complete the callback is dispatched immediately. It is never called
    /// for a cancelled task.
    pub fn on_complete<F>(&self, executor: Arc<dyn Executor>, callback: F)
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        let listener = Listener {
            executor,
            callback: Box::new(callback),
        };
        let result = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(listener);
                    return;
                }
                State::Done(result) => result.clone(),
                State::Cancelled => return,
            }
        };
        listener.dispatch(result);
    }
}

fn outcome<T: Clone>(state: &State<T>) -> Option<Result<T, Error>> {
    match state {
        State::Done(result) => Some(result.clone()),
        State::Cancelled => Some(Err(Error::Cancelled)),
        State::Pending(_) => None,
    }
}

/// The worker side of a submitted task
pub struct Completer<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
    cancel_rx: watch::Receiver<bool>,
    completed: bool,
}

impl<T: Clone + Send + 'static> Completer<T> {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the handle has been cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        // the sender lives in the shared state we hold, so this cannot fail
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Publish the outcome, ignored if the handle was cancelled
    pub fn complete(mut self, result: Result<T, Error>) {
        self.completed = true;
        self.publish(result);
    }

    fn publish(&self, result: Result<T, Error>) {
        let listeners = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Done(result.clone());
                    listeners
                }
                State::Done(_) | State::Cancelled => return,
            }
        };
        self.shared.cond.notify_all();
        for listener in listeners {
            listener.dispatch(result.clone());
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Completer<T> {
    fn drop(&mut self) {
        if !self.completed {
            self.publish(Err(Error::WorkerStopped));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{channel, Inline, TaskHandle};
    use crate::error::Error;

    #[test]
    fn test_wait_and_poll() {
        let (completer, handle) = channel::<u32>();
        assert!(handle.try_result().is_none());
        assert!(!handle.is_done());
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        let waiter = handle.clone();
        let thread = std::thread::spawn(move || waiter.wait());
        completer.complete(Ok(7));

        assert_eq!(thread.join().unwrap().unwrap(), 7);
        assert_eq!(handle.try_result().unwrap().unwrap(), 7);
        assert!(handle.is_done());
    }

    #[test]
    fn test_listeners_before_and_after_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (completer, handle) = channel::<u32>();

        let c = calls.clone();
        handle.on_complete(Arc::new(Inline), move |r| {
            assert_eq!(r.unwrap(), 3);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        completer.complete(Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = calls.clone();
        handle.on_complete(Arc::new(Inline), move |r| {
            assert_eq!(r.unwrap(), 3);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_suppresses_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (completer, handle) = channel::<u32>();
        let c = calls.clone();
        handle.on_complete(Arc::new(Inline), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.cancel());
        assert!(completer.is_cancelled());
        completer.complete(Ok(1));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(handle.wait(), Err(Error::Cancelled)));
        assert!(handle.is_cancelled());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let handle = TaskHandle::ready(Ok(5u32));
        assert!(!handle.cancel());
        assert_eq!(handle.wait().unwrap(), 5);
    }

    #[test]
    fn test_dropped_completer_reports_worker_stopped() {
        let (completer, handle) = channel::<u32>();
        drop(completer);
        assert!(matches!(handle.wait(), Err(Error::WorkerStopped)));
    }

    #[tokio::test]
    async fn test_tokio_executor() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = TaskHandle::ready(Ok(9u32));
        handle.on_complete(Arc::new(tokio::runtime::Handle::current()), move |r| {
            tx.send(r.unwrap()).unwrap();
        });
        let value = tokio::time::timeout(Duration::from_secs(1), rx).await;
        assert_eq!(value.unwrap().unwrap(), 9);
    }
}
