//! Wall-clock timers that run independently of the server tick.

use std::future::Future;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Cancels the scheduled task when asked. Dropping it does not cancel.
#[derive(Debug)]
pub struct TaskHandle(AbortHandle);

impl TaskHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    stop: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses the runtime the caller is running on.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Starts a private runtime on its own thread, so timers keep firing no
    /// matter what the host runtime is busy with.
    pub fn dedicated() -> std::io::Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        thread::Builder::new()
            .name("jinx-essentials-timers".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = handle_tx.send(Err(err));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async move {
                    let _ = stop_rx.await;
                });
                runtime.shutdown_timeout(Duration::from_secs(1));
            })?;
        let handle = handle_rx
            .recv()
            .map_err(|_| std::io::Error::other("timer thread exited early"))??;
        Ok(Self {
            handle,
            stop: Arc::new(Mutex::new(Some(stop_tx))),
        })
    }

    /// Runs `task` once `delay` has elapsed.
    pub fn after<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        })
    }

    pub fn spawn<F>(&self, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        TaskHandle(self.handle.spawn(future).abort_handle())
    }

    /// Stops a dedicated runtime. No-op for borrowed runtimes.
    pub fn stop(&self) {
        if let Some(stop) = self.stop.lock().unwrap().take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn after_fires_once_the_delay_elapses() {
        let scheduler = Scheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.after(Duration::from_secs(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_tasks_never_run() {
        let scheduler = Scheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = scheduler.after(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dedicated_runtime_runs_tasks_and_stops() {
        let scheduler = Scheduler::dedicated().unwrap();
        let (tx, rx) = mpsc::channel();
        scheduler.after(Duration::from_millis(10), move || {
            let _ = tx.send(());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        scheduler.stop();
    }
}
