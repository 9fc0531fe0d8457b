use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::error;

/// Thread running a periodic task until stopped
///
/// Used for the index snapshot; the task returns `false` to stop itself.
pub struct Dumper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Dumper {
    pub fn spawn<F>(interval: Duration, mut task: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("queue-dumper".to_string())
            .spawn(move || {
                let (lock, cv) = &*thread_stop;
                loop {
                    let stopped = lock.lock().unwrap_or_else(|p| p.into_inner());
                    let (stopped, _) = cv
                        .wait_timeout_while(stopped, interval, |stopped| !*stopped)
                        .unwrap_or_else(|p| p.into_inner());
                    if *stopped {
                        return;
                    }
                    drop(stopped);

                    if !task() {
                        return;
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        {
            let (lock, cv) = &*self.stop;
            *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
            cv.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Queue dumper thread panicked");
            }
        }
    }
}

impl Drop for Dumper {
    fn drop(&mut self) {
        self.stop();
    }
}
