use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Condition holding the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Free space on the job directory is below the configured minimum
    DiskSpace,
    /// The record writer backlog is too large
    WriterBacklog,
}

impl PauseReason {
    fn bit(self) -> u8 {
        match self {
            Self::DiskSpace => 1,
            Self::WriterBacklog => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiskSpace => "disk_space",
            Self::WriterBacklog => "writer_backlog",
        }
    }
}

/// Cooperative crawl-level pause
///
/// Workers call [`PauseGate::wait_unpaused`] between items. The crawl stays
/// paused while any reason is set.
#[derive(Debug)]
pub struct PauseGate {
    reasons: watch::Sender<u8>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (reasons, _) = watch::channel(0);
        Self { reasons }
    }

    /// Sets a reason; returns true if it was not already set
    pub fn pause(&self, reason: PauseReason) -> bool {
        let changed = self.reasons.send_if_modified(|bits| {
            let before = *bits;
            *bits |= reason.bit();
            *bits != before
        });
        if changed {
            warn!(reason = reason.as_str(), "Crawl paused");
        }
        changed
    }

    /// Clears a reason; returns true if it was set
    pub fn resume(&self, reason: PauseReason) -> bool {
        let changed = self.reasons.send_if_modified(|bits| {
            let before = *bits;
            *bits &= !reason.bit();
            *bits != before
        });
        if changed {
            info!(reason = reason.as_str(), "Crawl pause lifted");
        }
        changed
    }

    pub fn is_paused(&self) -> bool {
        *self.reasons.borrow() != 0
    }

    pub fn is_paused_for(&self, reason: PauseReason) -> bool {
        *self.reasons.borrow() & reason.bit() != 0
    }

    /// Waits until no reason is set
    ///
    /// Returns false if `cancel` fires first.
    pub async fn wait_unpaused(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.reasons.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = rx.wait_for(|bits| *bits == 0) => result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_reasons_combine() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused());

        assert!(gate.pause(PauseReason::DiskSpace));
        assert!(!gate.pause(PauseReason::DiskSpace));
        assert!(gate.pause(PauseReason::WriterBacklog));

        assert!(gate.resume(PauseReason::DiskSpace));
        assert!(gate.is_paused());
        assert!(gate.is_paused_for(PauseReason::WriterBacklog));

        assert!(gate.resume(PauseReason::WriterBacklog));
        assert!(!gate.is_paused());
        assert!(!gate.resume(PauseReason::WriterBacklog));
    }

    #[tokio::test]
    async fn test_wait_until_resumed() {
        let gate = Arc::new(PauseGate::new());
        gate.pause(PauseReason::DiskSpace);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_unpaused(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume(PauseReason::DiskSpace);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let gate = PauseGate::new();
        gate.pause(PauseReason::WriterBacklog);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!gate.wait_unpaused(&cancel).await);
    }
}
