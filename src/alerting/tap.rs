//! Collapses a burst of rapid taps into one gesture.
//!
//! Each tap restarts a single quiet-period timer. When the timer elapses
//! the burst is emitted once on the gesture channel and the count resets.
//! A generation counter turns a superseded timer into a no-op even if it
//! woke up before it could be aborted.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Gesture;

#[derive(Default)]
struct Burst {
    count: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Accumulates on-screen taps. Must be used inside a tokio runtime.
pub struct TapAccumulator {
    quiet_period: Duration,
    burst: Arc<Mutex<Burst>>,
    gestures: mpsc::UnboundedSender<Gesture>,
}

impl TapAccumulator {
    pub fn new(quiet_period: Duration, gestures: mpsc::UnboundedSender<Gesture>) -> Self {
        Self {
            quiet_period,
            burst: Arc::new(Mutex::new(Burst::default())),
            gestures,
        }
    }

    /// Count a tap and restart the quiet timer.
    pub fn register_tap(&self) {
        let mut burst = lock(&self.burst);
        burst.count += 1;
        burst.generation += 1;
        if let Some(timer) = burst.timer.take() {
            timer.abort();
        }

        let generation = burst.generation;
        let shared = Arc::clone(&self.burst);
        let gestures = self.gestures.clone();
        let quiet_period = self.quiet_period;

        burst.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;

            let taps = {
                let mut burst = lock(&shared);
                if burst.generation != generation {
                    return;
                }
                burst.timer = None;
                std::mem::take(&mut burst.count)
            };

            debug!(taps, "Tap burst complete");
            // A closed channel means the session is gone; nothing to classify.
            let _ = gestures.send(Gesture {
                taps,
                from_device: false,
            });
        }));
    }

    /// Taps counted in the current, not yet classified burst.
    pub fn pending_taps(&self) -> u32 {
        lock(&self.burst).count
    }

    /// Drop the current burst without classifying it.
    pub fn cancel(&self) {
        let mut burst = lock(&self.burst);
        burst.generation += 1;
        burst.count = 0;
        if let Some(timer) = burst.timer.take() {
            timer.abort();
            debug!("Pending tap burst cancelled");
        }
    }
}

impl Drop for TapAccumulator {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(burst: &Mutex<Burst>) -> MutexGuard<'_, Burst> {
    // The guarded data stays consistent even if a holder panicked.
    burst.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const QUIET: Duration = Duration::from_millis(800);

    #[tokio::test(start_paused = true)]
    async fn test_burst_classifies_once_with_total_count() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let taps = TapAccumulator::new(QUIET, tx);

        for _ in 0..3 {
            taps.register_tap();
            sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(taps.pending_taps(), 3);

        let gesture = rx.recv().await.unwrap();
        assert_eq!(gesture.taps, 3);
        assert!(!gesture.from_device);
        assert_eq!(taps.pending_taps(), 0);

        // Nothing else fires for the same burst.
        assert!(timeout(Duration::from_secs(5), rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_bursts_classify_independently() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let taps = TapAccumulator::new(QUIET, tx);

        taps.register_tap();
        taps.register_tap();
        sleep(Duration::from_millis(1500)).await;
        taps.register_tap();

        assert_eq!(rx.recv().await.unwrap().taps, 2);
        assert_eq!(rx.recv().await.unwrap().taps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_classification() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let taps = TapAccumulator::new(QUIET, tx);

        taps.register_tap();
        taps.register_tap();
        taps.cancel();

        assert!(timeout(Duration::from_secs(5), rx.recv()).await.is_err());
        assert_eq!(taps.pending_taps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let taps = TapAccumulator::new(QUIET, tx);

        taps.register_tap();
        drop(taps);

        // The sender lives in the aborted timer task too; once it is gone the
        // channel closes without ever delivering a gesture.
        let received = timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(!matches!(received, Ok(Some(_))));
    }
}
