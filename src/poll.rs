//! Fixed-interval polling, the crate's stand-in for host-page timers: dialog
//! auto-resize and the teardown work-drain gate both retry on a fixed period
//! until their condition settles or the poller is cancelled.

use std::time::Duration;

use tokio::sync::mpsc;

/// Outcome of one poll step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Done,
}

/// Cancels its poller when signalled or dropped.
pub struct PollHandle {
    cancel_tx: mpsc::UnboundedSender<()>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }
}

/// Run `step` once per `period` until it reports [`PollStep::Done`] or the
/// handle cancels it. The first step runs after one full period.
pub fn spawn_poller(period: Duration, mut step: impl FnMut() -> PollStep + 'static) -> PollHandle {
    let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();
    tokio::task::spawn_local(async move {
        let mut ticker = tokio::time::interval(period);
        // interval's first tick is immediate; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if step() == PollStep::Done {
                        break;
                    }
                }
                _ = cancel_rx.recv() => break,
            }
        }
    });
    PollHandle { cancel_tx }
}

/// Resolve once `condition` holds, checking immediately and then once per
/// `period`. Completes without suspending when the condition already holds.
pub async fn wait_until(period: Duration, mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(period).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn wait_until_is_immediate_when_condition_holds() {
        let started = tokio::time::Instant::now();
        wait_until(Duration::from_millis(10), || true).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poller_stops_on_done() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let steps = Rc::new(Cell::new(0u32));
                let counted = Rc::clone(&steps);
                spawn_poller(Duration::from_millis(10), move || {
                    counted.set(counted.get() + 1);
                    if counted.get() == 3 {
                        PollStep::Done
                    } else {
                        PollStep::Continue
                    }
                });
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(steps.get(), 3);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poller_stops_on_cancel() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let steps = Rc::new(Cell::new(0u32));
                let counted = Rc::clone(&steps);
                let handle = spawn_poller(Duration::from_millis(10), move || {
                    counted.set(counted.get() + 1);
                    PollStep::Continue
                });
                tokio::time::sleep(Duration::from_millis(35)).await;
                handle.cancel();
                let after_cancel = steps.get();
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(steps.get(), after_cancel);
            })
            .await;
    }
}
