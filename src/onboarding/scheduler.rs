//! Cancellable delayed continuations for stage completion.
//!
//! At most one continuation is outstanding. Scheduling a new one aborts the
//! previous task, and `cancel` aborts it outright. Cancellation is backed up
//! by the epoch carried in each `StageTicket`: a continuation that already
//! got past its sleep when it was aborted still gets rejected by the board.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::state::StageTicket;

struct Pending {
    ticket: StageTicket,
    handle: JoinHandle<()>,
}

pub struct StageTimer {
    delay: Duration,
    pending: Option<Pending>,
}

impl StageTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Ticket of the outstanding continuation, if any.
    pub fn pending(&self) -> Option<StageTicket> {
        self.pending.as_ref().map(|p| p.ticket)
    }

    /// Run `on_fire(ticket)` after the configured delay.
    pub fn schedule<F, Fut>(&mut self, ticket: StageTicket, on_fire: F)
    where
        F: FnOnce(StageTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket).await;
        });
        debug!(
            epoch = ticket.epoch,
            stage_index = ticket.index,
            ?delay,
            "Stage continuation scheduled"
        );
        self.pending = Some(Pending { ticket, handle });
    }

    /// Called from inside a firing continuation. Forgets the task without
    /// aborting it, so the caller can keep running and schedule the next one.
    pub fn release(&mut self, ticket: StageTicket) {
        if self.pending() == Some(ticket) {
            self.pending = None;
        }
    }

    /// Abort the outstanding continuation. Returns its ticket.
    pub fn cancel(&mut self) -> Option<StageTicket> {
        let pending = self.pending.take()?;
        pending.handle.abort();
        debug!(
            epoch = pending.ticket.epoch,
            stage_index = pending.ticket.index,
            "Stage continuation cancelled"
        );
        Some(pending.ticket)
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ticket(epoch: u64, index: usize) -> StageTicket {
        StageTicket { epoch, index }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = StageTimer::new(Duration::from_secs(3));

        let counter = Arc::clone(&fired);
        timer.schedule(ticket(0, 0), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(timer.pending(), Some(ticket(0, 0)));

        tokio::time::sleep(Duration::from_millis(2_999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = StageTimer::new(Duration::from_secs(3));

        let counter = Arc::clone(&fired);
        timer.schedule(ticket(0, 0), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.cancel(), Some(ticket(0, 0)));
        assert!(timer.pending().is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.cancel().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_continuation() {
        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut timer = StageTimer::new(Duration::from_secs(3));

        for t in [ticket(0, 0), ticket(1, 0)] {
            let log = Arc::clone(&fired);
            timer.schedule(t, move |t| async move {
                log.lock().unwrap().push(t);
            });
        }

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(*fired.lock().unwrap(), vec![ticket(1, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn release_only_matches_its_own_ticket() {
        let mut timer = StageTimer::new(Duration::from_secs(3));
        timer.schedule(ticket(2, 1), |_| async {});

        timer.release(ticket(2, 0));
        assert_eq!(timer.pending(), Some(ticket(2, 1)));

        timer.release(ticket(2, 1));
        assert!(timer.pending().is_none());
    }
}
