//! Visibility watchers and the cancellation registry.
//!
//! Every successful pop spawns one [`Watcher`] task that races the
//! delivery's visibility timer against its cancellation signal. The
//! [`CancelRegistry`] entry is the single synchronization point between an
//! ack and an expiring watcher: whichever removes the entry first settles
//! the session, the other becomes a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::session::{Member, Session};
use crate::store::QueueStore;

/// Final word on one delivery, sent at most once on the delivery's outcome
/// channel.
///
/// When the element is acked before its timeout the watcher exits without
/// sending anything and the channel simply closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The timeout elapsed unacked and the element is visible to pops
    /// again. `attempt` is the delivery that just expired.
    Requeued { attempt: u32 },
    /// The timeout elapsed with the retry limit exhausted; the element was
    /// permanently removed.
    Dropped { attempt: u32 },
    /// The session was concluded elsewhere, typically by an ack that raced
    /// the timer, or the store failed and the watcher gave up. Nothing
    /// further happens for this delivery.
    Settled,
}

type Entries = HashMap<Session, oneshot::Sender<()>>;

/// Engine-owned map of live sessions to their cancellation signals.
///
/// Holds at most one entry per session. Entries are armed by pop before the
/// claim transaction runs, and removed by exactly one of ack or
/// watcher-expiry.
#[derive(Clone, Default)]
pub(crate) struct CancelRegistry {
    inner: Arc<Mutex<Entries>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a session and hand back the signal its watcher waits on.
    pub fn arm(&self, session: &Session) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.entries().insert(session.clone(), tx);
        rx
    }

    /// Remove a session's entry, if it is still live.
    pub fn take(&self, session: &Session) -> Option<oneshot::Sender<()>> {
        self.entries().remove(session)
    }

    #[cfg(test)]
    pub fn is_armed(&self, session: &Session) -> bool {
        self.entries().contains_key(session)
    }
}

/// One concurrent watcher per claimed delivery.
///
/// Terminal either way it resolves: a watcher never re-arms itself, and a
/// requeued element gets a fresh watcher from the pop that claims it next.
pub(crate) struct Watcher {
    pub store: Arc<dyn QueueStore>,
    pub registry: CancelRegistry,
    pub queue_key: String,
    pub element_key: String,
    pub session: Session,
    pub member: Member,
    pub score: f64,
    pub wait: Duration,
    pub retry_limit: u32,
    pub cancel: oneshot::Receiver<()>,
    pub outcome: oneshot::Sender<DeliveryOutcome>,
}

impl Watcher {
    pub async fn run(mut self) {
        tokio::select! {
            _ = &mut self.cancel => {
                debug!(session = %self.session, "Delivery acked in time");
                return;
            }
            _ = tokio::time::sleep(self.wait) => {}
        }

        // The timer fired, but the registry entry decides the race with ack.
        if self.registry.take(&self.session).is_none() {
            debug!(session = %self.session, "Ack won the settle race");
            return;
        }

        let raw = match self
            .store
            .read_session(&self.element_key, self.session.as_str())
            .await
        {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(session = %self.session, "Session already settled in the store");
                let _ = self.outcome.send(DeliveryOutcome::Settled);
                return;
            }
            Err(e) => {
                error!(session = %self.session, error = %e, "Watcher could not read the retry counter");
                let _ = self.outcome.send(DeliveryOutcome::Settled);
                return;
            }
        };

        let attempt: u32 = match raw.parse() {
            Ok(count) => count,
            Err(_) => {
                error!(session = %self.session, value = %raw, "Retry counter is not an integer");
                let _ = self.outcome.send(DeliveryOutcome::Settled);
                return;
            }
        };

        if attempt >= self.retry_limit {
            match self
                .store
                .remove_session(&self.element_key, self.session.as_str())
                .await
            {
                Ok(_) => {
                    info!(
                        element_id = %self.member.id,
                        attempt = attempt,
                        "Retry limit reached, element dropped"
                    );
                    let _ = self.outcome.send(DeliveryOutcome::Dropped { attempt });
                }
                Err(e) => {
                    error!(session = %self.session, error = %e, "Watcher could not drop the element");
                    let _ = self.outcome.send(DeliveryOutcome::Settled);
                }
            }
            return;
        }

        let member = Member::new(&self.member.id, self.member.timeout, attempt);
        match self
            .store
            .requeue(
                &self.queue_key,
                &member.encode(),
                self.score,
                &self.element_key,
                self.session.as_str(),
            )
            .await
        {
            Ok(()) => {
                info!(
                    element_id = %self.member.id,
                    attempt = attempt,
                    score = %self.score,
                    "Visibility timeout elapsed, element requeued"
                );
                let _ = self.outcome.send(DeliveryOutcome::Requeued { attempt });
            }
            Err(e) => {
                error!(session = %self.session, error = %e, "Watcher could not requeue the element");
                let _ = self.outcome.send(DeliveryOutcome::Settled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_and_take_pair_up() {
        let registry = CancelRegistry::new();
        let session = Session::mint("job-1");

        let rx = registry.arm(&session);
        assert!(registry.is_armed(&session));

        let tx = registry.take(&session).unwrap();
        assert!(!registry.is_armed(&session));
        assert!(registry.take(&session).is_none());

        tx.send(()).unwrap();
        assert!(rx.blocking_recv().is_ok());
    }

    #[test]
    fn dropping_a_taken_sender_closes_the_signal() {
        let registry = CancelRegistry::new();
        let session = Session::mint("job-1");

        let rx = registry.arm(&session);
        drop(registry.take(&session));
        assert!(rx.blocking_recv().is_err());
    }

    #[test]
    fn sessions_do_not_share_entries() {
        let registry = CancelRegistry::new();
        let first = Session::mint("job-1");
        let second = Session::mint("job-1");

        let _rx_first = registry.arm(&first);
        let _rx_second = registry.arm(&second);

        assert!(registry.take(&first).is_some());
        assert!(registry.is_armed(&second));
    }
}
