//! Rendezvous between asynchronously delivered notifications and waiting callers.
//!
//! A caller [registers](Correlator::register) a reply slot and later awaits its
//! [`Waiter`]. Whoever observes the event (a pong, a close) hands it over with
//! [`Correlator::notify_first_active`] or [`Correlator::notify_all_active`]
//! without ever blocking: slots whose caller already gave up are discarded
//! during the scan.
//!
//! The queue is bounded. Each slot holds a semaphore permit for as long as it
//! sits in the queue, so registering beyond capacity waits for a delivery, a
//! discard, or the caller's own cancellation.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio_util::sync::CancellationToken;

struct Slot<T> {
    reply: oneshot::Sender<T>,
    _permit: OwnedSemaphorePermit,
}

/// Bounded FIFO of single-use reply slots.
pub struct Correlator<T> {
    slots: Mutex<VecDeque<Slot<T>>>,
    capacity: Arc<Semaphore>,
}

/// Receiving end of a registered slot.
///
/// Dropping it abandons the slot; the next scan or prune discards it.
#[must_use = "dropping a waiter abandons its slot"]
pub struct Waiter<T> {
    reply: oneshot::Receiver<T>,
}

impl<T> Waiter<T> {
    /// Wait for the notification. `None` if the slot was discarded unanswered.
    pub async fn recv(self) -> Option<T> {
        self.reply.await.ok()
    }

    /// Take the notification if it has already been delivered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.reply.try_recv().ok()
    }
}

impl<T> Correlator<T> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity.get())),
            capacity: Arc::new(Semaphore::new(capacity.get())),
        }
    }

    /// Enqueue a reply slot.
    ///
    /// Waits while the queue is full. Returns `None` if `token` is cancelled
    /// first, in which case nothing was enqueued.
    pub async fn register(&self, token: &CancellationToken) -> Option<Waiter<T>> {
        if token.is_cancelled() {
            return None;
        }

        let permit = if let Ok(permit) = Arc::clone(&self.capacity).try_acquire_owned() {
            permit
        } else {
            // Slots abandoned by cancelled callers still hold permits
            self.prune();
            tokio::select! {
                biased;
                () = token.cancelled() => return None,
                permit = Arc::clone(&self.capacity).acquire_owned() => permit.ok()?,
            }
        };

        let (reply, receiver) = oneshot::channel();
        self.lock().push_back(Slot {
            reply,
            _permit: permit,
        });

        Some(Waiter { reply: receiver })
    }

    /// Deliver `notification` to the oldest slot whose caller is still waiting.
    ///
    /// Abandoned slots met on the way are discarded. Returns `false` when no
    /// waiting caller was found.
    pub fn notify_first_active(&self, notification: T) -> bool {
        let mut slots = self.lock();
        let mut notification = notification;

        while let Some(slot) = slots.pop_front() {
            match slot.reply.send(notification) {
                Ok(()) => return true,
                Err(returned) => notification = returned,
            }
        }

        false
    }

    /// Remove slots whose caller gave up. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|slot| !slot.reply.is_closed());
        before - slots.len()
    }

    /// Number of queued slots, abandoned ones included.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Correlator<T> {
    /// Deliver a copy of `notification` to every slot whose caller is still
    /// waiting, emptying the queue. Returns the number of callers reached.
    pub fn notify_all_active(&self, notification: &T) -> usize {
        let drained: Vec<_> = self.lock().drain(..).collect();

        drained
            .into_iter()
            .map(|slot| slot.reply.send(notification.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_millis(100);

    fn correlator(capacity: usize) -> Correlator<u32> {
        Correlator::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[tokio::test]
    async fn first_active_reaches_exactly_one_waiter() {
        let correlator = correlator(4);
        let token = CancellationToken::new();

        let first = correlator.register(&token).await.unwrap();
        let second = correlator.register(&token).await.unwrap();

        assert!(correlator.notify_first_active(7));
        assert_eq!(first.recv().await, Some(7));
        assert_eq!(correlator.pending(), 1);

        let still_waiting = timeout(WAIT, second.recv()).await;
        assert!(still_waiting.is_err(), "second waiter must not be notified");
    }

    #[tokio::test]
    async fn first_active_skips_abandoned_slots() {
        let correlator = correlator(4);
        let token = CancellationToken::new();

        let abandoned = correlator.register(&token).await.unwrap();
        let live = correlator.register(&token).await.unwrap();
        drop(abandoned);

        assert!(correlator.notify_first_active(1));
        assert_eq!(live.recv().await, Some(1));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn first_active_without_waiters_reports_false() {
        let correlator = correlator(2);
        let token = CancellationToken::new();

        drop(correlator.register(&token).await.unwrap());

        assert!(!correlator.notify_first_active(1));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn all_active_reaches_every_waiter() {
        let correlator = correlator(4);
        let token = CancellationToken::new();

        let waiters = [
            correlator.register(&token).await.unwrap(),
            correlator.register(&token).await.unwrap(),
            correlator.register(&token).await.unwrap(),
        ];
        drop(correlator.register(&token).await.unwrap());

        assert_eq!(correlator.notify_all_active(&9), 3);
        assert_eq!(correlator.pending(), 0);
        for waiter in waiters {
            assert_eq!(waiter.recv().await, Some(9));
        }
    }

    #[tokio::test]
    async fn register_blocks_at_capacity_until_delivery() {
        let correlator = Arc::new(correlator(2));
        let token = CancellationToken::new();

        let first = correlator.register(&token).await.unwrap();
        let _second = correlator.register(&token).await.unwrap();

        let blocked = timeout(WAIT, correlator.register(&token)).await;
        assert!(blocked.is_err(), "third registration must wait for room");

        let pending = {
            let correlator = Arc::clone(&correlator);
            let token = token.clone();
            tokio::spawn(async move { correlator.register(&token).await.is_some() })
        };
        assert!(correlator.notify_first_active(3));
        assert_eq!(first.recv().await, Some(3));

        let registered = timeout(WAIT, pending).await.unwrap().unwrap();
        assert!(registered);
        assert_eq!(correlator.pending(), 2);
    }

    #[tokio::test]
    async fn register_reclaims_abandoned_slots_when_full() {
        let correlator = correlator(1);
        let token = CancellationToken::new();

        drop(correlator.register(&token).await.unwrap());

        let waiter = timeout(WAIT, correlator.register(&token)).await.unwrap();
        assert!(waiter.is_some());
        assert_eq!(correlator.pending(), 1);
    }

    #[tokio::test]
    async fn register_gives_up_on_cancellation() {
        let correlator = correlator(1);
        let token = CancellationToken::new();

        let _held = correlator.register(&token).await.unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let outcome = timeout(Duration::from_secs(1), correlator.register(&token))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(correlator.pending(), 1);
    }

    #[tokio::test]
    async fn register_with_cancelled_token_enqueues_nothing() {
        let correlator = correlator(1);
        let token = CancellationToken::new();
        token.cancel();

        assert!(correlator.register(&token).await.is_none());
        assert_eq!(correlator.pending(), 0);
    }
}
