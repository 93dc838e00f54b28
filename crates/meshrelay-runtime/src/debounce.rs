//! [`DebounceScheduler`] – cancel-and-reschedule flush timers.
//!
//! Every update re-arms the node's one-shot timer.  A timer is a spawned task
//! that sleeps for the debounce window and then posts a [`FlushSignal`] back
//! into the relay; it never touches relay state itself.
//!
//! Cancellation aborts the sleeping task.  A task that already posted its
//! signal cannot be recalled, so each signal carries the generation of the
//! timer that produced it and the relay ignores signals whose generation no
//! longer matches the entry.

use std::time::Duration;

use meshrelay_types::NodeId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::buffer::NodeBufferEntry;

// ─────────────────────────────────────────────────────────────────────────────
// Timer handles
// ─────────────────────────────────────────────────────────────────────────────

/// Posted by an expired timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSignal {
    /// Node whose window expired.
    pub node: NodeId,
    /// Generation of the timer that fired.
    pub generation: u64,
}

/// A pending timer.  Dropping the handle cancels it.
#[derive(Debug)]
pub struct FlushHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Generation stamped into this timer's [`FlushSignal`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the timer.  No-op if it has already fired.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DebounceScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Arms one flush timer per node and numbers them with a strictly
/// increasing generation.
pub struct DebounceScheduler {
    delay: Duration,
    signals: mpsc::UnboundedSender<FlushSignal>,
    next_generation: u64,
}

impl DebounceScheduler {
    /// Create a scheduler with a fixed quiescence `delay`.  Expired timers
    /// post to the returned receiver.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<FlushSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                signals,
                next_generation: 0,
            },
            rx,
        )
    }

    /// Quiet period every timer waits for.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel `entry`'s pending timer, if any, and arm a fresh one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reschedule_flush(&mut self, entry: &mut NodeBufferEntry) {
        if let Some(previous) = entry.pending.take() {
            previous.cancel();
        }

        self.next_generation += 1;
        let signal = FlushSignal {
            node: entry.node(),
            generation: self.next_generation,
        };
        let signals = self.signals.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The relay is gone when this fails; nothing left to flush.
            let _ = signals.send(signal);
        });

        entry.pending = Some(FlushHandle {
            generation: signal.generation,
            task,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferStore;
    use meshrelay_types::PartialFields;
    use tokio::time::timeout;

    const WINDOW: Duration = Duration::from_millis(40);

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let (mut scheduler, mut rx) = DebounceScheduler::new(WINDOW);
        let mut store = BufferStore::new();
        let entry = store.merge_update(NodeId(5), PartialFields::default());
        scheduler.reschedule_flush(entry);
        let armed = entry.pending_generation().unwrap();

        let started = tokio::time::Instant::now();
        let signal = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer must fire")
            .expect("channel open");
        assert!(started.elapsed() >= WINDOW);
        assert_eq!(signal.node, NodeId(5));
        assert_eq!(signal.generation, armed);
    }

    #[tokio::test]
    async fn rescheduling_cancels_previous_timer() {
        let (mut scheduler, mut rx) = DebounceScheduler::new(WINDOW);
        let mut store = BufferStore::new();

        scheduler.reschedule_flush(store.merge_update(NodeId(5), PartialFields::default()));
        let first = store.get(NodeId(5)).unwrap().pending_generation().unwrap();
        tokio::time::sleep(WINDOW / 2).await;
        scheduler.reschedule_flush(store.merge_update(NodeId(5), PartialFields::default()));
        let second = store.get(NodeId(5)).unwrap().pending_generation().unwrap();
        assert!(second > first);

        let signal = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(signal.generation, second);

        tokio::time::sleep(WINDOW * 2).await;
        assert!(rx.try_recv().is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn nodes_have_independent_timers() {
        let (mut scheduler, mut rx) = DebounceScheduler::new(WINDOW);
        let mut store = BufferStore::new();
        scheduler.reschedule_flush(store.merge_update(NodeId(1), PartialFields::default()));
        scheduler.reschedule_flush(store.merge_update(NodeId(2), PartialFields::default()));

        let mut fired = Vec::new();
        for _ in 0..2 {
            let signal = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            fired.push(signal.node);
        }
        fired.sort();
        assert_eq!(fired, vec![NodeId(1), NodeId(2)]);
    }

    #[tokio::test]
    async fn dropping_entry_cancels_its_timer() {
        let (mut scheduler, mut rx) = DebounceScheduler::new(WINDOW);
        let mut store = BufferStore::new();
        scheduler.reschedule_flush(store.merge_update(NodeId(8), PartialFields::default()));
        assert_eq!(store.clear(), 1);

        tokio::time::sleep(WINDOW * 2).await;
        assert!(rx.try_recv().is_err());
    }
}
