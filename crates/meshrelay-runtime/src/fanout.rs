//! Best-effort delivery of one frame to every subscriber.

use meshrelay_types::OutboundFrame;
use tracing::{debug, error};

use crate::registry::SubscriberRegistry;

/// Outcome of one [`broadcast`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// Sinks that accepted the frame.
    pub delivered: usize,
    /// Sinks that failed and were removed.
    pub pruned: usize,
}

/// Send `frame` to every registered subscriber.
///
/// A subscriber whose send fails is removed once the pass completes; its
/// failure never affects the others and is never surfaced to the caller.
pub async fn broadcast(registry: &mut SubscriberRegistry, frame: &OutboundFrame) -> FanoutReport {
    let payload = match frame.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "failed to encode outbound frame");
            return FanoutReport::default();
        }
    };

    let mut delivered = 0;
    let mut failed = Vec::new();
    for (id, sink) in registry.iter() {
        match sink.send(&payload).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                debug!(subscriber = %id, error = %e, "send failed; pruning subscriber");
                failed.push(*id);
            }
        }
    }

    let pruned = registry.remove_all(&failed);
    FanoutReport { delivered, pruned }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChannelSink, SubscriberId, SubscriberSink};
    use async_trait::async_trait;
    use meshrelay_types::{MergedEvent, NodeId, PartialFields, RelayError};

    struct RefusingSink;

    #[async_trait]
    impl SubscriberSink for RefusingSink {
        async fn send(&self, _frame: &str) -> Result<(), RelayError> {
            Err(RelayError::SubscriberClosed("refused".to_string()))
        }
    }

    fn merged() -> OutboundFrame {
        OutboundFrame::MergedEvent(MergedEvent::new(
            NodeId(7),
            PartialFields {
                battery: Some(55),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn every_live_subscriber_receives_the_frame() {
        let mut registry = SubscriberRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (sink, rx) = ChannelSink::pair();
            registry.register(SubscriberId::new(), Box::new(sink));
            receivers.push(rx);
        }

        let report = broadcast(&mut registry, &merged()).await;
        assert_eq!(report, FanoutReport { delivered: 3, pruned: 0 });
        for rx in &mut receivers {
            let text = rx.recv().await.unwrap();
            assert!(text.contains(r#""type":"merged_event""#));
            assert!(text.contains(r#""battery":55"#));
        }
    }

    #[tokio::test]
    async fn failing_subscriber_is_pruned_without_affecting_others() {
        let mut registry = SubscriberRegistry::new();
        let (a, mut rx_a) = ChannelSink::pair();
        let (c, mut rx_c) = ChannelSink::pair();
        registry.register(SubscriberId::new(), Box::new(a));
        registry.register(SubscriberId::new(), Box::new(RefusingSink));
        registry.register(SubscriberId::new(), Box::new(c));

        let report = broadcast(&mut registry, &merged()).await;
        assert_eq!(report, FanoutReport { delivered: 2, pruned: 1 });
        assert_eq!(registry.len(), 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_c.recv().await.is_some());
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_is_a_noop() {
        let mut registry = SubscriberRegistry::new();
        let report = broadcast(&mut registry, &OutboundFrame::Ping).await;
        assert_eq!(report, FanoutReport::default());
    }
}
