use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::iterator::EventIterator;
use crate::abi::codec::DecodedEvent;
use crate::contract::SinkPolicy;
use crate::error::{BindingError, Result};

/// Where a watch delivers its events. Decode failures are delivered in place
/// of the record that failed.
pub type EventSink = mpsc::Sender<Result<DecodedEvent>>;

/// A running push-style watch.
///
/// The watch ends when it is cancelled (cleanly), when its subscription fails,
/// or when the sink stops accepting events. The last two are reported by
/// [`wait`](Self::wait).
#[derive(Debug)]
pub struct EventWatch {
    handle: JoinHandle<Result<()>>,
    token: CancellationToken,
}

impl EventWatch {
    pub(crate) fn spawn(
        iterator: EventIterator,
        sink: EventSink,
        policy: SinkPolicy,
        token: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(forward(iterator, sink, policy, token.clone()));
        Self { handle, token }
    }

    /// Cancels the watch and waits for it to stop. No event is forwarded once
    /// this returns.
    pub async fn unsubscribe(self) -> Result<()> {
        self.token.cancel();
        self.wait().await
    }

    /// Waits for the watch to end on its own.
    pub async fn wait(self) -> Result<()> {
        self.handle.await?
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn forward(
    mut iterator: EventIterator,
    sink: EventSink,
    policy: SinkPolicy,
    token: CancellationToken,
) -> Result<()> {
    let name = iterator.event().name.clone();
    tracing::info!("Watching {} events", name);

    let outcome = loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => break Ok(()),
            item = iterator.next() => item,
        };
        let Some(item) = item else {
            break Ok(());
        };

        match policy {
            SinkPolicy::Block => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break Ok(()),
                    sent = sink.send(item) => {
                        if sent.is_err() {
                            break Err(BindingError::SinkClosed);
                        }
                    }
                }
            }
            SinkPolicy::Reject => match sink.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => break Err(BindingError::SinkFull),
                Err(TrySendError::Closed(_)) => break Err(BindingError::SinkClosed),
            },
        }
    };

    let failure = iterator.finish();
    match (outcome, failure) {
        (Err(e), _) => {
            tracing::warn!("Watch for {} stopped: {}", name, e);
            Err(e)
        }
        (Ok(()), Some(e)) if !token.is_cancelled() => {
            tracing::warn!("Watch for {} stopped: {}", name, e);
            Err(e)
        }
        (Ok(()), _) => {
            tracing::info!("Watch for {} ended", name);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{log_at, StubFilterer};
    use crate::error::BackendError;
    use alloy::{
        json_abi::Event,
        primitives::Address,
        rpc::types::{Filter, Log},
    };
    use std::time::Duration;

    fn jailed() -> Event {
        Event::parse("event validatorJailed(address indexed validator)").unwrap()
    }

    fn jailed_log(block: u64, validator: u8) -> Log {
        log_at(
            block,
            0,
            vec![
                jailed().selector(),
                Address::with_last_byte(validator).into_word(),
            ],
            Vec::new(),
        )
    }

    async fn watch(
        filterer: &StubFilterer,
        sink: EventSink,
        policy: SinkPolicy,
    ) -> EventWatch {
        let iterator = EventIterator::open(filterer, jailed(), None, Some(Filter::new()))
            .await
            .unwrap();
        EventWatch::spawn(iterator, sink, policy, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_forwards_live_events() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, mut rx) = mpsc::channel(8);
        let watch = watch(&filterer, tx, SinkPolicy::Block).await;

        let feed = filterer.feed();
        assert!(feed.deliver(jailed_log(1, 1)).await);
        assert!(feed.deliver(log_at(2, 0, vec![jailed().selector()], Vec::new())).await);

        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.unwrap().unwrap_err().is_decode());

        watch.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_stops_forwarding() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, mut rx) = mpsc::channel(8);
        let watch = watch(&filterer, tx, SinkPolicy::Block).await;
        let feed = filterer.feed();

        assert!(feed.deliver(jailed_log(1, 1)).await);
        assert!(rx.recv().await.unwrap().is_ok());

        watch.unsubscribe().await.unwrap();

        assert!(feed.is_closed());
        assert!(!feed.deliver(jailed_log(2, 2)).await);
        // the watch dropped its sender, nothing else can arrive
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_external_token_cancels() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, _rx) = mpsc::channel(8);
        let watch = watch(&filterer, tx, SinkPolicy::Block).await;

        watch.cancellation_token().cancel();
        tokio::time::timeout(Duration::from_secs(1), watch.wait())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_error_is_returned() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, _rx) = mpsc::channel(8);
        let watch = watch(&filterer, tx, SinkPolicy::Block).await;

        filterer
            .feed()
            .fail(BackendError::SubscriptionDropped("connection reset".into()))
            .await;

        let err = watch.wait().await.unwrap_err();
        assert!(matches!(
            err,
            BindingError::Backend(BackendError::SubscriptionDropped(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_sink_stops_watch() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let watch = watch(&filterer, tx, SinkPolicy::Block).await;

        let feed = filterer.feed();
        assert!(feed.deliver(jailed_log(1, 1)).await);

        assert!(matches!(watch.wait().await, Err(BindingError::SinkClosed)));
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn test_full_sink_rejects() {
        let filterer = StubFilterer::new(Vec::new());
        let (tx, _rx) = mpsc::channel(1);
        let watch = watch(&filterer, tx, SinkPolicy::Reject).await;

        let feed = filterer.feed();
        assert!(feed.deliver(jailed_log(1, 1)).await);
        assert!(feed.deliver(jailed_log(2, 2)).await);

        assert!(matches!(watch.wait().await, Err(BindingError::SinkFull)));
    }
}
