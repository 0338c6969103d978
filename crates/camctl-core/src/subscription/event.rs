use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::model::{ContextUpdate, InboundMessage};

/// Lifecycle and traffic notifications from the subscription manager.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Connected {
        address: String,
    },
    Disconnected {
        address: String,
        reason: String,
    },
    /// A non-heartbeat frame arrived. `update` is the filtered context
    /// delta, if the frame produced one.
    Message {
        address: String,
        message: InboundMessage,
        update: Option<ContextUpdate>,
    },
    Reconnecting {
        address: String,
        attempt: u32,
        delay: Duration,
    },
    /// Automatic reconnection stopped at the attempt cap.
    ReconnectFailed {
        address: String,
        attempts: u32,
    },
    Error {
        address: String,
        message: String,
    },
}

impl SubscriptionEvent {
    pub fn address(&self) -> &str {
        match self {
            Self::Connected { address }
            | Self::Disconnected { address, .. }
            | Self::Message { address, .. }
            | Self::Reconnecting { address, .. }
            | Self::ReconnectFailed { address, .. }
            | Self::Error { address, .. } => address,
        }
    }
}

/// `Stream` adapter over a subscription event receiver.
///
/// A consumer that falls behind skips the events it missed instead of
/// ending the stream.
pub struct SubscriptionEventStream {
    inner: BroadcastStream<Arc<SubscriptionEvent>>,
}

impl SubscriptionEventStream {
    pub(crate) fn new(receiver: tokio::sync::broadcast::Receiver<Arc<SubscriptionEvent>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for SubscriptionEventStream {
    type Item = Arc<SubscriptionEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::debug!(skipped, "subscription event consumer lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
