//! Awaitable handle for a deferred call.

use super::pending::Settlement;
use crate::error::Fault;
use bridge_traits::{CorrelationId, Value};
use futures::future::FusedFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Resolution state of a deferred call, as seen by [`Deferred::try_state`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    Pending,
    Fulfilled(Value),
    Rejected(Fault),
}

enum State {
    Waiting(oneshot::Receiver<Settlement>),
    Settled(Settlement),
}

/// Handle to the result of a deferred call.
///
/// Awaiting it yields the host's reply value or a [`Fault`]. If the broker
/// drops the call without settling it, the handle resolves to
/// [`Fault::Transport`], so it can never hang once the broker is gone.
pub struct Deferred {
    id: Option<CorrelationId>,
    operation: String,
    state: State,
    consumed: bool,
}

impl Deferred {
    pub(crate) fn waiting(
        id: CorrelationId,
        operation: impl Into<String>,
        receiver: oneshot::Receiver<Settlement>,
    ) -> Self {
        Self {
            id: Some(id),
            operation: operation.into(),
            state: State::Waiting(receiver),
            consumed: false,
        }
    }

    /// An already fulfilled handle.
    pub fn ready(operation: impl Into<String>, value: Value) -> Self {
        Self::settled(operation.into(), Ok(value))
    }

    /// An already rejected handle.
    pub fn rejected(operation: impl Into<String>, fault: Fault) -> Self {
        Self::settled(operation.into(), Err(fault))
    }

    fn settled(operation: String, result: Settlement) -> Self {
        Self {
            id: None,
            operation,
            state: State::Settled(result),
            consumed: false,
        }
    }

    /// Correlation id of the call, if one was allocated.
    pub fn id(&self) -> Option<CorrelationId> {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn abandoned(&self) -> Fault {
        Fault::Transport(format!(
            "{} was dropped by the broker before a reply arrived",
            self.operation
        ))
    }

    /// Inspect the state without waiting or consuming the handle.
    pub fn try_state(&mut self) -> CallState {
        if let State::Waiting(receiver) = &mut self.state {
            let settled = match receiver.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return CallState::Pending,
                Err(TryRecvError::Closed) => Err(self.abandoned()),
            };
            self.state = State::Settled(settled);
        }

        match &self.state {
            State::Settled(Ok(value)) => CallState::Fulfilled(value.clone()),
            State::Settled(Err(fault)) => CallState::Rejected(fault.clone()),
            State::Waiting(_) => CallState::Pending,
        }
    }
}

impl Future for Deferred {
    type Output = Result<Value, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let State::Waiting(receiver) = &mut this.state {
            let settled = match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(result)) => result,
                Poll::Ready(Err(_)) => Err(this.abandoned()),
            };
            this.state = State::Settled(settled);
        }

        this.consumed = true;
        match &this.state {
            State::Settled(result) => Poll::Ready(result.clone()),
            State::Waiting(_) => Poll::Pending,
        }
    }
}

impl FusedFuture for Deferred {
    fn is_terminated(&self) -> bool {
        self.consumed
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Waiting(_) => "waiting",
            State::Settled(Ok(_)) => "fulfilled",
            State::Settled(Err(_)) => "rejected",
        };
        f.debug_struct("Deferred")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ready_and_rejected() {
        assert_eq!(Deferred::ready("op", json!(5)).await, Ok(json!(5)));

        let fault = Fault::LocalValidation("object value".into());
        let mut handle = Deferred::rejected("op", fault.clone());
        assert_eq!(handle.try_state(), CallState::Rejected(fault.clone()));
        assert_eq!(handle.await, Err(fault));
    }

    #[tokio::test]
    async fn test_try_state_tracks_settlement() {
        let (tx, rx) = oneshot::channel();
        let mut handle = Deferred::waiting(CorrelationId(4), "op", rx);

        assert_eq!(handle.id(), Some(CorrelationId(4)));
        assert_eq!(handle.try_state(), CallState::Pending);

        tx.send(Ok(json!("done"))).unwrap();
        assert_eq!(handle.try_state(), CallState::Fulfilled(json!("done")));
        // Observing the state does not consume the result.
        assert_eq!(handle.try_state(), CallState::Fulfilled(json!("done")));
        assert!(!handle.is_terminated());
        assert_eq!((&mut handle).await, Ok(json!("done")));
        assert!(handle.is_terminated());
    }

    #[tokio::test]
    async fn test_dropped_sender_rejects_with_transport() {
        let (tx, rx) = oneshot::channel::<Settlement>();
        let handle = Deferred::waiting(CorrelationId(1), "/nuvola/storage/get-value", rx);
        drop(tx);

        match handle.await {
            Err(Fault::Transport(msg)) => assert!(msg.contains("/nuvola/storage/get-value")),
            other => panic!("expected transport fault, got {other:?}"),
        }
    }
}
