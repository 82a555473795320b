//! Correlation id allocation and the table of in-flight calls.

use crate::error::Fault;
use bridge_traits::{CorrelationId, Value};
use std::collections::HashMap;
use tokio::sync::oneshot;

pub(crate) type Settlement = Result<Value, Fault>;

/// Wrapping id counter: 1, 2, ..., limit, 1, 2, ...
#[derive(Debug)]
pub(crate) struct CorrelationCounter {
    next: u32,
    limit: u32,
}

impl CorrelationCounter {
    pub(crate) fn new(limit: u32) -> Self {
        Self { next: 1, limit }
    }

    pub(crate) fn advance(&mut self) -> CorrelationId {
        let id = self.next;
        self.next = if id >= self.limit { 1 } else { id + 1 };
        CorrelationId(id)
    }
}

#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) operation: String,
    settler: oneshot::Sender<Settlement>,
}

impl PendingCall {
    /// Transition out of pending. Consumes the record, so this can happen
    /// at most once. Returns `false` if the caller already dropped its handle.
    pub(crate) fn settle(self, result: Settlement) -> bool {
        self.settler.send(result).is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct PendingTable {
    counter: CorrelationCounter,
    limit: u32,
    calls: HashMap<CorrelationId, PendingCall>,
    closed: bool,
}

impl PendingTable {
    pub(crate) fn new(limit: u32) -> Self {
        Self {
            counter: CorrelationCounter::new(limit),
            limit,
            calls: HashMap::new(),
            closed: false,
        }
    }

    /// Allocate an id not currently in use and record the call under it.
    pub(crate) fn register(
        &mut self,
        operation: &str,
    ) -> Result<(CorrelationId, oneshot::Receiver<Settlement>), Fault> {
        if self.closed {
            return Err(Fault::Transport(format!(
                "broker is shut down; {operation} not sent"
            )));
        }
        if self.calls.len() >= self.limit as usize {
            return Err(Fault::Transport(format!(
                "all {} correlation ids are in flight; {operation} not sent",
                self.limit
            )));
        }

        let id = loop {
            let candidate = self.counter.advance();
            if !self.calls.contains_key(&candidate) {
                break candidate;
            }
        };

        let (settler, receiver) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                operation: operation.to_string(),
                settler,
            },
        );
        Ok((id, receiver))
    }

    pub(crate) fn take(&mut self, id: CorrelationId) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Refuse further registrations and hand back everything still pending.
    pub(crate) fn close(&mut self) -> Vec<(CorrelationId, PendingCall)> {
        self.closed = true;
        let mut drained: Vec<_> = self.calls.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}
