//! The message channel the sync coordinator talks through.
//!
//! A [`Transport`] is connected before use, sends fire-and-forget messages and hands
//! back whatever arrived on [`Transport::poll`]. Messages from one peer for one
//! event arrive in the order they were sent; nothing else is guaranteed.
//!
//! Inbound messages are routed through a [`HandlerTable`]: exactly one handler
//! per event name, and registering again for a name replaces the old one.

use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::{EventName, Inbound, Outbound, ProtocolError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport is already connected")]
    AlreadyConnected,
    #[error("relay connection closed")]
    Closed,
    #[error("could not encode message: {0}")]
    Encode(#[from] ProtocolError),
    #[error("relay I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Transport {
    /// Open the channel. Fails while a connection is already open.
    fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Hand a message to the relay. Success means it left this client, not
    /// that anyone received it.
    fn send(&mut self, message: Outbound) -> Result<(), TransportError>;

    /// Messages delivered since the previous call, in arrival order.
    fn poll(&mut self) -> Vec<Inbound>;
}

/// Handler invoked with the receiving state and the delivered message.
pub type Handler<S> = fn(&mut S, Inbound);

/// Single-slot handler registry keyed by event name.
pub struct HandlerTable<S> {
    handlers: HashMap<EventName, Handler<S>>,
}

impl<S> Default for HandlerTable<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> HandlerTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, returning the handler it replaced.
    pub fn on(&mut self, event: EventName, handler: Handler<S>) -> Option<Handler<S>> {
        self.handlers.insert(event, handler)
    }

    pub fn get(&self, event: EventName) -> Option<Handler<S>> {
        self.handlers.get(&event).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    #[derive(Default)]
    struct Counter {
        first: u32,
        second: u32,
    }

    fn bump_first(c: &mut Counter, _msg: Inbound) {
        c.first += 1;
    }

    fn bump_second(c: &mut Counter, _msg: Inbound) {
        c.second += 1;
    }

    #[test]
    fn test_later_registration_replaces() {
        let mut table: HandlerTable<Counter> = HandlerTable::new();
        assert!(table.on(EventName::SyncFinalAck, bump_first).is_none());
        assert!(table.on(EventName::SyncFinalAck, bump_second).is_some());
        assert_eq!(table.len(), 1);

        let mut counter = Counter::default();
        let handler = table.get(EventName::SyncFinalAck).unwrap();
        handler(
            &mut counter,
            Inbound {
                from: None,
                message: Message::SyncFinalAck,
            },
        );
        assert_eq!(counter.first, 0);
        assert_eq!(counter.second, 1);
        assert!(table.get(EventName::StoneMove).is_none());
    }
}
