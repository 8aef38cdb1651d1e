//! In-process relay and its client transport.
//!
//! `LocalRelay` behaves like the network relay clients normally sit behind:
//! it hands out random connection identifiers, keeps the list of online
//! users, pushes that list to every online client whenever it changes, and
//! forwards addressed events to their target with the sender attached.
//! Every message crosses it as JSON text, so decoding and validation run
//! exactly as they would over a socket.
//!
//! Everything is single-threaded: the relay state lives in an
//! `Rc<RefCell<_>>` shared by the transports it created.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use log::{debug, warn};

use crate::constants::CONNECTION_ID_LEN;
use crate::protocol::{Inbound, Message, Outbound, PeerId, PeerInfo};
use crate::transport::{Transport, TransportError};

/// Routing core shared by [`LocalRelay`] and the TCP relay in `net`.
pub(crate) struct RelayState {
    rng: fastrand::Rng,
    /// Undelivered JSON messages per open connection.
    inboxes: BTreeMap<PeerId, VecDeque<String>>,
    /// Users who announced presence, in announcement order.
    online: Vec<PeerId>,
}

impl RelayState {
    pub(crate) fn new(rng: fastrand::Rng) -> Self {
        Self {
            rng,
            inboxes: BTreeMap::new(),
            online: Vec::new(),
        }
    }

    pub(crate) fn open(&mut self) -> PeerId {
        loop {
            let id: String = std::iter::repeat_with(|| self.rng.alphanumeric())
                .take(CONNECTION_ID_LEN)
                .collect();
            let id = PeerId(id);
            if !self.inboxes.contains_key(&id) {
                self.inboxes.insert(id.clone(), VecDeque::new());
                debug!("relay: new connection {id}");
                return id;
            }
        }
    }

    pub(crate) fn close(&mut self, id: &PeerId) {
        if self.inboxes.remove(id).is_none() {
            return;
        }
        debug!("relay: connection {id} closed");
        if self.take_offline(id) {
            self.broadcast_peer_list();
        }
    }

    fn take_offline(&mut self, id: &PeerId) -> bool {
        let before = self.online.len();
        self.online.retain(|p| p != id);
        self.online.len() != before
    }

    fn peer_list(&self) -> Vec<PeerInfo> {
        self.online
            .iter()
            .map(|id| PeerInfo {
                id: id.clone(),
                label: id.label(),
            })
            .collect()
    }

    /// Take everything queued for `id`, oldest first.
    pub(crate) fn drain(&mut self, id: &PeerId) -> Vec<String> {
        self.inboxes
            .get_mut(id)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Connections with undelivered messages.
    pub(crate) fn ids_with_mail(&self) -> Vec<PeerId> {
        self.inboxes
            .iter()
            .filter(|(_, inbox)| !inbox.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn deliver(&mut self, to: &PeerId, from: Option<&PeerId>, message: Message) {
        let Some(inbox) = self.inboxes.get_mut(to) else {
            debug!("relay: dropping {} for unknown connection {to}", message.event());
            return;
        };
        let inbound = Inbound {
            from: from.cloned(),
            message,
        };
        match inbound.encode() {
            Ok(text) => inbox.push_back(text),
            Err(e) => warn!("relay: could not encode message for {to}: {e}"),
        }
    }

    fn broadcast_peer_list(&mut self) {
        let list = self.peer_list();
        for id in self.online.clone() {
            self.deliver(&id, None, Message::PeerListUpdate(list.clone()));
        }
    }

    pub(crate) fn route(&mut self, from: &PeerId, text: &str) {
        let outbound = match Outbound::decode(text) {
            Ok(out) => out,
            Err(e) => {
                warn!("relay: dropping malformed message from {from}: {e}");
                return;
            }
        };
        let Outbound { to, message } = outbound;
        match message {
            Message::PresenceAnnounce => {
                if !self.online.contains(from) {
                    self.online.push(from.clone());
                }
                let me = PeerInfo {
                    id: from.clone(),
                    label: from.label(),
                };
                self.deliver(from, None, Message::Identity(me));
                self.broadcast_peer_list();
            }
            Message::PresenceWithdraw => {
                if self.take_offline(from) {
                    self.broadcast_peer_list();
                }
            }
            Message::StoneMove(_) => match to {
                Some(to) => self.deliver(&to, Some(from), message),
                None => {
                    let others: Vec<PeerId> =
                        self.inboxes.keys().filter(|id| *id != from).cloned().collect();
                    for id in others {
                        self.deliver(&id, Some(from), message.clone());
                    }
                }
            },
            Message::SyncRequest(_) | Message::SyncAccept(_) | Message::SyncFinalAck => match to {
                Some(to) => self.deliver(&to, Some(from), message),
                None => debug!("relay: {} from {from} has no target", message.event()),
            },
            Message::Identity(_) | Message::PeerListUpdate(_) => {
                debug!("relay: ignoring relay-only event {} from {from}", message.event());
            }
        }
    }
}

/// Shared handle to an in-process relay.
#[derive(Clone)]
pub struct LocalRelay {
    state: Rc<RefCell<RelayState>>,
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay with reproducible connection identifiers.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(fastrand::Rng::with_seed(seed))
    }

    fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            state: Rc::new(RefCell::new(RelayState::new(rng))),
        }
    }

    /// A fresh, not yet connected client transport.
    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            relay: Rc::clone(&self.state),
            id: None,
        }
    }

    /// Drop a connection as if its socket went away.
    pub fn disconnect(&self, id: &PeerId) {
        self.state.borrow_mut().close(id);
    }

    pub fn online(&self) -> Vec<PeerInfo> {
        self.state.borrow().peer_list()
    }

    pub fn connection_count(&self) -> usize {
        self.state.borrow().inboxes.len()
    }
}

/// Client side of a [`LocalRelay`] connection.
pub struct LocalTransport {
    relay: Rc<RefCell<RelayState>>,
    id: Option<PeerId>,
}

impl LocalTransport {
    /// Connection identifier, once connected.
    pub fn id(&self) -> Option<&PeerId> {
        self.id.as_ref()
    }
}

impl Transport for LocalTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }
        // A dropped connection comes back under a new id.
        self.id = Some(self.relay.borrow_mut().open());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.id
            .as_ref()
            .is_some_and(|id| self.relay.borrow().inboxes.contains_key(id))
    }

    fn send(&mut self, message: Outbound) -> Result<(), TransportError> {
        let id = self.id.as_ref().ok_or(TransportError::NotConnected)?;
        let mut relay = self.relay.borrow_mut();
        if !relay.inboxes.contains_key(id) {
            return Err(TransportError::Closed);
        }
        let text = message.encode()?;
        relay.route(id, &text);
        Ok(())
    }

    fn poll(&mut self) -> Vec<Inbound> {
        let Some(id) = self.id.as_ref() else {
            return Vec::new();
        };
        let pending = self.relay.borrow_mut().drain(id);
        pending
            .into_iter()
            .filter_map(|text| match Inbound::decode(&text) {
                Ok(inbound) => Some(inbound),
                Err(e) => {
                    warn!("dropping undecodable message: {e}");
                    None
                }
            })
            .collect()
    }
}
