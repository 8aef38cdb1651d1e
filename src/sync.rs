//! Online/offline mode, peer discovery and the pairing handshake.
//!
//! ```text
//!            go_online                request_sync(P)
//!  Offline ─────────────▶ Unsynced ───────────────────▶ Syncing{P}
//!     ▲                    ▲   │ accept request from Q      │ sync-accept from P
//!     │ go_offline         │   ▼                            ▼
//!     └────────────────── Synced{Q} ◀──────────────────── Synced{P}
//!                          (target leaves the peer list ─▶ Unsynced)
//! ```
//!
//! The requester sends `sync-request`; the responder (after a possibly slow
//! user decision) answers `sync-accept` carrying its current board; the
//! requester loads that board, pairs, and replies `sync-final-ack`. While
//! paired, every stone placed locally is relayed to the peer only.
//!
//! Bad or late messages never end the session: they are logged, sometimes
//! surfaced as a [`SyncWarning`], and otherwise ignored.

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::board::{Board, BoardError, MoveError, MoveOutcome};
use crate::protocol::{
    EventName, Inbound, Message, Outbound, PeerId, PeerInfo, StoneMove, SyncRequest,
};
use crate::registry::BoardRegistry;
use crate::snapshot::BoardSnapshot;
use crate::transport::{HandlerTable, Transport, TransportError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    /// Online, not paired.
    Unsynced,
    /// Request sent to `target`, waiting for its decision.
    Syncing { target: PeerId },
    /// Paired with `peer`; moves are relayed.
    Synced { peer: PeerId },
}

impl SyncState {
    pub fn is_online(&self) -> bool {
        !matches!(self, SyncState::Offline)
    }

    /// Peer being synced with or waited on.
    pub fn target(&self) -> Option<&PeerId> {
        match self {
            SyncState::Syncing { target } => Some(target),
            SyncState::Synced { peer } => Some(peer),
            _ => None,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Offline => write!(f, "offline"),
            SyncState::Unsynced => write!(f, "online"),
            SyncState::Syncing { target } => write!(f, "waiting for {}", target.label()),
            SyncState::Synced { peer } => write!(f, "synced with {}", peer.label()),
        }
    }
}

/// A sync request waiting for the user's answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub from: PeerId,
    pub label: String,
    pub board_size: usize,
}

/// Network events worth showing the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncWarning {
    /// The peer sent a move for a point already in our history.
    DuplicateMove { row: usize, col: usize },
    /// The peer's move broke the rules on our board.
    RejectedMove {
        row: usize,
        col: usize,
        reason: MoveError,
    },
    /// The paired peer's board could not be loaded.
    SnapshotRejected(String),
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::DuplicateMove { row, col } => {
                write!(f, "peer move at ({row}, {col}) was already played, ignored")
            }
            SyncWarning::RejectedMove { row, col, reason } => {
                write!(f, "peer move at ({row}, {col}) rejected: {reason}")
            }
            SyncWarning::SnapshotRejected(reason) => {
                write!(f, "could not load peer board: {reason}")
            }
        }
    }
}

/// Callbacks into whatever presents the session to the user.
pub trait SyncObserver {
    fn state_changed(&mut self, _state: &SyncState) {}

    fn identity_assigned(&mut self, _me: &PeerInfo) {}

    fn peers_updated(&mut self, _peers: &[PeerInfo]) {}

    /// Asked when a request arrives. `Some(answer)` decides immediately;
    /// `None` leaves it pending until [`SyncCoordinator::resolve_sync_request`].
    fn sync_requested(&mut self, _request: &PendingRequest) -> Option<bool> {
        None
    }

    fn board_changed(&mut self, _board: &Board) {}

    fn warning(&mut self, _warning: &SyncWarning) {}
}

impl SyncObserver for () {}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not online")]
    NotOnline,
    #[error("peer {0} is not online")]
    UnknownPeer(PeerId),
    #[error("cannot sync with yourself")]
    SelfTarget,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Rejected(#[from] MoveError),
    /// The move stands locally but the peer may not have it.
    #[error("move played but not relayed: {source}")]
    NotRelayed {
        outcome: MoveOutcome,
        source: TransportError,
    },
}

/// Drives one client's side of the session.
pub struct SyncCoordinator<T: Transport, O: SyncObserver> {
    transport: T,
    observer: O,
    registry: BoardRegistry,
    handlers: HandlerTable<Self>,
    state: SyncState,
    me: Option<PeerInfo>,
    peers: Vec<PeerInfo>,
    pending: Vec<PendingRequest>,
    /// Requester we accepted and expect a final ack from.
    awaiting_ack: Option<PeerId>,
}

impl<T: Transport, O: SyncObserver> SyncCoordinator<T, O> {
    pub fn new(transport: T, observer: O, registry: BoardRegistry) -> Self {
        let mut handlers: HandlerTable<Self> = HandlerTable::new();
        handlers.on(EventName::Identity, Self::handle_identity);
        handlers.on(EventName::PeerListUpdate, Self::handle_peer_list);
        handlers.on(EventName::SyncRequest, Self::handle_sync_request);
        handlers.on(EventName::SyncAccept, Self::handle_sync_accept);
        handlers.on(EventName::SyncFinalAck, Self::handle_final_ack);
        handlers.on(EventName::StoneMove, Self::handle_stone_move);
        Self {
            transport,
            observer,
            registry,
            handlers,
            state: SyncState::Offline,
            me: None,
            peers: Vec::new(),
            pending: Vec::new(),
            awaiting_ack: None,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn registry(&self) -> &BoardRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BoardRegistry {
        &mut self.registry
    }

    pub fn board(&self) -> &Board {
        self.registry.current()
    }

    /// Our own relay identity, known after going online.
    pub fn me(&self) -> Option<&PeerInfo> {
        self.me.as_ref()
    }

    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    pub fn pending_requests(&self) -> &[PendingRequest] {
        &self.pending
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            info!("sync: {} -> {}", self.state, state);
        }
        self.state = state;
        self.observer.state_changed(&self.state);
    }

    // =========================================================================
    // Local actions
    // =========================================================================

    /// Switch to online mode and announce presence to the relay.
    pub fn go_online(&mut self) -> Result<(), SyncError> {
        if self.state.is_online() {
            return Ok(());
        }
        if !self.transport.is_connected() {
            self.transport.connect()?;
        }
        self.transport
            .send(Outbound::to_relay(Message::PresenceAnnounce))?;
        self.set_state(SyncState::Unsynced);
        Ok(())
    }

    /// Switch to offline mode, dropping any pairing, then withdraw presence.
    /// The local state is offline even if the withdrawal could not be sent.
    pub fn go_offline(&mut self) -> Result<(), SyncError> {
        if !self.state.is_online() {
            return Ok(());
        }
        self.peers.clear();
        self.pending.clear();
        self.awaiting_ack = None;
        self.set_state(SyncState::Offline);
        self.transport
            .send(Outbound::to_relay(Message::PresenceWithdraw))?;
        Ok(())
    }

    /// Ask `target` to pair, offering the size of our current board.
    pub fn request_sync(&mut self, target: &PeerId) -> Result<(), SyncError> {
        if !self.state.is_online() {
            return Err(SyncError::NotOnline);
        }
        if self.me.as_ref().is_some_and(|me| &me.id == target) {
            return Err(SyncError::SelfTarget);
        }
        if !self.peers.iter().any(|p| &p.id == target) {
            return Err(SyncError::UnknownPeer(target.clone()));
        }
        let request = SyncRequest {
            board_size: self.registry.current_size(),
        };
        self.transport
            .send(Outbound::to_peer(target, Message::SyncRequest(request)))?;
        info!("sync: requested pairing with {target} on {0}x{0}", request.board_size);
        // Any earlier pairing we accepted is abandoned.
        self.awaiting_ack = None;
        self.set_state(SyncState::Syncing {
            target: target.clone(),
        });
        Ok(())
    }

    /// Answer a pending request from `from`. Returns whether a pairing was
    /// made. Eligibility is judged now, not when the request arrived.
    pub fn resolve_sync_request(&mut self, from: &PeerId, accept: bool) -> Result<bool, SyncError> {
        let Some(pos) = self.pending.iter().position(|r| &r.from == from) else {
            debug!("sync: no pending request from {from}");
            return Ok(false);
        };
        let request = self.pending.remove(pos);
        if !accept {
            info!("sync: declined request from {}", request.label);
            return Ok(false);
        }
        if !self.state.is_online() {
            return Err(SyncError::NotOnline);
        }
        if !self.peers.iter().any(|p| &p.id == from) {
            debug!("sync: {from} left before the request was answered");
            return Ok(false);
        }
        if let SyncState::Synced { peer } = &self.state {
            if peer != from {
                debug!("sync: already paired with {peer}, dropping request from {from}");
                return Ok(false);
            }
        }

        let snapshot = BoardSnapshot::from_board(self.registry.current());
        self.transport
            .send(Outbound::to_peer(from, Message::SyncAccept(snapshot)))?;
        self.awaiting_ack = Some(from.clone());
        self.set_state(SyncState::Synced { peer: from.clone() });
        Ok(true)
    }

    /// Play at (row, col) on the current board, or undo the last move when
    /// clicking it again. Placed stones are relayed while paired.
    pub fn play(&mut self, row: usize, col: usize) -> Result<MoveOutcome, PlayError> {
        let board = self.registry.current_mut();
        let outcome = board.attempt_move(row, col)?;
        let board_size = board.size();
        let next_player = board.current_player();
        self.observer.board_changed(self.registry.current());

        if let (MoveOutcome::Placed { mv, .. }, SyncState::Synced { peer }) =
            (&outcome, &self.state)
        {
            let relayed = StoneMove {
                board_size,
                row: mv.row,
                col: mv.col,
                stone: mv.stone,
                next_player,
            };
            let message = Outbound::to_peer(peer, Message::StoneMove(relayed));
            if let Err(source) = self.transport.send(message) {
                warn!("sync: could not relay move ({row}, {col}): {source}");
                return Err(PlayError::NotRelayed { outcome, source });
            }
        }
        Ok(outcome)
    }

    /// Change which board size is in play. Moves the peer relays for any
    /// other size are dropped while this one is current.
    pub fn set_board_size(&mut self, size: usize) -> Result<(), BoardError> {
        self.registry.set_current(size)?;
        self.observer.board_changed(self.registry.current());
        Ok(())
    }

    /// Handle everything the transport has delivered. Returns the number of
    /// messages processed.
    pub fn pump(&mut self) -> usize {
        let inbound = self.transport.poll();
        let count = inbound.len();
        for message in inbound {
            self.dispatch(message);
        }
        count
    }

    fn dispatch(&mut self, inbound: Inbound) {
        let event = inbound.message.event();
        match self.handlers.get(event) {
            Some(handler) => handler(self, inbound),
            None => debug!("sync: no handler for {event}"),
        }
    }

    // =========================================================================
    // Inbound handlers
    // =========================================================================

    fn handle_identity(&mut self, inbound: Inbound) {
        let Message::Identity(me) = inbound.message else {
            return;
        };
        info!("sync: relay knows us as {}", me.label);
        self.observer.identity_assigned(&me);
        self.me = Some(me);
    }

    fn handle_peer_list(&mut self, inbound: Inbound) {
        let Message::PeerListUpdate(peers) = inbound.message else {
            return;
        };
        if !self.state.is_online() {
            return;
        }
        self.peers = peers;
        let peers = &self.peers;
        self.pending
            .retain(|r| peers.iter().any(|p| p.id == r.from));
        if self
            .awaiting_ack
            .as_ref()
            .is_some_and(|id| !peers.iter().any(|p| &p.id == id))
        {
            self.awaiting_ack = None;
        }
        self.observer.peers_updated(&self.peers);

        let target_gone = self
            .state
            .target()
            .is_some_and(|target| !self.peers.iter().any(|p| &p.id == target));
        if target_gone {
            info!("sync: {} left the peer list", self.state);
            self.awaiting_ack = None;
            self.set_state(SyncState::Unsynced);
        }
    }

    fn handle_sync_request(&mut self, inbound: Inbound) {
        let (Some(from), Message::SyncRequest(request)) = (inbound.from, inbound.message) else {
            return;
        };
        if !self.state.is_online() {
            return;
        }
        if let SyncState::Synced { peer } = &self.state {
            if *peer != from {
                debug!("sync: already paired with {peer}, dropping request from {from}");
                return;
            }
        }

        let pending = PendingRequest {
            label: from.label(),
            from: from.clone(),
            board_size: request.board_size,
        };
        info!(
            "sync: {} ({}) asks to sync on {2}x{2}",
            pending.label, pending.from, pending.board_size
        );
        self.pending.retain(|r| r.from != from);
        self.pending.push(pending.clone());

        if let Some(accept) = self.observer.sync_requested(&pending) {
            if let Err(e) = self.resolve_sync_request(&from, accept) {
                warn!("sync: could not answer {from}: {e}");
            }
        }
    }

    fn handle_sync_accept(&mut self, inbound: Inbound) {
        let (Some(from), Message::SyncAccept(snapshot)) = (inbound.from, inbound.message) else {
            return;
        };
        match &self.state {
            SyncState::Syncing { target } if *target == from => {}
            _ => {
                debug!("sync: discarding accept from {from} in state {}", self.state);
                return;
            }
        }

        let size = snapshot.board_size;
        let loaded = self
            .registry
            .replace_snapshot(&snapshot)
            .map_err(|e| e.to_string())
            .and_then(|()| self.registry.set_current(size).map_err(|e| e.to_string()));
        if let Err(reason) = loaded {
            warn!("sync: board from {from} rejected: {reason}");
            self.observer
                .warning(&SyncWarning::SnapshotRejected(reason));
            return;
        }
        self.observer.board_changed(self.registry.current());

        if let Err(e) = self
            .transport
            .send(Outbound::to_peer(&from, Message::SyncFinalAck))
        {
            warn!("sync: could not acknowledge {from}: {e}");
        }
        self.set_state(SyncState::Synced { peer: from });
    }

    fn handle_final_ack(&mut self, inbound: Inbound) {
        let Some(from) = inbound.from else {
            return;
        };
        let expected = self.awaiting_ack.as_ref() == Some(&from)
            && matches!(&self.state, SyncState::Synced { peer } if *peer == from);
        if !expected {
            debug!("sync: discarding final ack from {from} in state {}", self.state);
            return;
        }
        self.awaiting_ack = None;
        info!("sync: pairing with {from} confirmed");
    }

    fn handle_stone_move(&mut self, inbound: Inbound) {
        let (Some(from), Message::StoneMove(mv)) = (inbound.from, inbound.message) else {
            return;
        };
        match &self.state {
            SyncState::Synced { peer } if *peer == from => {}
            _ => {
                debug!("sync: ignoring move from {from} in state {}", self.state);
                return;
            }
        }
        if mv.board_size != self.registry.current_size() {
            debug!(
                "sync: ignoring move for {0}x{0} while playing {1}x{1}",
                mv.board_size,
                self.registry.current_size()
            );
            return;
        }

        let board = self.registry.current_mut();
        if board.has_played_at(mv.row, mv.col) {
            warn!("sync: duplicate move ({}, {}) from {from}", mv.row, mv.col);
            self.observer.warning(&SyncWarning::DuplicateMove {
                row: mv.row,
                col: mv.col,
            });
            return;
        }
        match board.apply_remote(mv.row, mv.col, mv.stone, mv.next_player) {
            Ok(_) => self.observer.board_changed(self.registry.current()),
            Err(reason) => {
                warn!("sync: move ({}, {}) from {from} rejected: {reason}", mv.row, mv.col);
                self.observer.warning(&SyncWarning::RejectedMove {
                    row: mv.row,
                    col: mv.col,
                    reason,
                });
            }
        }
    }
}
