//! End-to-end pairing tests: several clients talking through one in-process
//! relay.

use goban_sync::board::Stone;
use goban_sync::protocol::{Inbound, Message, Outbound, PeerId};
use goban_sync::registry::BoardRegistry;
use goban_sync::relay::{LocalRelay, LocalTransport};
use goban_sync::sync::{
    PendingRequest, SyncCoordinator, SyncError, SyncObserver, SyncState, SyncWarning,
};
use goban_sync::transport::{Transport, TransportError};

// =============================================================================
// Helpers
// =============================================================================

/// Observer that answers sync requests with a fixed decision and records
/// what it was told.
#[derive(Default)]
struct Recorder {
    answer: Option<bool>,
    states: Vec<SyncState>,
    warnings: Vec<SyncWarning>,
}

impl Recorder {
    fn accepting() -> Self {
        Self {
            answer: Some(true),
            ..Self::default()
        }
    }
}

impl SyncObserver for Recorder {
    fn state_changed(&mut self, state: &SyncState) {
        self.states.push(state.clone());
    }

    fn sync_requested(&mut self, _request: &PendingRequest) -> Option<bool> {
        self.answer
    }

    fn warning(&mut self, warning: &SyncWarning) {
        self.warnings.push(warning.clone());
    }
}

/// Delivers every relayed stone move twice.
struct Echoing<T> {
    inner: T,
}

impl<T: Transport> Transport for Echoing<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.inner.connect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn send(&mut self, message: Outbound) -> Result<(), TransportError> {
        self.inner.send(message)
    }

    fn poll(&mut self) -> Vec<Inbound> {
        self.inner
            .poll()
            .into_iter()
            .flat_map(|inbound| {
                let copies = if matches!(inbound.message, Message::StoneMove(_)) {
                    2
                } else {
                    1
                };
                std::iter::repeat_n(inbound, copies)
            })
            .collect()
    }
}

type Client = SyncCoordinator<LocalTransport, Recorder>;

fn client(relay: &LocalRelay, size: usize, observer: Recorder) -> Client {
    SyncCoordinator::new(relay.transport(), observer, BoardRegistry::new(size).unwrap())
}

trait Pump {
    fn pump_once(&mut self) -> usize;
}

impl<T: Transport, O: SyncObserver> Pump for SyncCoordinator<T, O> {
    fn pump_once(&mut self) -> usize {
        self.pump()
    }
}

/// Pump every client until no messages are left in flight.
fn settle(clients: &mut [&mut dyn Pump]) {
    for _ in 0..10 {
        let handled: usize = clients.iter_mut().map(|c| c.pump_once()).sum();
        if handled == 0 {
            return;
        }
    }
    panic!("messages still flowing after 10 rounds");
}

fn id_of<T: Transport, O: SyncObserver>(c: &SyncCoordinator<T, O>) -> PeerId {
    c.me().expect("client has no identity yet").id.clone()
}

/// Bring `requester` and `responder` online and pair them.
fn pair(requester: &mut Client, responder: &mut Client) {
    requester.go_online().unwrap();
    responder.go_online().unwrap();
    settle(&mut [&mut *requester, &mut *responder]);
    let target = id_of(responder);
    requester.request_sync(&target).unwrap();
    settle(&mut [&mut *requester, &mut *responder]);
    assert_eq!(
        requester.state(),
        &SyncState::Synced {
            peer: target.clone()
        }
    );
}

// =============================================================================
// Handshake
// =============================================================================

#[test]
fn test_full_handshake_and_move_relay() {
    let relay = LocalRelay::with_seed(1);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::accepting());

    // Both boards have offline history; the responder's board wins.
    alice.play(2, 2).unwrap();
    bob.play(5, 5).unwrap();
    bob.play(6, 6).unwrap();

    alice.go_online().unwrap();
    bob.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.peers().len(), 2);
    assert_eq!(bob.peers().len(), 2);

    let alice_id = id_of(&alice);
    let bob_id = id_of(&bob);
    alice.request_sync(&bob_id).unwrap();
    assert_eq!(
        alice.state(),
        &SyncState::Syncing {
            target: bob_id.clone()
        }
    );

    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.state(), &SyncState::Synced { peer: bob_id });
    assert_eq!(bob.state(), &SyncState::Synced { peer: alice_id });
    assert_eq!(alice.board(), bob.board());
    assert_eq!(alice.board().get(2, 2), None, "requester adopted the responder's board");

    alice.play(0, 0).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.board().get(0, 0), Some(Stone::Black));
    assert_eq!(bob.board().current_player(), Stone::White);

    bob.play(1, 1).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.board().get(1, 1), Some(Stone::White));
    assert_eq!(alice.board(), bob.board());
    assert!(alice.observer().warnings.is_empty());
    assert!(bob.observer().warnings.is_empty());
}

#[test]
fn test_requester_switches_to_responder_size() {
    let relay = LocalRelay::with_seed(2);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 13, Recorder::accepting());
    alice.play(4, 4).unwrap();
    bob.play(10, 10).unwrap();

    pair(&mut alice, &mut bob);
    assert_eq!(alice.registry().current_size(), 13);
    assert_eq!(alice.board().get(10, 10), Some(Stone::Black));
    assert_eq!(alice.registry().sizes(), vec![9, 13]);

    // The 9x9 game is parked, not lost.
    alice.set_board_size(9).unwrap();
    assert_eq!(alice.board().get(4, 4), Some(Stone::Black));
}

#[test]
fn test_declined_request() {
    let relay = LocalRelay::with_seed(3);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::default());
    alice.go_online().unwrap();
    bob.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob]);

    let alice_id = id_of(&alice);
    alice.request_sync(&id_of(&bob)).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.pending_requests().len(), 1);
    assert_eq!(bob.pending_requests()[0].board_size, 9);

    assert!(!bob.resolve_sync_request(&alice_id, false).unwrap());
    settle(&mut [&mut alice, &mut bob]);
    assert!(bob.pending_requests().is_empty());
    assert_eq!(bob.state(), &SyncState::Unsynced);
    assert!(matches!(alice.state(), SyncState::Syncing { .. }));
}

#[test]
fn test_self_and_unknown_targets_refused() {
    let relay = LocalRelay::with_seed(4);
    let mut alice = client(&relay, 9, Recorder::default());
    assert!(matches!(
        alice.request_sync(&PeerId::from("nobody")),
        Err(SyncError::NotOnline)
    ));

    alice.go_online().unwrap();
    alice.pump();
    let me = id_of(&alice);
    assert!(matches!(alice.request_sync(&me), Err(SyncError::SelfTarget)));
    assert!(matches!(
        alice.request_sync(&PeerId::from("nobody")),
        Err(SyncError::UnknownPeer(_))
    ));
    assert_eq!(alice.state(), &SyncState::Unsynced);
}

// =============================================================================
// Stale and unwanted messages
// =============================================================================

#[test]
fn test_accept_after_requester_went_offline() {
    let relay = LocalRelay::with_seed(5);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::default());
    alice.go_online().unwrap();
    bob.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob]);

    let alice_id = id_of(&alice);
    alice.request_sync(&id_of(&bob)).unwrap();
    settle(&mut [&mut alice, &mut bob]);

    // Bob answers before seeing the updated peer list.
    alice.go_offline().unwrap();
    assert!(bob.resolve_sync_request(&alice_id, true).unwrap());

    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.state(), &SyncState::Offline);
    assert_eq!(bob.state(), &SyncState::Unsynced);
    assert!(alice.board().history().is_empty());
}

#[test]
fn test_accept_after_requester_disconnected() {
    let relay = LocalRelay::with_seed(6);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::default());
    alice.go_online().unwrap();
    bob.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob]);

    let alice_id = id_of(&alice);
    alice.request_sync(&id_of(&bob)).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.pending_requests().len(), 1);

    relay.disconnect(alice.transport().id().unwrap());
    settle(&mut [&mut alice, &mut bob]);
    assert!(bob.pending_requests().is_empty());
    assert!(!bob.resolve_sync_request(&alice_id, true).unwrap());
    assert_eq!(bob.state(), &SyncState::Unsynced);
    assert_eq!(relay.connection_count(), 1);
}

#[test]
fn test_late_final_ack_does_not_steal_new_pairing() {
    let relay = LocalRelay::with_seed(12);
    let mut me = client(&relay, 9, Recorder::default());
    let mut p = client(&relay, 9, Recorder::default());
    let mut q = client(&relay, 9, Recorder::accepting());
    me.go_online().unwrap();
    p.go_online().unwrap();
    q.go_online().unwrap();
    settle(&mut [&mut me, &mut p, &mut q]);

    let me_id = id_of(&me);
    let p_id = id_of(&p);
    let q_id = id_of(&q);
    p.request_sync(&me_id).unwrap();
    settle(&mut [&mut me, &mut p, &mut q]);
    assert!(me.resolve_sync_request(&p_id, true).unwrap());

    // Ask q before p's final ack has been handled.
    me.request_sync(&q_id).unwrap();
    settle(&mut [&mut me, &mut p, &mut q]);

    assert_eq!(me.state(), &SyncState::Synced { peer: q_id });
    assert_eq!(q.state(), &SyncState::Synced { peer: me_id });
    me.play(2, 2).unwrap();
    settle(&mut [&mut me, &mut p, &mut q]);
    assert_eq!(q.board().get(2, 2), Some(Stone::Black));
    assert!(p.board().history().is_empty());
}

#[test]
fn test_stranger_request_dropped_while_paired() {
    let relay = LocalRelay::with_seed(7);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::accepting());
    let mut carol = client(&relay, 9, Recorder::default());
    pair(&mut alice, &mut bob);

    carol.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob, &mut carol]);
    let bob_id = id_of(&bob);
    carol.request_sync(&bob_id).unwrap();
    settle(&mut [&mut alice, &mut bob, &mut carol]);

    assert!(bob.pending_requests().is_empty());
    assert_eq!(bob.state(), &SyncState::Synced { peer: id_of(&alice) });
    assert_eq!(carol.state(), &SyncState::Syncing { target: bob_id });

    // Moves only go to the paired peer.
    alice.play(3, 3).unwrap();
    settle(&mut [&mut alice, &mut bob, &mut carol]);
    assert_eq!(bob.board().get(3, 3), Some(Stone::Black));
    assert!(carol.board().history().is_empty());
}

#[test]
fn test_duplicate_move_is_warned_not_applied() {
    let relay = LocalRelay::with_seed(8);
    let mut alice = SyncCoordinator::new(
        Echoing {
            inner: relay.transport(),
        },
        Recorder::default(),
        BoardRegistry::new(9).unwrap(),
    );
    let mut bob = client(&relay, 9, Recorder::accepting());
    alice.go_online().unwrap();
    bob.go_online().unwrap();
    settle(&mut [&mut alice, &mut bob]);
    alice.request_sync(&id_of(&bob)).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert!(matches!(alice.state(), SyncState::Synced { .. }));

    bob.play(3, 3).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(alice.board().history().len(), 1);
    assert_eq!(alice.board(), bob.board());
    assert_eq!(
        alice.observer().warnings,
        vec![SyncWarning::DuplicateMove { row: 3, col: 3 }]
    );
}

#[test]
fn test_move_for_other_size_is_dropped() {
    let relay = LocalRelay::with_seed(9);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::accepting());
    pair(&mut alice, &mut bob);

    bob.set_board_size(13).unwrap();
    bob.play(4, 4).unwrap();
    settle(&mut [&mut alice, &mut bob]);

    assert!(alice.board().history().is_empty());
    assert!(alice.registry_mut().board(13).unwrap().history().is_empty());
    assert!(alice.observer().warnings.is_empty());
    assert!(matches!(alice.state(), SyncState::Synced { .. }));
}

// =============================================================================
// Offline mode
// =============================================================================

#[test]
fn test_going_offline_ends_pairing() {
    let relay = LocalRelay::with_seed(10);
    let mut alice = client(&relay, 9, Recorder::default());
    let mut bob = client(&relay, 9, Recorder::accepting());
    pair(&mut alice, &mut bob);

    alice.go_offline().unwrap();
    assert_eq!(alice.state(), &SyncState::Offline);
    assert!(alice.peers().is_empty());
    settle(&mut [&mut alice, &mut bob]);
    assert_eq!(bob.state(), &SyncState::Unsynced);
    assert_eq!(bob.peers().len(), 1);

    // Offline play stays local.
    alice.play(0, 0).unwrap();
    settle(&mut [&mut alice, &mut bob]);
    assert!(bob.board().history().is_empty());
    assert_eq!(
        alice.observer().states.last(),
        Some(&SyncState::Offline)
    );
}

#[test]
fn test_back_online_after_disconnect() {
    let relay = LocalRelay::with_seed(11);
    let mut alice = client(&relay, 9, Recorder::default());
    alice.go_online().unwrap();
    alice.pump();
    let first = id_of(&alice);

    relay.disconnect(&first);
    alice.go_offline().unwrap_err();
    assert_eq!(alice.state(), &SyncState::Offline);

    alice.go_online().unwrap();
    alice.pump();
    assert_ne!(id_of(&alice), first);
    assert_eq!(relay.online().len(), 1);
}
