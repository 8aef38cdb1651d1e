//! goban-sync: a two-player Go board that can pair with a remote peer.
//!
//! Two clients behind a relay discover each other, agree on one board through
//! a request / accept / final-ack handshake, and then relay every stone they
//! place to each other.
//!
//! ## Modules
//!
//! - [`constants`] - Default board size and relay/storage parameters
//! - [`board`] - Rules engine (placement, captures, suicide, undo)
//! - [`snapshot`] - Serializable board state and its validation
//! - [`registry`] - One board per size plus the current one
//! - [`protocol`] - Messages exchanged through the relay
//! - [`transport`] - Channel abstraction and handler table
//! - [`relay`] - In-process relay and client transport
//! - [`net`] - TCP relay server and client transport
//! - [`sync`] - Online mode, peer list and pairing state machine
//! - [`storage`] - Saved games on disk
//! - [`console`] - Terminal front end
//!
//! ## Example
//!
//! ```
//! use goban_sync::registry::BoardRegistry;
//! use goban_sync::relay::LocalRelay;
//! use goban_sync::sync::{SyncCoordinator, SyncState};
//!
//! let relay = LocalRelay::new();
//! let mut me = SyncCoordinator::new(relay.transport(), (), BoardRegistry::new(9).unwrap());
//!
//! // Offline play works without any peer.
//! me.play(4, 4).unwrap();
//!
//! me.go_online().unwrap();
//! me.pump();
//! assert_eq!(me.state(), &SyncState::Unsynced);
//! assert_eq!(me.peers().len(), 1);
//! ```

pub mod board;
pub mod console;
pub mod constants;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod transport;
