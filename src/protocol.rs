//! Wire vocabulary exchanged between clients and the relay.
//!
//! Every message is one JSON object: an `event` tag in kebab-case, an optional
//! `payload`, and an addressing field added by the envelope (`to` on the way
//! to the relay, `from` on the way out of it). Decoding validates snapshot
//! payloads so a malformed `sync-accept` never reaches a registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::Stone;
use crate::constants::LABEL_LEN;
use crate::snapshot::{BoardSnapshot, SnapshotError};

/// Relay-assigned connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Short display name derived from the identifier.
    pub fn label(&self) -> String {
        self.0.chars().take(LABEL_LEN).collect()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

/// One entry of the relay's online-user list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub label: String,
}

/// A stone placement relayed between synced peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoneMove {
    pub board_size: usize,
    pub row: usize,
    pub col: usize,
    pub stone: Stone,
    pub next_player: Stone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub board_size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    /// Client goes online; the relay answers with `Identity` and a peer list.
    PresenceAnnounce,
    /// Client goes offline.
    PresenceWithdraw,
    /// The relay tells a client who it is.
    Identity(PeerInfo),
    PeerListUpdate(Vec<PeerInfo>),
    StoneMove(StoneMove),
    SyncRequest(SyncRequest),
    SyncAccept(BoardSnapshot),
    SyncFinalAck,
}

/// Event names, one per `Message` variant. Handlers are registered by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    PresenceAnnounce,
    PresenceWithdraw,
    Identity,
    PeerListUpdate,
    StoneMove,
    SyncRequest,
    SyncAccept,
    SyncFinalAck,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::PresenceAnnounce => "presence-announce",
            EventName::PresenceWithdraw => "presence-withdraw",
            EventName::Identity => "identity",
            EventName::PeerListUpdate => "peer-list-update",
            EventName::StoneMove => "stone-move",
            EventName::SyncRequest => "sync-request",
            EventName::SyncAccept => "sync-accept",
            EventName::SyncFinalAck => "sync-final-ack",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn event(&self) -> EventName {
        match self {
            Message::PresenceAnnounce => EventName::PresenceAnnounce,
            Message::PresenceWithdraw => EventName::PresenceWithdraw,
            Message::Identity(_) => EventName::Identity,
            Message::PeerListUpdate(_) => EventName::PeerListUpdate,
            Message::StoneMove(_) => EventName::StoneMove,
            Message::SyncRequest(_) => EventName::SyncRequest,
            Message::SyncAccept(_) => EventName::SyncAccept,
            Message::SyncFinalAck => EventName::SyncFinalAck,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
}

/// A message on its way from a client to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    /// Addressed peer; `None` for relay-level or broadcast events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PeerId>,
    #[serde(flatten)]
    pub message: Message,
}

impl Outbound {
    pub fn to_relay(message: Message) -> Self {
        Self { to: None, message }
    }

    pub fn to_peer(peer: &PeerId, message: Message) -> Self {
        Self {
            to: Some(peer.clone()),
            message,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let out: Outbound = serde_json::from_str(text)?;
        out.message.validate()?;
        Ok(out)
    }
}

/// A message delivered by the relay to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    /// Originating peer; `None` when the relay itself is speaking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
    #[serde(flatten)]
    pub message: Message,
}

impl Inbound {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let inbound: Inbound = serde_json::from_str(text)?;
        inbound.message.validate()?;
        Ok(inbound)
    }
}

impl Message {
    fn validate(&self) -> Result<(), ProtocolError> {
        if let Message::SyncAccept(snapshot) = self {
            snapshot.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;

    #[test]
    fn test_stone_move_wire_shape() {
        let inbound = Inbound {
            from: Some(PeerId::from("abcdef")),
            message: Message::StoneMove(StoneMove {
                board_size: 9,
                row: 4,
                col: 3,
                stone: Stone::White,
                next_player: Stone::Black,
            }),
        };
        let json: serde_json::Value = serde_json::from_str(&inbound.encode().unwrap()).unwrap();
        assert_eq!(json["event"], "stone-move");
        assert_eq!(json["from"], "abcdef");
        assert_eq!(json["payload"]["boardSize"], 9);
        assert_eq!(json["payload"]["nextPlayer"], "black");
    }

    #[test]
    fn test_unit_event_decodes_without_payload() {
        let out = Outbound::decode(r#"{"event":"presence-announce"}"#).unwrap();
        assert_eq!(out.to, None);
        assert_eq!(out.message, Message::PresenceAnnounce);
    }

    #[test]
    fn test_addressed_request_decodes() {
        let text = r#"{"to":"peer2","event":"sync-request","payload":{"boardSize":13}}"#;
        let out = Outbound::decode(text).unwrap();
        assert_eq!(out.to, Some(PeerId::from("peer2")));
        assert_eq!(
            out.message,
            Message::SyncRequest(SyncRequest { board_size: 13 })
        );
        assert_eq!(out.message.event(), EventName::SyncRequest);
    }

    #[test]
    fn test_malformed_snapshot_rejected() {
        let mut snap = BoardSnapshot::from_board(&Board::new(9).unwrap());
        snap.grid[0].clear();
        let text = Inbound {
            from: Some(PeerId::from("x")),
            message: Message::SyncAccept(snap),
        }
        .encode()
        .unwrap();
        assert!(matches!(
            Inbound::decode(&text),
            Err(ProtocolError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            Inbound::decode(r#"{"event":"stone-move","payload":{"row":1}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(Inbound::decode("not json").is_err());
        assert!(Inbound::decode(r#"{"event":"teleport"}"#).is_err());
    }

    #[test]
    fn test_label_is_prefix() {
        assert_eq!(PeerId::from("Zq81xx").label(), "Zq81");
        assert_eq!(PeerId::from("ab").label(), "ab");
    }
}
