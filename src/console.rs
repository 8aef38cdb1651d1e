//! Line-oriented console for playing and syncing from a terminal.
//!
//! Each input line is a command followed by arguments. Responses start with
//! `=` on success and `?` on failure, followed by any notices the session
//! produced (peer list changes, sync requests, warnings).
//!
//! ## Commands
//!
//! - `play <row> <col>` - Place a stone, or take back the last one
//! - `show` - Print the current board
//! - `size [n]` - Switch to the n x n board (each size keeps its own game),
//!   or list the standard sizes
//! - `clear` - Empty the current board
//! - `save` / `games` / `load <i>` / `delete <i>` - Saved games
//! - `online` / `offline` - Change mode
//! - `peers` - List online users
//! - `sync <peer>` - Ask a peer (id or label) to pair
//! - `accept <peer>` / `decline <peer>` - Answer a pending request
//! - `poll` - Process incoming network messages
//! - `list_commands` / `quit`

use std::io::{self, BufRead, Write};

use crate::board::{Board, MoveOutcome};
use crate::constants::STANDARD_SIZES;
use crate::protocol::{PeerId, PeerInfo};
use crate::storage::GameStore;
use crate::sync::{PendingRequest, SyncCoordinator, SyncObserver, SyncState, SyncWarning};
use crate::transport::Transport;

/// The list of known console commands.
const KNOWN_COMMANDS: &[&str] = &[
    "accept",
    "clear",
    "decline",
    "delete",
    "games",
    "list_commands",
    "load",
    "offline",
    "online",
    "peers",
    "play",
    "poll",
    "quit",
    "save",
    "show",
    "size",
    "sync",
];

/// Collects session events as text until the next response is printed.
#[derive(Default)]
pub struct ConsoleObserver {
    notices: Vec<String>,
}

impl ConsoleObserver {
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}

impl SyncObserver for ConsoleObserver {
    fn state_changed(&mut self, state: &SyncState) {
        self.notices.push(format!("mode: {state}"));
    }

    fn identity_assigned(&mut self, me: &PeerInfo) {
        self.notices.push(format!("you are {}", me.label));
    }

    fn peers_updated(&mut self, peers: &[PeerInfo]) {
        let labels: Vec<&str> = peers.iter().map(|p| p.label.as_str()).collect();
        self.notices.push(format!("online: {}", labels.join(", ")));
    }

    fn sync_requested(&mut self, request: &PendingRequest) -> Option<bool> {
        self.notices.push(format!(
            "{0} wants to sync on {1}x{1}; answer with 'accept {0}' or 'decline {0}'",
            request.label, request.board_size
        ));
        None
    }

    fn warning(&mut self, warning: &SyncWarning) {
        self.notices.push(format!("warning: {warning}"));
    }
}

pub struct Console<T: Transport> {
    session: SyncCoordinator<T, ConsoleObserver>,
    store: GameStore,
}

impl<T: Transport> Console<T> {
    pub fn new(session: SyncCoordinator<T, ConsoleObserver>, store: GameStore) -> Self {
        Self { session, store }
    }

    pub fn session(&self) -> &SyncCoordinator<T, ConsoleObserver> {
        &self.session
    }

    /// Run the command loop, reading from stdin and writing to stdout.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", self.session.board())?;

        for line in stdin.lock().lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            let command = parts[0].to_lowercase();
            let args = &parts[1..];

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            writeln!(stdout, "{prefix} {message}\n")?;
            stdout.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Execute one command and return (success, response), with any session
    /// notices appended to the response.
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        let (success, mut message) = self.dispatch(command, args);
        self.session.pump();
        for notice in self.session.observer_mut().take_notices() {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(&notice);
        }
        (success, message)
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "quit" | "poll" => (true, String::new()),

            "show" => (true, self.session.board().to_string()),

            "play" => {
                let (Some(row), Some(col)) = (parse_index(args, 0), parse_index(args, 1)) else {
                    return (false, "usage: play <row> <col>".to_string());
                };
                match self.session.play(row, col) {
                    Ok(MoveOutcome::Placed { captured, .. }) if captured > 0 => {
                        (true, format!("captured {captured}\n{}", self.session.board()))
                    }
                    Ok(_) => (true, self.session.board().to_string()),
                    Err(e) => (false, e.to_string()),
                }
            }

            "size" => {
                if args.is_empty() {
                    let current = self.session.board().size();
                    let sizes: Vec<String> =
                        STANDARD_SIZES.iter().map(|n| format!("{n}x{n}")).collect();
                    let listing = sizes.join(" ");
                    return (
                        true,
                        format!("playing {current}x{current}; standard sizes: {listing}"),
                    );
                }
                let Some(size) = parse_index(args, 0) else {
                    return (false, "usage: size <n>".to_string());
                };
                match self.session.set_board_size(size) {
                    Ok(()) => (true, self.session.board().to_string()),
                    Err(e) => (false, e.to_string()),
                }
            }

            "clear" => {
                if let Some(refusal) = self.refuse_while_paired() {
                    return (false, refusal);
                }
                self.session.registry_mut().current_mut().clear();
                (true, self.session.board().to_string())
            }

            "save" => match self.store.save(self.session.board()) {
                Ok(game) => (true, format!("saved '{}'", game.name)),
                Err(e) => (false, e.to_string()),
            },

            "games" => match self.store.list() {
                Ok(games) => {
                    let lines: Vec<String> = games
                        .iter()
                        .enumerate()
                        .map(|(i, g)| format!("{i}: {}", g.name))
                        .collect();
                    (true, lines.join("\n"))
                }
                Err(e) => (false, e.to_string()),
            },

            "load" => {
                let Some(index) = parse_index(args, 0) else {
                    return (false, "usage: load <index>".to_string());
                };
                if let Some(refusal) = self.refuse_while_paired() {
                    return (false, refusal);
                }
                let loaded = self.store.load(index).map_err(|e| e.to_string()).and_then(|snap| {
                    self.session
                        .registry_mut()
                        .replace_snapshot(&snap)
                        .map_err(|e| e.to_string())?;
                    self.session
                        .set_board_size(snap.board_size)
                        .map_err(|e| e.to_string())
                });
                match loaded {
                    Ok(()) => (true, self.session.board().to_string()),
                    Err(e) => (false, e),
                }
            }

            "delete" => {
                let Some(index) = parse_index(args, 0) else {
                    return (false, "usage: delete <index>".to_string());
                };
                match self.store.delete(index) {
                    Ok(game) => (true, format!("deleted '{}'", game.name)),
                    Err(e) => (false, e.to_string()),
                }
            }

            "online" => match self.session.go_online() {
                Ok(()) => (true, String::new()),
                Err(e) => (false, e.to_string()),
            },

            "offline" => match self.session.go_offline() {
                Ok(()) => (true, String::new()),
                Err(e) => (false, e.to_string()),
            },

            "peers" => {
                let lines: Vec<String> = self
                    .session
                    .peers()
                    .iter()
                    .map(|p| format!("{} ({})", p.label, p.id))
                    .collect();
                (true, lines.join("\n"))
            }

            "sync" => {
                let Some(peer) = self.find_peer(args) else {
                    return (false, "usage: sync <peer>".to_string());
                };
                match self.session.request_sync(&peer) {
                    Ok(()) => (true, format!("sync request sent to {}", peer.label())),
                    Err(e) => (false, e.to_string()),
                }
            }

            "accept" | "decline" => {
                let Some(from) = self.find_requester(args) else {
                    return (false, format!("usage: {command} <peer>"));
                };
                match self.session.resolve_sync_request(&from, command == "accept") {
                    Ok(true) => (true, format!("synced with {}", from.label())),
                    Ok(false) => (true, "no sync".to_string()),
                    Err(e) => (false, e.to_string()),
                }
            }

            _ => (false, format!("unknown command: {command}")),
        }
    }

    /// Wholesale board replacement is never relayed, so it is refused while
    /// paired.
    fn refuse_while_paired(&self) -> Option<String> {
        match self.session.state() {
            SyncState::Synced { peer } => Some(format!(
                "synced with {}; go offline before replacing the board",
                peer.label()
            )),
            _ => None,
        }
    }

    /// Resolve a peer by full id or by label.
    fn find_peer(&self, args: &[&str]) -> Option<PeerId> {
        let key = args.first()?;
        self.session
            .peers()
            .iter()
            .find(|p| p.id.0 == *key || p.label == *key)
            .map(|p| p.id.clone())
    }

    fn find_requester(&self, args: &[&str]) -> Option<PeerId> {
        let key = args.first()?;
        self.session
            .pending_requests()
            .iter()
            .find(|r| r.from.0 == *key || r.label == *key)
            .map(|r| r.from.clone())
    }
}

fn parse_index(args: &[&str], i: usize) -> Option<usize> {
    args.get(i)?.parse().ok()
}

/// Render a board with a title line, used by the demo.
pub fn titled(title: &str, board: &Board) -> String {
    format!("{title}\n{board}")
}
