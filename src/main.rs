//! goban-sync: two-player Go with board synchronization between peers.
//!
//! ## Usage
//!
//! - `goban-sync` / `goban-sync play` - Interactive console
//! - `goban-sync --relay <addr> play` - Console connected to a TCP relay
//! - `goban-sync relay [--bind <addr>]` - Run the relay other clients join
//! - `goban-sync demo` - Two clients pair over an in-process relay and play

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;

use goban_sync::board::MoveOutcome;
use goban_sync::console::{Console, ConsoleObserver, titled};
use goban_sync::constants::{
    DEFAULT_BOARD_SIZE, DEFAULT_RELAY_ADDR, DEFAULT_SAVE_FILE, MIN_BOARD_SIZE,
};
use goban_sync::net::{TcpTransport, start_relay};
use goban_sync::registry::BoardRegistry;
use goban_sync::relay::{LocalRelay, LocalTransport};
use goban_sync::storage::GameStore;
use goban_sync::sync::{PendingRequest, SyncCoordinator, SyncObserver, SyncState};
use goban_sync::transport::Transport;

/// goban-sync: Go with peer-to-peer board synchronization
#[derive(Parser)]
#[command(name = "goban-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Board size to start on
    #[arg(long, default_value_t = DEFAULT_BOARD_SIZE)]
    size: usize,

    /// File holding saved games
    #[arg(long, default_value = DEFAULT_SAVE_FILE)]
    save_file: String,

    /// Relay to connect to (host:port); without it the console stays local
    #[arg(long)]
    relay: Option<String>,

    /// Log protocol traffic
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play from the terminal
    Play,
    /// Run two synced clients through a short game
    Demo,
    /// Run a relay for networked clients
    Relay {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_RELAY_ADDR)]
        bind: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.size < MIN_BOARD_SIZE {
        bail!("board size must be at least {MIN_BOARD_SIZE}, got {}", cli.size);
    }

    match cli.command {
        Some(Commands::Demo) => run_demo(cli.size),
        Some(Commands::Relay { ref bind }) => run_relay(bind),
        Some(Commands::Play) | None => match &cli.relay {
            Some(addr) => run_console(&cli, TcpTransport::new(addr.as_str())),
            // Without a relay, `online` only ever sees this client.
            None => run_console(&cli, LocalRelay::new().transport()),
        },
    }
}

fn run_console<T: Transport>(cli: &Cli, transport: T) -> Result<()> {
    let registry = BoardRegistry::new(cli.size).context("creating board")?;
    let session = SyncCoordinator::new(transport, ConsoleObserver::default(), registry);
    let mut console = Console::new(session, GameStore::new(&cli.save_file));
    console.run().context("console I/O failed")
}

fn run_relay(bind: &str) -> Result<()> {
    let (handle, addr) =
        start_relay(bind).with_context(|| format!("could not listen on {bind}"))?;
    println!("Relay listening on {addr}");
    handle.wait();
    Ok(())
}

/// Accepts every sync request immediately.
struct AutoAccept;

impl SyncObserver for AutoAccept {
    fn sync_requested(&mut self, request: &PendingRequest) -> Option<bool> {
        println!("{} asked to sync, accepting", request.label);
        Some(true)
    }
}

type DemoClient = SyncCoordinator<LocalTransport, AutoAccept>;

fn pump_all(clients: &mut [&mut DemoClient]) {
    // Enough rounds for request, accept and final ack to settle.
    for _ in 0..3 {
        for c in clients.iter_mut() {
            c.pump();
        }
    }
}

fn run_demo(size: usize) -> Result<()> {
    println!("goban-sync demo\n");
    let relay = LocalRelay::new();
    let mut alice: DemoClient =
        SyncCoordinator::new(relay.transport(), AutoAccept, BoardRegistry::new(size)?);
    let mut bob: DemoClient =
        SyncCoordinator::new(relay.transport(), AutoAccept, BoardRegistry::new(size)?);

    alice.go_online()?;
    bob.go_online()?;
    pump_all(&mut [&mut alice, &mut bob]);

    let bob_id = bob.me().context("bob has no identity")?.id.clone();
    alice.request_sync(&bob_id)?;
    pump_all(&mut [&mut alice, &mut bob]);
    if !matches!(alice.state(), SyncState::Synced { .. }) {
        bail!("pairing failed, alice is {}", alice.state());
    }
    info!("demo: alice {} / bob {}", alice.state(), bob.state());

    let center = size / 2;
    let script = [
        (0, center, center),
        (1, center, center.saturating_sub(1)),
        (0, center.saturating_sub(1), center),
    ];
    for (who, row, col) in script {
        let player = if who == 0 { &mut alice } else { &mut bob };
        match player.play(row, col)? {
            MoveOutcome::Placed { mv, .. } => {
                println!("{} plays ({row}, {col})", mv.stone.name())
            }
            MoveOutcome::Undone(mv) => println!("{} takes back ({row}, {col})", mv.stone.name()),
        }
        pump_all(&mut [&mut alice, &mut bob]);
    }

    println!("{}", titled("Alice sees:", alice.board()));
    println!("{}", titled("Bob sees:", bob.board()));
    if alice.board() != bob.board() {
        bail!("boards diverged");
    }
    println!("Boards agree.");
    Ok(())
}
