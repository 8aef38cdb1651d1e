//! Constants for board dimensions, relay identities, and storage defaults.
//!
//! # Default Board Size
//!
//! The board size a fresh client starts on is controlled by Cargo features:
//! - `board19x19` (default): 19x19 board
//! - `board13x13`: 13x13 board
//! - `board9x9`: 9x9 board
//!
//! Any size of at least [`MIN_BOARD_SIZE`] can still be selected at runtime;
//! the feature only picks where the registry's current pointer starts.
//!
//! ```sh
//! cargo build                                              # 19x19 (default)
//! cargo build --no-default-features --features board9x9    # 9x9
//! ```

// =============================================================================
// Board Geometry
// =============================================================================

/// Default board size (NxN). Standard Go sizes are 9, 13, or 19.
#[cfg(feature = "board9x9")]
pub const DEFAULT_BOARD_SIZE: usize = 9;

#[cfg(feature = "board13x13")]
pub const DEFAULT_BOARD_SIZE: usize = 13;

#[cfg(feature = "board19x19")]
pub const DEFAULT_BOARD_SIZE: usize = 19;

#[cfg(any(
    all(feature = "board9x9", feature = "board13x13"),
    all(feature = "board9x9", feature = "board19x19"),
    all(feature = "board13x13", feature = "board19x19"),
))]
compile_error!("Enable only one of 'board9x9', 'board13x13' or 'board19x19'");

#[cfg(not(any(feature = "board9x9", feature = "board13x13", feature = "board19x19")))]
compile_error!("Must enable exactly one board size feature: 'board9x9', 'board13x13' or 'board19x19'");

/// Smallest board on which a stone can have a neighbor.
pub const MIN_BOARD_SIZE: usize = 2;

/// Board sizes offered by the console's `size` command listing.
pub const STANDARD_SIZES: [usize; 3] = [9, 13, 19];

// =============================================================================
// Relay Identities
// =============================================================================

/// Length of a relay-assigned connection identifier.
pub const CONNECTION_ID_LEN: usize = 20;

/// Number of leading identifier characters used as a peer's display label.
pub const LABEL_LEN: usize = 4;

/// Address the `relay` subcommand listens on by default.
pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:3000";

// =============================================================================
// Storage
// =============================================================================

/// Saved-game file used when `--save-file` is not given.
pub const DEFAULT_SAVE_FILE: &str = "goban_games.json";
