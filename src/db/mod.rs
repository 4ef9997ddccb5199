//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: row slices written and read by the leaderboard sync.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `golf_leaderboard::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{entries_from_roster, LeaderboardEntryRow};
