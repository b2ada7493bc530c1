//! Board, column and ticket domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the placement engine.
//! - Keep validation of user-provided ticket fields in one place.
//!
//! # Invariants
//! - Every board, column and ticket is identified by a stable UUID.
//! - A ticket belongs to exactly one board and one column at a time.
//! - Ticket deletion is a soft-delete tombstone unless hard delete is asked for.

pub mod board;
pub mod ticket;
