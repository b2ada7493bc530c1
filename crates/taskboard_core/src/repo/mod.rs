//! Repository layer over SQLite.
//!
//! # Responsibility
//! - Board, column and ticket persistence behind traits the services consume.
//! - Apply planned mutation sets with the consistency the store can offer.

pub mod board_repo;
pub mod error;
pub(crate) mod rows;
pub mod ticket_repo;
