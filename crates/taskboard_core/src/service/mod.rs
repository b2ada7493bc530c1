//! Use-case services above the placement engine.

pub mod ticket_service;
