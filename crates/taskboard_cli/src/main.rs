//! Command-line front end for a local taskboard database.
//!
//! # Responsibility
//! - Parse commands and map them onto board repository and ticket service calls.
//! - Load configuration and start file logging before touching the database.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskboard_core::Priority;
use uuid::Uuid;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Kanban board with dense ticket ordering")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "TASKBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file. Overrides the configured path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor performing the command
    #[arg(long, global = true, env = "TASKBOARD_ACTOR", default_value = "local")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print core health and version
    Ping,
    /// Manage boards
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Manage columns
    Column {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Create, move, remove and list tickets
    Ticket {
        #[command(subcommand)]
        command: TicketCommands,
    },
}

#[derive(Subcommand)]
pub enum BoardCommands {
    /// Create a board owned by the actor, with the default columns
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show a board with its columns and tickets
    Show { board: Uuid },
    /// Allow another actor to modify the board
    AddMember { board: Uuid, member: String },
    /// Re-derive ticket statuses from the current column titles
    Resync { board: Uuid },
    /// Show recent activity
    Activity {
        board: Uuid,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Delete a board with all its columns and tickets
    Delete { board: Uuid },
}

#[derive(Subcommand)]
pub enum ColumnCommands {
    /// Append a column to a board
    Add { board: Uuid, title: String },
    /// Rename a column. Run `board resync` to update ticket statuses.
    Rename { column: Uuid, title: String },
}

#[derive(Subcommand)]
pub enum TicketCommands {
    /// Create a ticket at the end of a column
    Add {
        board: Uuid,
        column: Uuid,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "medium", value_parser = parse_priority)]
        priority: Priority,
    },
    /// Move a ticket to an index of a column
    Move {
        ticket: Uuid,
        column: Uuid,
        index: usize,
    },
    /// Remove a ticket
    Rm {
        ticket: Uuid,
        /// Erase the row instead of soft-deleting it
        #[arg(long)]
        hard: bool,
    },
    /// List live tickets of a column in order
    List { column: Uuid },
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    Priority::parse(value).ok_or_else(|| format!("unknown priority `{value}`; expected low|medium|high"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cmd::run(&cli)
}
