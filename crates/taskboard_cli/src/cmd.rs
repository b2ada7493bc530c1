//! Command handlers.

use crate::{BoardCommands, Cli, ColumnCommands, Commands, TicketCommands};
use anyhow::{anyhow, Context, Result};
use log::info;
use taskboard_core::{
    init_from_config, open_db_with_timeout, BoardRepository, CoreConfig, PlacementEngine,
    SqliteActivityRecorder, SqliteBoardRepository, SqliteTicketStore, Ticket, TicketDraft,
    TicketService,
};

type Service<'a, 'conn> = TicketService<
    SqliteTicketStore<'conn>,
    &'a SqliteBoardRepository<'conn>,
    &'a SqliteActivityRecorder<'conn>,
>;

pub fn run(cli: &Cli) -> Result<()> {
    if let Commands::Ping = cli.command {
        println!("taskboard_core ping={}", taskboard_core::ping());
        println!("taskboard_core version={}", taskboard_core::core_version());
        return Ok(());
    }

    let mut config = CoreConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    init_from_config(&config.logging).map_err(|err| anyhow!(err))?;

    let conn = open_db_with_timeout(&config.database.path, config.database.busy_timeout())
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    info!(
        "event=cli_command module=cli status=start actor={} write_mode={}",
        cli.actor,
        config.database.write_mode.as_str()
    );

    let boards = SqliteBoardRepository::try_new(&conn)?;
    let activity = SqliteActivityRecorder::try_new(&conn)?;
    let service: Service<'_, '_> = TicketService::new(
        PlacementEngine::new(
            SqliteTicketStore::try_new(&conn)?.with_write_mode(config.database.write_mode),
        ),
        &boards,
        &activity,
    );

    match &cli.command {
        Commands::Ping => {}
        Commands::Board { command } => run_board(cli, &boards, &activity, &service, command)?,
        Commands::Column { command } => run_column(&boards, command)?,
        Commands::Ticket { command } => run_ticket(cli, &service, command)?,
    }
    Ok(())
}

fn run_board(
    cli: &Cli,
    boards: &SqliteBoardRepository<'_>,
    activity: &SqliteActivityRecorder<'_>,
    service: &Service<'_, '_>,
    command: &BoardCommands,
) -> Result<()> {
    match command {
        BoardCommands::Create { title, description } => {
            let board = boards.create_board(title, description, &cli.actor)?;
            println!("{}\t{}", board.board_uuid, board.title);
        }
        BoardCommands::Show { board } => {
            let loaded = boards
                .get_board(*board)?
                .ok_or_else(|| anyhow!("board not found: {board}"))?;
            println!("{}\t{}\towner={}", loaded.board_uuid, loaded.title, loaded.owner_id);
            for column in boards.list_columns(*board)? {
                println!("[{}] {}", column.column_uuid, column.title);
                for ticket in service.column_tickets(column.column_uuid)? {
                    print_ticket(&ticket);
                }
            }
        }
        BoardCommands::AddMember { board, member } => {
            boards.add_member(*board, member)?;
        }
        BoardCommands::Resync { board } => {
            let changed = service.resync_statuses(&cli.actor, *board)?;
            println!("{changed} ticket(s) updated");
        }
        BoardCommands::Activity { board, limit } => {
            for event in activity.list_for_board(*board, *limit)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    event.action.as_str(),
                    event.actor_id,
                    event.entity_id,
                    serde_json::to_string(&event.metadata)?
                );
            }
        }
        BoardCommands::Delete { board } => {
            let loaded = boards
                .get_board(*board)?
                .ok_or_else(|| anyhow!("board not found: {board}"))?;
            if loaded.owner_id != cli.actor {
                return Err(anyhow!("only the owner may delete board {board}"));
            }
            boards.delete_board(*board)?;
        }
    }
    Ok(())
}

fn run_column(boards: &SqliteBoardRepository<'_>, command: &ColumnCommands) -> Result<()> {
    match command {
        ColumnCommands::Add { board, title } => {
            let column = boards.add_column(*board, title)?;
            println!("{}\t{}\t{}", column.column_uuid, column.position, column.title);
        }
        ColumnCommands::Rename { column, title } => {
            boards.rename_column(*column, title)?;
        }
    }
    Ok(())
}

fn run_ticket(cli: &Cli, service: &Service<'_, '_>, command: &TicketCommands) -> Result<()> {
    match command {
        TicketCommands::Add {
            board,
            column,
            title,
            description,
            priority,
        } => {
            let draft = TicketDraft::new(*board, title.as_str(), cli.actor.as_str())
                .with_description(description.as_str())
                .with_priority(*priority);
            let placed = service.create_ticket(&cli.actor, draft, *column)?;
            print_ticket(&placed.ticket);
        }
        TicketCommands::Move {
            ticket,
            column,
            index,
        } => {
            let placed = service.move_ticket(&cli.actor, *ticket, *column, *index)?;
            print_ticket(&placed.ticket);
            println!("consistency={}", placed.consistency.as_str());
        }
        TicketCommands::Rm { ticket, hard } => {
            let removed = service.remove_ticket(&cli.actor, *ticket, *hard)?;
            println!("removed {}", removed.ticket_uuid);
        }
        TicketCommands::List { column } => {
            for ticket in service.column_tickets(*column)? {
                print_ticket(&ticket);
            }
        }
    }
    Ok(())
}

fn print_ticket(ticket: &Ticket) {
    println!(
        "  {:>3}  {}  {:<11}  {:<6}  {}",
        ticket.position,
        ticket.ticket_uuid,
        ticket.status.as_str(),
        ticket.priority.as_str(),
        ticket.title
    );
}
