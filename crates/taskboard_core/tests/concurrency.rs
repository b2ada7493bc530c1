use std::path::Path;
use std::thread;
use taskboard_core::db::open_db;
use taskboard_core::placement::index::is_dense;
use taskboard_core::{
    BoardRepository, ColumnId, PlacementEngine, PlacementError, SqliteBoardRepository,
    SqliteTicketStore, TicketDraft, TicketId, TicketStore,
};

const WORKERS: usize = 4;
const MOVES_PER_WORKER: usize = 25;

fn seed_board(path: &Path) -> (Vec<ColumnId>, Vec<TicketId>) {
    let conn = open_db(path).unwrap();
    let boards = SqliteBoardRepository::try_new(&conn).unwrap();
    let board = boards.create_board("Contended", "", "alice").unwrap();
    let columns: Vec<ColumnId> = boards
        .list_columns(board.board_uuid)
        .unwrap()
        .into_iter()
        .map(|column| column.column_uuid)
        .collect();

    let engine = PlacementEngine::new(SqliteTicketStore::try_new(&conn).unwrap());
    let mut tickets = Vec::new();
    for (index, column) in columns.iter().enumerate() {
        for n in 0..4 {
            let draft = TicketDraft::new(board.board_uuid, format!("c{index}-t{n}"), "alice");
            tickets.push(engine.insert(&draft, *column).unwrap().ticket.ticket_uuid);
        }
    }
    (columns, tickets)
}

#[test]
fn concurrent_moves_keep_every_column_dense() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskboard.db");
    let (columns, tickets) = seed_board(&path);

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let path = path.clone();
            let columns = columns.clone();
            let tickets = tickets.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let engine = PlacementEngine::new(SqliteTicketStore::try_new(&conn).unwrap());
                let mut committed = 0usize;
                for step in 0..MOVES_PER_WORKER {
                    let seed = worker * 31 + step * 17;
                    let ticket = tickets[seed % tickets.len()];
                    let column = columns[(seed / 3) % columns.len()];
                    match engine.move_ticket(ticket, column, seed % 5) {
                        Ok(_) => committed += 1,
                        Err(PlacementError::ConcurrencyConflict { .. }) => {}
                        Err(other) => panic!("worker {worker} step {step}: {other}"),
                    }
                }
                committed
            })
        })
        .collect();

    let committed: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .sum();
    assert!(committed > 0);

    let conn = open_db(&path).unwrap();
    let store = SqliteTicketStore::try_new(&conn).unwrap();
    let mut live = 0;
    for column in &columns {
        let slots = store.list_live_slots(*column).unwrap();
        live += slots.len();
        assert!(
            is_dense(slots.iter().map(|slot| slot.position)),
            "column {column} is not dense: {slots:?}"
        );
    }
    assert_eq!(live, tickets.len());
}
