use rusqlite::Connection;
use std::cell::RefCell;
use taskboard_core::db::open_db_in_memory;
use taskboard_core::{
    ActivityAction, ActivityEvent, ActivityRecorder, Board, BoardRepository, ColumnId,
    PlacementEngine, PlacementError, RepoError, RepoResult, SqliteActivityRecorder,
    SqliteBoardRepository, SqliteTicketStore, TicketDraft, TicketService, TicketServiceError,
    TicketStore,
};
use uuid::Uuid;

/// Recorder that keeps events in memory, or fails every call.
#[derive(Default)]
struct MemoryRecorder {
    events: RefCell<Vec<ActivityEvent>>,
    failing: bool,
}

impl ActivityRecorder for MemoryRecorder {
    fn record(&self, event: &ActivityEvent) -> RepoResult<()> {
        if self.failing {
            return Err(RepoError::InvalidInput("recorder offline".to_string()));
        }
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn new_board(conn: &Connection) -> (Board, Vec<ColumnId>) {
    let repo = SqliteBoardRepository::try_new(conn).unwrap();
    let board = repo.create_board("Sprint", "", "alice").unwrap();
    repo.add_member(board.board_uuid, "bob").unwrap();
    let columns = repo
        .list_columns(board.board_uuid)
        .unwrap()
        .into_iter()
        .map(|column| column.column_uuid)
        .collect();
    (board, columns)
}

fn service<'a>(
    conn: &'a Connection,
    recorder: &'a MemoryRecorder,
) -> TicketService<SqliteTicketStore<'a>, SqliteBoardRepository<'a>, &'a MemoryRecorder> {
    TicketService::new(
        PlacementEngine::new(SqliteTicketStore::try_new(conn).unwrap()),
        SqliteBoardRepository::try_new(conn).unwrap(),
        recorder,
    )
}

#[test]
fn member_actions_are_recorded_with_metadata() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let recorder = MemoryRecorder::default();
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(board.board_uuid, "Write docs", "ignored");
    let created = service.create_ticket("bob", draft, columns[1]).unwrap();
    assert_eq!(created.ticket.created_by, "bob");

    service
        .move_ticket("bob", created.ticket.ticket_uuid, columns[4], 0)
        .unwrap();
    service
        .remove_ticket("alice", created.ticket.ticket_uuid, true)
        .unwrap();

    let events = recorder.events.borrow();
    let actions: Vec<ActivityAction> = events.iter().map(|event| event.action).collect();
    assert_eq!(
        actions,
        vec![
            ActivityAction::TicketCreate,
            ActivityAction::TicketMove,
            ActivityAction::TicketDelete,
        ]
    );
    assert_eq!(events[0].metadata["column"], columns[1].to_string());
    assert_eq!(events[0].metadata["priority"], "medium");
    assert_eq!(events[1].metadata["fromColumn"], columns[1].to_string());
    assert_eq!(events[1].metadata["toColumn"], columns[4].to_string());
    assert_eq!(events[1].metadata["oldIndex"], 0);
    assert_eq!(events[1].metadata["newIndex"], 0);
    assert_eq!(events[2].actor_id, "alice");
    assert_eq!(events[2].metadata["isHardDelete"], true);
}

#[test]
fn member_hard_remove_falls_back_to_soft_delete() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let recorder = MemoryRecorder::default();
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(board.board_uuid, "Keep history", "bob");
    let created = service.create_ticket("bob", draft, columns[0]).unwrap();
    let ticket_uuid = created.ticket.ticket_uuid;

    let removed = service.remove_ticket("bob", ticket_uuid, true).unwrap();
    assert_eq!(removed.ticket_uuid, ticket_uuid);

    let store = service.engine().store();
    assert!(store.load_ticket(ticket_uuid, false).unwrap().is_none());
    let row = store
        .load_ticket(ticket_uuid, true)
        .unwrap()
        .expect("soft-deleted row should remain");
    assert!(row.deleted_at.is_some());
    assert_eq!(recorder.events.borrow()[1].metadata["isHardDelete"], false);

    service.remove_ticket("alice", ticket_uuid, true).unwrap();
    assert!(store.load_ticket(ticket_uuid, true).unwrap().is_none());
    assert_eq!(recorder.events.borrow()[2].metadata["isHardDelete"], true);
}

#[test]
fn no_op_move_is_not_recorded() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let recorder = MemoryRecorder::default();
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(board.board_uuid, "Stay", "alice");
    let created = service.create_ticket("alice", draft, columns[0]).unwrap();
    service
        .move_ticket("alice", created.ticket.ticket_uuid, columns[0], 0)
        .unwrap();

    assert_eq!(recorder.events.borrow().len(), 1);
}

#[test]
fn outsider_is_forbidden_and_nothing_changes() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let recorder = MemoryRecorder::default();
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(board.board_uuid, "Mine", "alice");
    let created = service.create_ticket("alice", draft, columns[0]).unwrap();
    let before = service
        .engine()
        .store()
        .list_board_tickets(board.board_uuid)
        .unwrap();

    let draft = TicketDraft::new(board.board_uuid, "Intruder", "mallory");
    assert!(matches!(
        service.create_ticket("mallory", draft, columns[0]),
        Err(TicketServiceError::Forbidden { ref actor_id, board_uuid })
            if actor_id == "mallory" && board_uuid == board.board_uuid
    ));
    assert!(matches!(
        service.move_ticket("mallory", created.ticket.ticket_uuid, columns[2], 0),
        Err(TicketServiceError::Forbidden { .. })
    ));
    assert!(matches!(
        service.remove_ticket("mallory", created.ticket.ticket_uuid, false),
        Err(TicketServiceError::Forbidden { .. })
    ));
    assert!(matches!(
        service.resync_statuses("mallory", board.board_uuid),
        Err(TicketServiceError::Forbidden { .. })
    ));

    let after = service
        .engine()
        .store()
        .list_board_tickets(board.board_uuid)
        .unwrap();
    assert_eq!(after, before);
    assert_eq!(recorder.events.borrow().len(), 1);
}

#[test]
fn unknown_board_and_ticket_are_not_found() {
    let conn = setup();
    let (_, columns) = new_board(&conn);
    let recorder = MemoryRecorder::default();
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(Uuid::new_v4(), "Lost", "alice");
    assert!(matches!(
        service.create_ticket("alice", draft, columns[0]),
        Err(TicketServiceError::Placement(PlacementError::BoardNotFound(_)))
    ));
    assert!(matches!(
        service.move_ticket("alice", Uuid::new_v4(), columns[0], 0),
        Err(TicketServiceError::Placement(PlacementError::TicketNotFound(_)))
    ));
}

#[test]
fn recorder_failure_does_not_fail_placement() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let recorder = MemoryRecorder {
        failing: true,
        ..MemoryRecorder::default()
    };
    let service = service(&conn, &recorder);

    let draft = TicketDraft::new(board.board_uuid, "Resilient", "alice");
    let created = service.create_ticket("alice", draft, columns[0]).unwrap();
    let moved = service
        .move_ticket("alice", created.ticket.ticket_uuid, columns[3], 0)
        .unwrap();

    assert_eq!(moved.ticket.column_uuid, columns[3]);
    assert_eq!(service.column_tickets(columns[3]).unwrap().len(), 1);
}

#[test]
fn sqlite_recorder_persists_events_through_shared_collaborators() {
    let conn = setup();
    let (board, columns) = new_board(&conn);
    let boards = SqliteBoardRepository::try_new(&conn).unwrap();
    let log = SqliteActivityRecorder::try_new(&conn).unwrap();
    let service = TicketService::new(
        PlacementEngine::new(SqliteTicketStore::try_new(&conn).unwrap()),
        &boards,
        &log,
    );

    let draft = TicketDraft::new(board.board_uuid, "Logged", "alice");
    let created = service.create_ticket("alice", draft, columns[0]).unwrap();
    service
        .move_ticket("alice", created.ticket.ticket_uuid, columns[1], 0)
        .unwrap();

    assert_eq!(boards.list_columns(board.board_uuid).unwrap().len(), columns.len());
    let events = log.list_for_board(board.board_uuid, 10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, ActivityAction::TicketMove);
    assert_eq!(events[0].entity_id, created.ticket.ticket_uuid);
    assert_eq!(events[0].metadata["toColumn"], columns[1].to_string());
    assert_eq!(events[1].action, ActivityAction::TicketCreate);
}
