//! Logging for the taskboard: the file sink and the placement event lines.
//!
//! # Responsibility
//! - Start one size-rotated file sink per process from [`LoggingConfig`].
//! - Format placement outcomes, retries and fallbacks as `event=... module=...`
//!   key/value lines so they can be grepped per ticket or column.
//! - Capture panics as sanitized `panic_captured` events.
//!
//! # Invariants
//! - Placement lines carry ids, positions and consistency levels; never
//!   ticket titles or descriptions.
//! - Starting the sink twice with the same settings is a no-op; different
//!   settings are rejected.
//! - Nothing here panics.

use crate::config::LoggingConfig;
use crate::model::board::BoardId;
use crate::model::ticket::{Ticket, TicketId};
use crate::placement::{Placed, PlacementError, PlacementResult};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info, warn, Level};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOG_FILE_BASENAME: &str = "taskboard";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static FILE_SINK: OnceCell<FileSink> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct FileSink {
    level: &'static str,
    dir: PathBuf,
    _handle: LoggerHandle,
}

/// Starts the file sink described by `config`.
///
/// Returns `Ok(false)` without side effects when no directory is configured.
/// A relative directory is resolved against the working directory.
///
/// # Errors
/// - The level is not one of `trace|debug|info|warn|error`.
/// - The directory cannot be created or the logger backend fails to start.
/// - A sink is already running with a different level or directory.
pub fn init_from_config(config: &LoggingConfig) -> Result<bool, String> {
    let Some(dir) = config.dir.as_deref() else {
        return Ok(false);
    };
    let level = parse_level(&config.level)?;
    let dir = resolve_dir(dir)?;

    let sink = FILE_SINK.get_or_try_init(|| start_file_sink(level, &dir))?;
    if sink.dir != dir || sink.level != level {
        return Err(format!(
            "logging already writes `{}` to `{}`; refusing to switch to `{}` at `{}`",
            sink.level,
            sink.dir.display(),
            level,
            dir.display()
        ));
    }
    Ok(true)
}

/// Level used when the configuration does not name one.
pub(crate) fn default_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_file_sink(level: &'static str, dir: &Path) -> Result<FileSink, String> {
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("failed to create log directory `{}`: {err}", dir.display()))?;

    let handle = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    PANIC_HOOK.get_or_init(install_panic_hook);
    info!(
        "event=taskboard_start module=logging status=ok version={} platform={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        level,
        dir.display()
    );

    Ok(FileSink {
        level,
        dir: dir.to_path_buf(),
        _handle: handle,
    })
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn resolve_dir(dir: &Path) -> Result<PathBuf, String> {
    if dir.as_os_str().is_empty() {
        return Err("log dir cannot be empty".to_string());
    }
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(dir))
        .map_err(|err| format!("cannot resolve log dir `{}`: {err}", dir.display()))
}

/// Placement operations that report an outcome line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlacementOp {
    Insert,
    Move,
}

impl PlacementOp {
    fn event(self) -> &'static str {
        match self {
            Self::Insert => "ticket_insert",
            Self::Move => "ticket_move",
        }
    }
}

/// Logs the result of an insert or move.
///
/// Degraded failures are errors; every other failure is a warning.
pub(crate) fn placement_outcome(
    op: PlacementOp,
    ticket_uuid: TicketId,
    result: &PlacementResult<Placed>,
    elapsed: Duration,
) {
    let (level, line) = outcome_line(op, ticket_uuid, result, elapsed);
    log::log!(level, "{line}");
}

fn outcome_line(
    op: PlacementOp,
    ticket_uuid: TicketId,
    result: &PlacementResult<Placed>,
    elapsed: Duration,
) -> (Level, String) {
    let duration_ms = elapsed.as_millis();
    match result {
        Ok(placed) => (
            Level::Info,
            format!(
                "event={} module=placement status=ok ticket={} column={} position={} consistency={} duration_ms={}",
                op.event(),
                ticket_uuid,
                placed.ticket.column_uuid,
                placed.ticket.position,
                placed.consistency.as_str(),
                duration_ms
            ),
        ),
        Err(err) => {
            let level = match err {
                PlacementError::DegradedConsistency { .. } => Level::Error,
                _ => Level::Warn,
            };
            (
                level,
                format!(
                    "event={} module=placement status=error ticket={} duration_ms={} error={}",
                    op.event(),
                    ticket_uuid,
                    duration_ms,
                    err
                ),
            )
        }
    }
}

/// Logs a retry after a concurrent change to `columns` columns.
pub(crate) fn placement_retry(
    op: PlacementOp,
    ticket_uuid: TicketId,
    columns: usize,
    attempt: u32,
) {
    warn!(
        "event={} module=placement status=retry ticket={} columns={} attempt={}",
        op.event(),
        ticket_uuid,
        columns,
        attempt
    );
}

/// Logs the switch to row-by-row writes.
pub(crate) fn placement_fallback(ticket_uuid: TicketId, writes: usize) {
    warn!(
        "event=placement_fallback module=placement status=start ticket={} writes={}",
        ticket_uuid, writes
    );
}

pub(crate) fn ticket_removed(ticket: &Ticket, hard: bool) {
    info!(
        "event=ticket_remove module=placement status=ok ticket={} column={} position={} hard={}",
        ticket.ticket_uuid, ticket.column_uuid, ticket.position, hard
    );
}

pub(crate) fn statuses_resynced(board_uuid: BoardId, changed: usize) {
    info!(
        "event=status_resync module=placement status=ok board={} changed={}",
        board_uuid, changed
    );
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            panic_payload_summary(panic_info)
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut truncated: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
