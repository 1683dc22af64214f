//! Log ingestion -- turns input lines into classification tasks.
//!
//! Each non-empty line is either a JSON object (`message` required;
//! `id`, `level`, `service`, `timestamp`, `metadata` optional) or plain
//! text used as the message. Records are submitted to the scheduler with
//! a priority derived from the log level.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use logwarden_core::types::{LogLevel, LogRecord};
use logwarden_scheduler::{SchedulerError, TaskPriority, TaskRequest, TaskSubmitter};

/// Task type handled by the classification handler.
pub const CLASSIFY_TASK: &str = "classify";

/// Lines longer than this are skipped.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct IncomingLog {
    #[serde(default)]
    id: Option<String>,
    message: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// Parse one input line. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<LogRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('{') {
        return Ok(Some(LogRecord::new(uuid::Uuid::new_v4().to_string(), line)));
    }

    let incoming: IncomingLog =
        serde_json::from_str(line).map_err(|e| anyhow::anyhow!("invalid JSON log line: {e}"))?;
    Ok(Some(LogRecord {
        id: incoming
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        message: incoming.message,
        level: incoming.level.as_deref().and_then(LogLevel::from_str_loose),
        service: incoming.service,
        timestamp: incoming.timestamp.unwrap_or_else(Utc::now),
        metadata: incoming.metadata,
    }))
}

/// Scheduling priority for a record: errors first, chatter last.
pub fn priority_for(level: Option<LogLevel>) -> TaskPriority {
    match level {
        Some(LogLevel::Fatal | LogLevel::Error) => TaskPriority::High,
        Some(LogLevel::Warn) | None => TaskPriority::Normal,
        Some(LogLevel::Info | LogLevel::Debug | LogLevel::Trace) => TaskPriority::Low,
    }
}

/// Build the scheduler request for a record.
pub fn to_request(record: &LogRecord) -> Result<TaskRequest> {
    let payload = serde_json::to_value(record)?;
    Ok(TaskRequest::new(
        CLASSIFY_TASK,
        priority_for(record.level),
        payload,
    ))
}

/// One line read from the input, before parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum InputLine {
    /// Valid UTF-8 line without its terminator.
    Text(String),
    /// Line that is not valid UTF-8.
    InvalidUtf8,
    /// Line longer than [`MAX_LINE_LENGTH`]; the excess was discarded unread.
    Oversized,
}

/// Read the next line from `reader`, buffering at most
/// [`MAX_LINE_LENGTH`] bytes of it. Returns `Ok(None)` at end of input.
pub async fn read_line_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<InputLine>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = (MAX_LINE_LENGTH + 1) as u64;
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read > MAX_LINE_LENGTH {
        discard_until_newline(reader).await?;
        return Ok(Some(InputLine::Oversized));
    }

    Ok(Some(match String::from_utf8(std::mem::take(buf)) {
        Ok(line) => InputLine::Text(line),
        Err(_) => InputLine::InvalidUtf8,
    }))
}

/// Skip the rest of the current line without buffering it.
async fn discard_until_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (newline, available) = {
            let chunk = reader.fill_buf().await?;
            (chunk.iter().position(|b| *b == b'\n'), chunk.len())
        };
        match newline {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None if available == 0 => return Ok(()),
            None => reader.consume(available),
        }
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records submitted to the scheduler.
    pub submitted: u64,
    /// Lines that were too long, not UTF-8, or could not be parsed.
    pub skipped: u64,
}

/// Spawn a task that reads lines until EOF or shutdown and submits them.
pub fn spawn_ingest<R>(
    reader: R,
    submitter: TaskSubmitter,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<IngestReport>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = Vec::new();
        let mut report = IngestReport::default();

        loop {
            let line = tokio::select! {
                line = read_line_bounded(&mut reader, &mut buf) => line,
                _ = shutdown_rx.recv() => {
                    tracing::debug!("ingest task shutting down");
                    break;
                }
            };
            let line = match line {
                Ok(Some(InputLine::Text(line))) => line,
                Ok(Some(InputLine::InvalidUtf8)) => {
                    tracing::warn!("skipping log line that is not valid UTF-8");
                    report.skipped += 1;
                    continue;
                }
                Ok(Some(InputLine::Oversized)) => {
                    tracing::warn!(max = MAX_LINE_LENGTH, "skipping oversized log line");
                    report.skipped += 1;
                    continue;
                }
                Ok(None) => {
                    tracing::info!("log input reached end of stream");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read log input");
                    break;
                }
            };
            let record = match parse_line(&line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable log line");
                    report.skipped += 1;
                    continue;
                }
            };
            let request = match to_request(&record) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(log_id = %record.id, error = %e, "failed to encode log record");
                    report.skipped += 1;
                    continue;
                }
            };

            match submitter.submit(request) {
                Ok(task_id) => {
                    report.submitted += 1;
                    tracing::trace!(log_id = %record.id, task_id = %task_id, "log submitted");
                }
                Err(SchedulerError::ShuttingDown) => {
                    tracing::debug!("scheduler no longer accepting tasks, stopping ingest");
                    break;
                }
                Err(e) => {
                    tracing::warn!(log_id = %record.id, error = %e, "failed to submit log");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            submitted = report.submitted,
            skipped = report.skipped,
            "log ingestion finished"
        );
        report
    })
}
