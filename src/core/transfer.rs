//! Asynchronous copy/move with fractional progress reporting.

use crate::error::{FerryError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// Chunk size for the copy loop (64 KiB).
const CHUNK_SIZE: usize = 64 * 1024;

/// Minimum fraction advance between two progress emissions.
const PROGRESS_STEP: f32 = 0.01;

/// Events emitted by an asynchronous copy or move.
///
/// Zero or more `Progress` values in non-decreasing order, then exactly one
/// `Finished`.
#[derive(Debug)]
pub enum TransferEvent {
    Progress(f32),
    Finished(Result<()>),
}

/// Spawn a copy or move task and hand back its event channel.
///
/// Requires a tokio runtime. There is no cancellation; the task runs to
/// completion or failure.
pub(crate) fn spawn_transfer(
    from: PathBuf,
    to: PathBuf,
    remove_source: bool,
) -> mpsc::Receiver<TransferEvent> {
    let (events, receiver) = mpsc::channel(32);

    tokio::spawn(async move {
        let result = run_transfer(&from, &to, remove_source, &events).await;
        let _ = events.send(TransferEvent::Finished(result)).await;
    });

    receiver
}

async fn run_transfer(
    from: &Path,
    to: &Path,
    remove_source: bool,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<()> {
    let total = tokio::fs::metadata(from)
        .await
        .map_err(|_| FerryError::SourceNotFound {
            path: from.to_path_buf(),
        })?
        .len();

    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut reader = File::open(from).await?;
    let mut writer = File::create(to).await?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    let mut last_sent: f32 = 0.0;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }

        writer.write_all(&buffer[..read]).await?;
        copied += read as u64;

        let fraction = if total > 0 {
            ((copied as f64 / total as f64).min(1.0)) as f32
        } else {
            1.0
        };

        if fraction - last_sent >= PROGRESS_STEP {
            last_sent = fraction;
            let _ = events.send(TransferEvent::Progress(fraction)).await;
        }
    }

    writer.flush().await?;

    // The terminal event is always preceded by a 1.0 progress sample.
    if last_sent < 1.0 {
        let _ = events.send(TransferEvent::Progress(1.0)).await;
    }

    if remove_source {
        tokio::fs::remove_file(from).await?;
    }

    Ok(())
}
