//! Module `file_ops`
//!
//! Moves one file's bytes over a data connection in either direction.
//! Local read/write errors never leave the control channel out of step: the
//! data connection is dropped and the closing reply is still consumed.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::Session;
use crate::error::TransferError;
use crate::transfer::data_channel::{finish_data_command, open_passive, start_data_command};

const BUFFER_SIZE: usize = 8192;

/// Where a streaming loop stopped early.
enum StreamFailure {
    Local(std::io::Error),
    Data(std::io::Error),
}

/// Upload everything `reader` yields to `remote_path` (STOR).
pub async fn send_file<R>(
    session: &mut Session,
    remote_path: &str,
    reader: &mut R,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut data = open_passive(session).await?;
    let pending = start_data_command(session, &format!("STOR {}", remote_path)).await?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes_sent = 0u64;
    let outcome = loop {
        let n = match reader.read(&mut buffer).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(StreamFailure::Local(e)),
        };
        if let Err(e) = data.write_all(&buffer[..n]).await {
            break Err(StreamFailure::Data(e));
        }
        total_bytes_sent += n as u64;
    };

    match &outcome {
        Ok(()) => {
            // Closing our write side is the end-of-file marker.
            if let Err(e) = data.shutdown().await {
                debug!("Data connection shutdown for {} failed: {}", remote_path, e);
            }
        }
        Err(_) => {
            // A plain close would look like a complete file; reset instead.
            if let Err(e) = data.set_linger(Some(Duration::ZERO)) {
                debug!("Cannot reset data connection for {}: {}", remote_path, e);
            }
        }
    }
    drop(data);

    let finished = if pending {
        finish_data_command(session).await
    } else {
        Ok(())
    };
    settle(outcome, finished)?;

    info!("Uploaded {} ({} bytes)", remote_path, total_bytes_sent);
    Ok(total_bytes_sent)
}

/// Download `remote_path` (RETR) into `writer`. Bytes already written stay
/// written if the transfer fails.
pub async fn receive_file<W>(
    session: &mut Session,
    remote_path: &str,
    writer: &mut W,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut data = open_passive(session).await?;
    let pending = start_data_command(session, &format!("RETR {}", remote_path)).await?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes_received = 0u64;
    let mut outcome = loop {
        let n = match data.read(&mut buffer).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(StreamFailure::Data(e)),
        };
        if let Err(e) = writer.write_all(&buffer[..n]).await {
            break Err(StreamFailure::Local(e));
        }
        total_bytes_received += n as u64;
    };
    if outcome.is_ok() {
        if let Err(e) = writer.flush().await {
            outcome = Err(StreamFailure::Local(e));
        }
    }
    drop(data);

    let finished = if pending {
        finish_data_command(session).await
    } else {
        Ok(())
    };
    settle(outcome, finished)?;

    info!("Downloaded {} ({} bytes)", remote_path, total_bytes_received);
    Ok(total_bytes_received)
}

/// Combine the streaming outcome with the closing reply. A lost control
/// connection wins over everything; a local failure wins over the reply.
fn settle(
    outcome: Result<(), StreamFailure>,
    finished: Result<(), TransferError>,
) -> Result<(), TransferError> {
    match (outcome, finished) {
        (_, Err(e)) if e.is_fatal() => Err(e),
        (Err(StreamFailure::Local(e)), _) => Err(TransferError::Io(e)),
        (Err(StreamFailure::Data(e)), Ok(())) => Err(TransferError::Io(e)),
        (_, Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Upload a local file.
pub async fn upload_path(
    session: &mut Session,
    local: &Path,
    remote_path: &str,
) -> Result<u64, TransferError> {
    let mut file = File::open(local).await.map_err(TransferError::Io)?;
    send_file(session, remote_path, &mut file).await
}

/// Download into a local file. With `atomic`, bytes go to a hidden `.part`
/// sibling that is renamed over `local` only after the server confirms the
/// transfer, and removed on failure.
pub async fn download_path(
    session: &mut Session,
    remote_path: &str,
    local: &Path,
    atomic: bool,
) -> Result<u64, TransferError> {
    let target = if atomic {
        partial_path(local)
    } else {
        local.to_path_buf()
    };

    let mut file = File::create(&target).await.map_err(TransferError::Io)?;
    let result = receive_file(session, remote_path, &mut file).await;
    drop(file);

    if !atomic {
        return result;
    }
    match result {
        Ok(bytes) => {
            fs::rename(&target, local).await.map_err(TransferError::Io)?;
            Ok(bytes)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&target).await {
                warn!("Could not remove partial file {}: {}", target.display(), rm);
            }
            Err(e)
        }
    }
}

fn partial_path(local: &Path) -> PathBuf {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!(".{}.part", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let p = partial_path(Path::new("/tmp/out/report.pdf"));
        assert_eq!(p, PathBuf::from("/tmp/out/.report.pdf.part"));
    }

    #[test]
    fn test_settle_prefers_local_error_over_reply() {
        let local = StreamFailure::Local(io::Error::new(io::ErrorKind::Other, "disk full"));
        let reply = Err(TransferError::RemoteRejected {
            code: 426,
            message: "aborted".into(),
        });
        assert!(matches!(settle(Err(local), reply), Err(TransferError::Io(_))));
    }

    #[test]
    fn test_settle_reports_rejection() {
        let reply = Err(TransferError::RemoteRejected {
            code: 552,
            message: "quota".into(),
        });
        assert!(matches!(
            settle(Ok(()), reply),
            Err(TransferError::RemoteRejected { code: 552, .. })
        ));
    }
}
