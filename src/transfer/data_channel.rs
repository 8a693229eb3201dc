//! Module `data_channel`
//!
//! Opens the per-transfer data connection in passive mode: the client sends
//! `PASV`, parses the `(h1,h2,h3,h4,p1,p2)` address and connects to it.
//! Only one data connection exists per session at a time; callers hold the
//! session mutably for the whole transfer.

use log::debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::client::Session;
use crate::error::TransferError;

/// Parse the address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub fn parse_pasv_reply(text: &str) -> Option<SocketAddr> {
    let start = text.find('(')? + 1;
    let end = start + text[start..].find(')')?;
    let numbers: Vec<u8> = text[start..end]
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;
    if numbers.len() != 6 {
        return None;
    }
    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = u16::from(numbers[4]) * 256 + u16::from(numbers[5]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Ask the server for a passive port and connect to it.
pub async fn open_passive(session: &mut Session) -> Result<TcpStream, TransferError> {
    let reply = session.issue("PASV").await?;
    let mut addr = parse_pasv_reply(&reply.message()).ok_or_else(|| {
        TransferError::ConnectionRefused(format!("Cannot parse PASV reply: {}", reply.message()))
    })?;

    // Servers behind NAT sometimes announce an unroutable address.
    if addr.ip().is_unspecified() {
        if let Some(peer) = session.control_peer() {
            addr.set_ip(peer.ip());
        }
    }

    debug!("Opening data connection to {}", addr);
    match tokio::time::timeout(session.connect_timeout(), TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransferError::ConnectionRefused(format!("{}: {}", addr, e))),
        Err(_) => Err(TransferError::ConnectionRefused(format!(
            "{}: timed out",
            addr
        ))),
    }
}

/// Send a data command and check its first reply. Returns whether the
/// closing 2xx is still to come; a server may answer 2xx without a 1xx.
pub(crate) async fn start_data_command(
    session: &mut Session,
    command: &str,
) -> Result<bool, TransferError> {
    let reply = session.send_command(command).await?;
    if reply.is_preliminary() {
        Ok(true)
    } else if reply.is_completion() {
        Ok(false)
    } else {
        Err(TransferError::RemoteRejected {
            code: reply.code,
            message: reply.message(),
        })
    }
}

/// Expect the final 2xx that closes a data command.
pub(crate) async fn finish_data_command(session: &mut Session) -> Result<(), TransferError> {
    let reply = session.read_reply().await?;
    if reply.is_completion() {
        Ok(())
    } else {
        Err(TransferError::RemoteRejected {
            code: reply.code,
            message: reply.message(),
        })
    }
}

/// Run a listing command and return the whole data stream as text decoded
/// with the session encoding.
pub async fn retrieve_text(session: &mut Session, command: &str) -> Result<String, TransferError> {
    let mut stream = open_passive(session).await?;
    let pending = start_data_command(session, command).await?;

    let mut buf = Vec::new();
    let read = stream.read_to_end(&mut buf).await;
    drop(stream);
    if pending {
        finish_data_command(session).await?;
    }
    read.map_err(|e| TransferError::ConnectionRefused(format!("listing read failed: {}", e)))?;

    Ok(session.encoding().decode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pasv_reply() {
        let addr = parse_pasv_reply("Entering Passive Mode (127,0,0,1,8,35).").unwrap();
        assert_eq!(addr, "127.0.0.1:2083".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_parse_pasv_rejects_garbage() {
        assert!(parse_pasv_reply("Entering Passive Mode").is_none());
        assert!(parse_pasv_reply("(127,0,0,1,8)").is_none());
        assert!(parse_pasv_reply("(127,0,0,300,8,35)").is_none());
    }
}
