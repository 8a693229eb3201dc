//! Control-channel line codec.
//!
//! Writes CRLF-terminated commands and reads complete (possibly multi-line)
//! replies, encoding and decoding text with the session's encoding.

use log::trace;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::protocol::{LineRead, Reply, TextEncoding, read_line_bounded};

const MAX_REPLY_LINES: usize = 4096;
const MAX_REPLY_LINE_LENGTH: usize = 8192;

pub struct ControlChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    encoding: TextEncoding,
}

impl ControlChannel {
    pub fn new(stream: TcpStream, encoding: TextEncoding) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            encoding,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn set_encoding(&mut self, encoding: TextEncoding) {
        self.encoding = encoding;
    }

    /// Send one command line; CRLF is appended here.
    pub async fn send(&mut self, line: &str) -> io::Result<()> {
        if line.starts_with("PASS ") {
            trace!(">>> PASS ****");
        } else {
            trace!(">>> {}", line);
        }
        let mut bytes = self.encoding.encode(line);
        bytes.extend_from_slice(b"\r\n");
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await
    }

    async fn read_line(&mut self) -> io::Result<String> {
        let mut buf = Vec::new();
        match read_line_bounded(&mut self.reader, &mut buf, MAX_REPLY_LINE_LENGTH).await? {
            LineRead::Line => {}
            LineRead::TooLong => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Reply line too long",
                ));
            }
            LineRead::Eof => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Server closed the control connection",
                ));
            }
        }
        let text = self.encoding.decode(&buf);
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read one complete reply.
    pub async fn read_reply(&mut self) -> io::Result<Reply> {
        let first = self.read_line().await?;
        let code = Reply::parse_code(&first).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Malformed reply: '{}'", first),
            )
        })?;

        let mut lines = vec![first];
        if Reply::is_continued(&lines[0]) {
            loop {
                let next = self.read_line().await?;
                let done = Reply::is_terminator(&next, code);
                lines.push(next);
                if done {
                    break;
                }
                if lines.len() > MAX_REPLY_LINES {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Multi-line reply never terminated",
                    ));
                }
            }
        }

        let reply = Reply { code, lines };
        trace!("<<< {} {}", reply.code, reply.message());
        Ok(reply)
    }

    /// Send a command and read its first reply.
    pub async fn exchange(&mut self, line: &str) -> io::Result<Reply> {
        self.send(line).await?;
        self.read_reply().await
    }

    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
