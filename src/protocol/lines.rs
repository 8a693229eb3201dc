//! Bounded line reading for control connections. Neither side buffers more
//! than `limit` bytes for one line, whatever the peer sends.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Result of one bounded line read.
#[derive(Debug, PartialEq)]
pub enum LineRead {
    /// A line (with its terminator, if the peer sent one) is in the buffer.
    Line,
    /// The line exceeded the limit. It was consumed and discarded.
    TooLong,
    /// The peer closed the connection.
    Eof,
}

/// Read one `\n`-terminated line of at most `limit` bytes into `line`.
pub async fn read_line_bounded<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let n = (&mut *reader).take(limit as u64).read_until(b'\n', line).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if line.ends_with(b"\n") || n < limit {
        return Ok(LineRead::Line);
    }

    // Drop the rest of the overlong line, one bounded chunk at a time.
    loop {
        line.clear();
        let n = (&mut *reader).take(limit as u64).read_until(b'\n', line).await?;
        if n == 0 || line.ends_with(b"\n") {
            break;
        }
    }
    line.clear();
    Ok(LineRead::TooLong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_lines_within_limit() {
        let mut reader = BufReader::new(&b"USER a\r\nPASS b\r\n"[..]);
        let mut line = Vec::new();

        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), LineRead::Line);
        assert_eq!(line, b"USER a\r\n");
        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), LineRead::Line);
        assert_eq!(line, b"PASS b\r\n");
        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), LineRead::Eof);
    }

    #[tokio::test]
    async fn test_overlong_line_is_discarded() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\r\nNOOP\r\n");
        let mut reader = BufReader::new(&input[..]);
        let mut line = Vec::new();

        assert_eq!(
            read_line_bounded(&mut reader, &mut line, 16).await.unwrap(),
            LineRead::TooLong
        );
        assert!(line.is_empty());
        assert_eq!(read_line_bounded(&mut reader, &mut line, 16).await.unwrap(), LineRead::Line);
        assert_eq!(line, b"NOOP\r\n");
    }

    #[tokio::test]
    async fn test_unterminated_stream_stays_bounded() {
        let input = vec![b'x'; 10_000];
        let mut reader = BufReader::new(&input[..]);
        let mut line = Vec::new();

        assert_eq!(
            read_line_bounded(&mut reader, &mut line, 512).await.unwrap(),
            LineRead::TooLong
        );
        assert!(line.capacity() < 10_000);
        assert_eq!(read_line_bounded(&mut reader, &mut line, 512).await.unwrap(), LineRead::Eof);
    }

    #[tokio::test]
    async fn test_last_line_without_terminator() {
        let mut reader = BufReader::new(&b"QUIT"[..]);
        let mut line = Vec::new();
        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), LineRead::Line);
        assert_eq!(line, b"QUIT");
    }
}
