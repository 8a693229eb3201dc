//! FTP Response handling
//!
//! Defines reply codes, the structured `Reply` read by the client, and
//! reply formatting used by the server.

/// Standard FTP response codes
pub const OPENING_DATA: u16 = 150;
pub const OK: u16 = 200;
pub const SYSTEM_STATUS: u16 = 211;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const ENTERING_PASSIVE: u16 = 227;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const SERVICE_UNAVAILABLE: u16 = 421;
pub const CANNOT_OPEN_DATA: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const LOCAL_ERROR: u16 = 451;
pub const UNKNOWN_COMMAND: u16 = 500;
pub const BAD_ARGUMENT: u16 = 501;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const BAD_SEQUENCE: u16 = 503;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;

/// Format an FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Format a multi-line reply: `NNN-first`, body lines, `NNN last`.
pub fn format_multiline(code: u16, first: &str, body: &[String], last: &str) -> String {
    let mut out = format!("{}-{}\r\n", code, first);
    for line in body {
        out.push(' ');
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(&format_response(code, last));
    out
}

/// One complete server reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Parse the code from a reply's first line.
    ///
    /// Returns `None` for lines that do not start with three digits.
    pub fn parse_code(line: &str) -> Option<u16> {
        let digits = line.get(..3)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match line.as_bytes().get(3) {
            None | Some(b' ') | Some(b'-') => digits.parse().ok(),
            Some(_) => None,
        }
    }

    /// Whether `line` opens a multi-line reply (`NNN-`).
    pub fn is_continued(line: &str) -> bool {
        line.as_bytes().get(3) == Some(&b'-')
    }

    /// Whether `line` closes a multi-line reply that started with `code`.
    pub fn is_terminator(line: &str, code: u16) -> bool {
        line.starts_with(&format!("{} ", code)) || line == code.to_string()
    }

    /// 1xx: preliminary, more replies follow.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 1xx, 2xx and 3xx all keep a command on its success path.
    pub fn is_success(&self) -> bool {
        (100..400).contains(&self.code)
    }

    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Text of the reply without the leading codes.
    pub fn message(&self) -> String {
        self.lines
            .iter()
            .map(|l| {
                if Reply::parse_code(l) == Some(self.code) {
                    l.get(4..).unwrap_or("").trim()
                } else {
                    l.trim()
                }
            })
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Body lines of a multi-line reply, without the framing first and last lines.
    pub fn body(&self) -> &[String] {
        if self.lines.len() <= 2 {
            &[]
        } else {
            &self.lines[1..self.lines.len() - 1]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        assert_eq!(Reply::parse_code("220 ready"), Some(220));
        assert_eq!(Reply::parse_code("211-Features:"), Some(211));
        assert_eq!(Reply::parse_code("226"), Some(226));
        assert_eq!(Reply::parse_code("22 short"), None);
        assert_eq!(Reply::parse_code("2200 long"), None);
        assert_eq!(Reply::parse_code(" MLSD"), None);
    }

    #[test]
    fn test_message_and_body() {
        let reply = Reply {
            code: 211,
            lines: vec![
                "211-Features:".into(),
                " MLSD".into(),
                " UTF8".into(),
                "211 End".into(),
            ],
        };
        assert_eq!(reply.body(), &[" MLSD".to_string(), " UTF8".to_string()]);
        assert_eq!(reply.message(), "Features:\nMLSD\nUTF8\nEnd");
        assert!(reply.is_completion());
    }

    #[test]
    fn test_success_classes() {
        let pre = Reply { code: 150, lines: vec!["150 Opening".into()] };
        assert!(pre.is_preliminary() && pre.is_success());
        let denied = Reply { code: 550, lines: vec!["550 No".into()] };
        assert!(!denied.is_success());
    }

    #[test]
    fn test_format_multiline() {
        let text = format_multiline(211, "Features:", &["MLSD".into()], "End");
        assert_eq!(text, "211-Features:\r\n MLSD\r\n211 End\r\n");
    }
}
