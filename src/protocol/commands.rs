//! Module `command`
//!
//! Parses control lines received by the server into `Command` values and
//! defines the status returned by command handlers.

/// Represents an FTP command parsed from the client input.
///
/// Commands that require arguments store them as `String` variants.
#[derive(Debug, PartialEq)]
pub enum Command {
    QUIT,
    SYST,
    FEAT,
    NOOP,
    PWD,
    CDUP,
    PASV,
    USER(String),
    PASS(String),
    OPTS(String),
    TYPE(String),
    CWD(String),
    MKD(String),
    LIST(Option<String>),
    MLSD(Option<String>),
    RETR(String),
    STOR(String),
    DELE(String),
    UNKNOWN(String),
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Parses a raw command line into the `Command` enum.
///
/// The argument is the remainder of the line after the first space, so file
/// names may contain spaces. A known command missing a required argument
/// parses as `UNKNOWN`.
pub fn parse_command(raw: &str) -> Command {
    let line = raw.trim_end_matches(['\r', '\n']);
    let (cmd, arg) = match line.split_once(' ') {
        Some((cmd, arg)) => (cmd.to_ascii_uppercase(), arg),
        None => (line.trim().to_ascii_uppercase(), ""),
    };
    let optional = || {
        // `LIST -la` style flags are accepted and ignored.
        let arg = arg.trim_start();
        if arg.is_empty() || arg.starts_with('-') {
            None
        } else {
            Some(arg.to_string())
        }
    };

    match cmd.as_str() {
        "QUIT" => Command::QUIT,
        "SYST" => Command::SYST,
        "FEAT" => Command::FEAT,
        "NOOP" => Command::NOOP,
        "PWD" | "XPWD" => Command::PWD,
        "CDUP" | "XCUP" => Command::CDUP,
        "PASV" => Command::PASV,
        "LIST" => Command::LIST(optional()),
        "MLSD" => Command::MLSD(optional()),
        "USER" if !arg.is_empty() => Command::USER(arg.to_string()),
        "PASS" => Command::PASS(arg.to_string()),
        "OPTS" if !arg.is_empty() => Command::OPTS(arg.to_string()),
        "TYPE" if !arg.is_empty() => Command::TYPE(arg.to_string()),
        "CWD" | "XCWD" if !arg.is_empty() => Command::CWD(arg.to_string()),
        "MKD" | "XMKD" if !arg.is_empty() => Command::MKD(arg.to_string()),
        "RETR" if !arg.is_empty() => Command::RETR(arg.to_string()),
        "STOR" if !arg.is_empty() => Command::STOR(arg.to_string()),
        "DELE" if !arg.is_empty() => Command::DELE(arg.to_string()),
        _ => Command::UNKNOWN(cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_keeps_spaces() {
        assert_eq!(
            parse_command("STOR my file.txt\r\n"),
            Command::STOR("my file.txt".into())
        );
    }

    #[test]
    fn test_case_insensitive_verbs() {
        assert_eq!(parse_command("user alice"), Command::USER("alice".into()));
        assert_eq!(parse_command("pwd"), Command::PWD);
    }

    #[test]
    fn test_list_flags_ignored() {
        assert_eq!(parse_command("LIST -la"), Command::LIST(None));
        assert_eq!(parse_command("LIST"), Command::LIST(None));
        assert_eq!(parse_command("MLSD sub dir"), Command::MLSD(Some("sub dir".into())));
    }

    #[test]
    fn test_missing_argument_is_unknown() {
        assert_eq!(parse_command("RETR"), Command::UNKNOWN("RETR".into()));
        assert_eq!(parse_command("BADCMD x"), Command::UNKNOWN("BADCMD".into()));
    }
}
