//! FTP Protocol implementation
//!
//! Command parsing, reply codes and the control-channel text encoding
//! shared by the client session and the server.

pub mod commands;
pub mod encoding;
pub mod lines;
pub mod responses;

pub use commands::{Command, CommandStatus, parse_command};
pub use encoding::TextEncoding;
pub use lines::{LineRead, read_line_bounded};
pub use responses::{Reply, format_response};
