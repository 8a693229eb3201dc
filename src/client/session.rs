//! Client session management
//!
//! A `Session` owns exactly one control connection and tracks its lifecycle:
//!
//! ```text
//! Disconnected --connect--> Connecting --authenticate--> Authenticated
//!       ^                                                      |
//!       +------------------- close / control failure ----------+
//! ```
//!
//! Any I/O failure on the control connection drops the connection and moves
//! the session back to `Disconnected`; callers must reconnect explicitly.

use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::client::control::ControlChannel;
use crate::error::{AuthError, CommandError, ConnectError, TransferError, Warning};
use crate::listing::{ListingEntry, ListingFormat, parse_listing};
use crate::protocol::responses::{LOGIN_SUCCESS, SERVICE_UNAVAILABLE};
use crate::protocol::{Reply, TextEncoding};
use crate::transfer::data_channel;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A session handle that several workers can share. Holding the lock is
/// what serializes use of the control channel.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    Closing,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Greeting and login text returned by a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub banner: String,
    pub login: String,
}

impl fmt::Display for WelcomeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.banner.is_empty() {
            write!(f, "{}", self.login)
        } else {
            write!(f, "{}", self.banner)
        }
    }
}

/// Capabilities advertised by `FEAT`.
#[derive(Debug, Clone, Default)]
struct ServerFeatures {
    mlsd: bool,
    utf8: bool,
}

/// Outcome of `make_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Created,
    AlreadyExists,
}

pub struct Session {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    encoding: TextEncoding,
    state: ConnectionState,
    control: Option<ControlChannel>,
    banner: Option<String>,
    features: ServerFeatures,
    connect_timeout: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            credentials: None,
            encoding: TextEncoding::Utf8,
            state: ConnectionState::Disconnected,
            control: None,
            banner: None,
            features: ServerFeatures::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Address of the server end of the control connection.
    pub fn control_peer(&self) -> Option<SocketAddr> {
        self.control.as_ref().map(|c| c.peer_addr())
    }

    pub fn supports_structured_listing(&self) -> bool {
        self.features.mlsd
    }

    // --------------------
    // Lifecycle
    // --------------------

    /// Open the control connection and read the server greeting.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        if self.control.is_some() {
            self.close().await;
        }

        let addr = format!("{}:{}", host, port);
        info!("Connecting to {}", addr);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ConnectError::Unreachable(e)),
            Err(_) => return Err(ConnectError::Timeout(addr)),
        };

        let mut control =
            ControlChannel::new(stream, self.encoding).map_err(ConnectError::Unreachable)?;
        let greeting = match tokio::time::timeout(timeout, control.read_reply()).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(ConnectError::Unreachable(e)),
            Err(_) => return Err(ConnectError::Timeout(addr)),
        };
        if !greeting.is_completion() {
            return Err(ConnectError::Greeting {
                code: greeting.code,
                message: greeting.message(),
            });
        }

        self.host = host.to_string();
        self.port = port;
        self.connect_timeout = timeout;
        self.banner = Some(greeting.message());
        self.features = ServerFeatures::default();
        self.control = Some(control);
        self.state = ConnectionState::Connecting;
        debug!("Greeting from {}: {}", addr, greeting.message());
        Ok(())
    }

    /// Log in with USER/PASS, switch to binary mode and probe features.
    pub async fn authenticate(
        &mut self,
        user: &str,
        password: &str,
    ) -> Result<WelcomeMessage, AuthError> {
        if self.state != ConnectionState::Connecting || self.control.is_none() {
            return Err(AuthError::NotConnected);
        }

        let user_reply = self
            .exchange(&format!("USER {}", user))
            .await
            .map_err(auth_failure)?;

        let login = match user_reply.code {
            LOGIN_SUCCESS => user_reply,
            331 | 332 => {
                let pass_reply = self
                    .exchange(&format!("PASS {}", password))
                    .await
                    .map_err(auth_failure)?;
                match pass_reply.code {
                    200..=299 => pass_reply,
                    400..=599 => return Err(rejected(&pass_reply)),
                    _ => {
                        return Err(AuthError::ProtocolError(format!(
                            "Unexpected reply to PASS: {}",
                            pass_reply.code
                        )));
                    }
                }
            }
            400..=599 => return Err(rejected(&user_reply)),
            other => {
                return Err(AuthError::ProtocolError(format!(
                    "Unexpected reply to USER: {}",
                    other
                )));
            }
        };

        self.state = ConnectionState::Authenticated;
        self.credentials = Some(Credentials::new(user, password));
        info!("Logged in to {}:{} as {}", self.host, self.port, user);

        match self.issue("TYPE I").await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(auth_failure(e)),
            Err(e) => warn!("Server refused binary mode: {}", e),
        }
        self.features = self.probe_features().await.map_err(auth_failure)?;

        Ok(WelcomeMessage {
            banner: self.banner.clone().unwrap_or_default(),
            login: login.message(),
        })
    }

    /// Connect and log in again with the last host and credentials. Never
    /// called implicitly; a lost session stays lost until the caller asks.
    pub async fn reconnect(&mut self) -> Result<WelcomeMessage, AuthError> {
        let credentials = self.credentials.clone().ok_or(AuthError::NotConnected)?;
        let host = self.host.clone();
        self.connect(&host, self.port, self.connect_timeout)
            .await
            .map_err(|e| AuthError::ProtocolError(e.to_string()))?;
        let welcome = self
            .authenticate(&credentials.username, &credentials.password)
            .await?;
        if self.encoding != TextEncoding::Utf8 {
            let _ = self.negotiate_encoding(self.encoding).await;
        }
        Ok(welcome)
    }

    /// Ask the server to use `pref` for control text. The session switches to
    /// `pref` locally whatever the server answers.
    pub async fn negotiate_encoding(&mut self, pref: TextEncoding) -> Result<(), Warning> {
        self.encoding = pref;
        if let Some(control) = self.control.as_mut() {
            control.set_encoding(pref);
        }
        if self.control.is_none() {
            return Err(Warning(format!(
                "not connected; {} will be used once connected",
                pref
            )));
        }

        if self.is_authenticated() && !self.features.utf8 {
            debug!("{}:{} does not advertise UTF8; asking anyway", self.host, self.port);
        }
        let command = format!("OPTS UTF8 {}", pref.opts_argument());
        match self.exchange(&command).await {
            Ok(reply) if reply.is_completion() => {
                info!("Server accepted {} encoding", pref);
                Ok(())
            }
            Ok(reply) => {
                let warning = Warning(format!(
                    "server declined {} ({} {}); replies may arrive in another encoding",
                    pref,
                    reply.code,
                    reply.message()
                ));
                warn!("{}", warning);
                Err(warning)
            }
            Err(e) => Err(Warning(format!("encoding negotiation failed: {}", e))),
        }
    }

    /// Issue one command and read one reply. 4xx/5xx replies become
    /// `RemoteRejected`.
    pub async fn issue(&mut self, command_line: &str) -> Result<Reply, CommandError> {
        let reply = self.send_command(command_line).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(CommandError::RemoteRejected {
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    /// Issue one command and return whatever reply arrives.
    pub(crate) async fn send_command(&mut self, command_line: &str) -> Result<Reply, CommandError> {
        if !self.is_authenticated() {
            return Err(CommandError::NotConnected);
        }
        self.exchange(command_line).await
    }

    /// Read a follow-up reply (e.g. the 226 after a data transfer).
    pub(crate) async fn read_reply(&mut self) -> Result<Reply, CommandError> {
        let control = self.control.as_mut().ok_or(CommandError::NotConnected)?;
        let result = control.read_reply().await;
        self.check_reply(result)
    }

    async fn exchange(&mut self, command_line: &str) -> Result<Reply, CommandError> {
        let control = self.control.as_mut().ok_or(CommandError::NotConnected)?;
        let result = control.exchange(command_line).await;
        self.check_reply(result)
    }

    fn check_reply(&mut self, result: io::Result<Reply>) -> Result<Reply, CommandError> {
        match result {
            Ok(reply) if reply.code == SERVICE_UNAVAILABLE => {
                warn!("Server is closing the session: {}", reply.message());
                self.invalidate();
                Ok(reply)
            }
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("Control connection to {}:{} lost: {}", self.host, self.port, e);
                self.invalidate();
                Err(CommandError::Io(e))
            }
        }
    }

    fn invalidate(&mut self) {
        self.control = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Send QUIT (best effort) and drop the connection. Safe to call twice.
    pub async fn close(&mut self) {
        if let Some(mut control) = self.control.take() {
            self.state = ConnectionState::Closing;
            match tokio::time::timeout(self.connect_timeout, control.exchange("QUIT")).await {
                Ok(Ok(reply)) => debug!("QUIT answered: {} {}", reply.code, reply.message()),
                Ok(Err(e)) => debug!("QUIT failed: {}", e),
                Err(_) => debug!("QUIT timed out"),
            }
            control.shutdown().await;
            info!("Disconnected from {}:{}", self.host, self.port);
        }
        self.state = ConnectionState::Disconnected;
    }

    // --------------------
    // Directory commands
    // --------------------

    pub async fn pwd(&mut self) -> Result<String, CommandError> {
        let reply = self.issue("PWD").await?;
        parse_quoted_path(&reply.message()).ok_or_else(|| {
            CommandError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Cannot parse PWD reply: {}", reply.message()),
            ))
        })
    }

    pub async fn change_dir(&mut self, path: &str) -> Result<(), CommandError> {
        self.issue(&format!("CWD {}", path)).await.map(|_| ())
    }

    /// Create a remote directory. An existing directory counts as success.
    pub async fn make_dir(&mut self, path: &str) -> Result<DirStatus, CommandError> {
        match self.issue(&format!("MKD {}", path)).await {
            Ok(_) => Ok(DirStatus::Created),
            Err(CommandError::RemoteRejected { code, message }) => {
                if self.directory_exists(path).await? {
                    debug!("Remote directory {} already exists", path);
                    Ok(DirStatus::AlreadyExists)
                } else {
                    Err(CommandError::RemoteRejected { code, message })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Create `path` and every missing parent, one MKD per component.
    /// Components that already exist are fine; the status is the last one's.
    pub async fn make_dir_all(&mut self, path: &str) -> Result<DirStatus, CommandError> {
        let absolute = path.starts_with('/');
        let mut prefix = String::new();
        let mut status = DirStatus::AlreadyExists;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if absolute || !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            status = self.make_dir(&prefix).await?;
        }
        Ok(status)
    }

    /// Probe with CWD, then return to the previous working directory.
    async fn directory_exists(&mut self, path: &str) -> Result<bool, CommandError> {
        let cwd = self.pwd().await?;
        match self.change_dir(path).await {
            Ok(()) => {
                self.change_dir(&cwd).await?;
                Ok(true)
            }
            Err(CommandError::RemoteRejected { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Retrieve and parse a directory listing. `None` lists the working
    /// directory.
    pub async fn list(
        &mut self,
        path: Option<&str>,
        format: ListingFormat,
    ) -> Result<Vec<ListingEntry>, TransferError> {
        let command = match path {
            Some(p) if !p.is_empty() => format!("{} {}", format.command(), p),
            _ => format.command().to_string(),
        };
        let text = data_channel::retrieve_text(self, &command).await?;
        Ok(parse_listing(format, &text))
    }

    /// Pick the listing form for remote reads: structured when the server
    /// offers it and `prefer_structured` is set.
    pub fn listing_format(&self, prefer_structured: bool) -> ListingFormat {
        if prefer_structured && self.supports_structured_listing() {
            ListingFormat::Structured
        } else {
            ListingFormat::LongFormat
        }
    }

    async fn probe_features(&mut self) -> Result<ServerFeatures, CommandError> {
        let reply = match self.send_command("FEAT").await {
            Ok(reply) if reply.is_completion() => reply,
            Ok(_) => return Ok(ServerFeatures::default()),
            Err(e) => return Err(e),
        };

        let advertised: Vec<String> = reply
            .body()
            .iter()
            .map(|l| l.trim().to_ascii_uppercase())
            .collect();
        let has = |feat: &str| advertised.iter().any(|l| l.starts_with(feat));
        Ok(ServerFeatures {
            mlsd: has("MLST") || has("MLSD"),
            utf8: has("UTF8"),
        })
    }
}

fn rejected(reply: &Reply) -> AuthError {
    AuthError::Rejected {
        code: reply.code,
        message: reply.message(),
    }
}

fn auth_failure(err: CommandError) -> AuthError {
    match err {
        CommandError::NotConnected => AuthError::NotConnected,
        CommandError::RemoteRejected { code, message } => AuthError::Rejected { code, message },
        CommandError::Io(e) => AuthError::ProtocolError(e.to_string()),
    }
}

/// Extract `/a/b` from `"/a/b" is the current directory`. Doubled quotes
/// inside the path stand for one quote.
fn parse_quoted_path(text: &str) -> Option<String> {
    let start = text.find('"')? + 1;
    let mut path = String::new();
    let mut chars = text[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_path() {
        assert_eq!(
            parse_quoted_path("\"/home/docs\" is the current directory"),
            Some("/home/docs".into())
        );
        assert_eq!(parse_quoted_path("\"/say \"\"hi\"\"\" ok"), Some("/say \"hi\"".into()));
        assert_eq!(parse_quoted_path("no quotes"), None);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("user", "12345");
        let text = format!("{:?}", creds);
        assert!(text.contains("user"));
        assert!(!text.contains("12345"));
    }

    #[tokio::test]
    async fn test_issue_requires_authentication() {
        let mut session = Session::new();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let err = session.issue("NOOP").await.unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut session = Session::new();
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_authenticate_before_connect() {
        let mut session = Session::new();
        let err = session.authenticate("user", "12345").await.unwrap_err();
        assert!(matches!(err, AuthError::NotConnected));
    }
}
