use log::{debug, error, info, trace, warn};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::error::StorageError;
use crate::protocol::responses::*;
use crate::protocol::{
    Command, CommandStatus, LineRead, TextEncoding, parse_command, read_line_bounded,
};
use crate::server::accounts::UserAccount;
use crate::server::core::ServerContext;
use crate::server::{listing, storage};

const BUFFER_SIZE: usize = 8192;

/// Handles one FTP control connection until QUIT, EOF or a write failure.
///
/// - Reads command lines and decodes them with the configured encoding.
/// - Dispatches each command against the connection's `ClientSession`.
/// - Opens at most one passive data listener at a time.
pub async fn handle_client(
    stream: TcpStream,
    client_addr: SocketAddr,
    context: Arc<ServerContext>,
) {
    let local_ip = match stream.local_addr() {
        Ok(addr) => addr.ip(),
        Err(e) => {
            error!("Cannot read local address for {}: {}", client_addr, e);
            return;
        }
    };
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = ClientSession::new(client_addr, local_ip, context, write_half);

    let banner = session.context.config.banner.clone();
    if let Err(e) = session.reply(READY, &banner).await {
        warn!("Failed to greet {}: {}", client_addr, e);
        return;
    }

    let max_length = session.context.config.max_command_length;
    let mut line = Vec::new();
    loop {
        match read_line_bounded(&mut reader, &mut line, max_length).await {
            Ok(LineRead::Eof) => {
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Ok(LineRead::TooLong) => {
                if session.reply(UNKNOWN_COMMAND, "Command too long").await.is_err() {
                    break;
                }
            }
            Ok(LineRead::Line) => {
                let text = session.encoding.decode(&line);
                let command = parse_command(&text);
                match &command {
                    Command::PASS(_) => debug!("Received from {}: PASS ****", client_addr),
                    other => debug!("Received from {}: {:?}", client_addr, other),
                }

                match session.dispatch(command).await {
                    Ok(CommandStatus::CloseConnection) => {
                        info!("Client {} requested to quit", client_addr);
                        break;
                    }
                    Ok(CommandStatus::Failure(reason)) => {
                        debug!("Command from {} failed: {}", client_addr, reason)
                    }
                    Ok(CommandStatus::Success) => {}
                    Err(e) => {
                        warn!("Failed to reply to {}: {}", client_addr, e);
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
        }
    }

    info!("Client {} disconnected", client_addr);
}

/// Per-connection protocol state.
struct ClientSession {
    client_addr: SocketAddr,
    local_ip: IpAddr,
    context: Arc<ServerContext>,
    writer: OwnedWriteHalf,
    encoding: TextEncoding,
    pending_user: Option<String>,
    account: Option<UserAccount>,
    cwd: String,
    passive: Option<TcpListener>,
}

impl ClientSession {
    fn new(
        client_addr: SocketAddr,
        local_ip: IpAddr,
        context: Arc<ServerContext>,
        writer: OwnedWriteHalf,
    ) -> Self {
        let encoding = context.config.encoding;
        Self {
            client_addr,
            local_ip,
            context,
            writer,
            encoding,
            pending_user: None,
            account: None,
            cwd: "/".to_string(),
            passive: None,
        }
    }

    async fn reply(&mut self, code: u16, message: &str) -> io::Result<()> {
        let text = format_response(code, message);
        self.send_raw(&text).await
    }

    async fn send_raw(&mut self, text: &str) -> io::Result<()> {
        trace!("Sending to {}: {}", self.client_addr, text.trim_end());
        self.writer.write_all(&self.encoding.encode(text)).await?;
        self.writer.flush().await
    }

    async fn fail(&mut self, code: u16, message: &str) -> io::Result<CommandStatus> {
        self.reply(code, message).await?;
        Ok(CommandStatus::Failure(format!("{} {}", code, message)))
    }

    async fn storage_failure(&mut self, err: StorageError) -> io::Result<CommandStatus> {
        // A refused command also gives up the pending data connection.
        self.passive = None;
        self.fail(err.ftp_code(), &err.to_string()).await
    }

    fn home(&self) -> PathBuf {
        self.account
            .as_ref()
            .map(|a| a.home.clone())
            .unwrap_or_default()
    }

    async fn dispatch(&mut self, command: Command) -> io::Result<CommandStatus> {
        match command {
            Command::QUIT => {
                self.reply(GOODBYE, "Goodbye.").await?;
                Ok(CommandStatus::CloseConnection)
            }
            Command::USER(username) => self.handle_user(username).await,
            Command::PASS(password) => self.handle_pass(password).await,
            Command::SYST => {
                self.reply(SYSTEM_TYPE, "UNIX Type: L8").await?;
                Ok(CommandStatus::Success)
            }
            Command::FEAT => self.handle_feat().await,
            Command::NOOP => {
                self.reply(OK, "NOOP ok.").await?;
                Ok(CommandStatus::Success)
            }
            Command::OPTS(arg) => self.handle_opts(&arg).await,
            Command::UNKNOWN(cmd) => {
                self.fail(UNKNOWN_COMMAND, &format!("Command {} not understood.", cmd))
                    .await
            }
            _ if self.account.is_none() => {
                self.fail(NOT_LOGGED_IN, "Log in with USER and PASS first.")
                    .await
            }
            Command::TYPE(kind) => self.handle_type(&kind).await,
            Command::PWD => {
                let quoted = self.cwd.replace('"', "\"\"");
                self.reply(PATH_CREATED, &format!("\"{}\" is the current directory.", quoted))
                    .await?;
                Ok(CommandStatus::Success)
            }
            Command::CWD(path) => self.handle_cwd(&path).await,
            Command::CDUP => self.handle_cwd("..").await,
            Command::MKD(path) => self.handle_mkd(&path).await,
            Command::PASV => self.handle_pasv().await,
            Command::LIST(path) => self.handle_list(path.as_deref(), false).await,
            Command::MLSD(path) => self.handle_list(path.as_deref(), true).await,
            Command::RETR(path) => self.handle_retr(&path).await,
            Command::STOR(path) => self.handle_stor(&path).await,
            Command::DELE(path) => self.handle_dele(&path).await,
        }
    }

    // --------------------
    // Login and session options
    // --------------------

    async fn handle_user(&mut self, username: String) -> io::Result<CommandStatus> {
        if self.account.is_some() {
            return self.fail(BAD_SEQUENCE, "Already logged in.").await;
        }
        self.pending_user = Some(username);
        self.reply(PASSWORD_REQUIRED, "Username ok, send password.")
            .await?;
        Ok(CommandStatus::Success)
    }

    async fn handle_pass(&mut self, password: String) -> io::Result<CommandStatus> {
        if self.account.is_some() {
            return self.fail(BAD_SEQUENCE, "Already logged in.").await;
        }
        let Some(username) = self.pending_user.take() else {
            return self.fail(BAD_SEQUENCE, "Login with USER first.").await;
        };

        let account = self.context.accounts.authenticate(&username, &password).cloned();
        match account {
            Some(account) => {
                info!(
                    "User {} logged in from {} (home {})",
                    account.username,
                    self.client_addr,
                    account.home.display()
                );
                self.account = Some(account);
                self.cwd = "/".to_string();
                self.reply(LOGIN_SUCCESS, "Login successful.").await?;
                Ok(CommandStatus::Success)
            }
            None => {
                warn!("Failed login for {} from {}", username, self.client_addr);
                self.fail(NOT_LOGGED_IN, "Authentication failed.").await
            }
        }
    }

    async fn handle_feat(&mut self) -> io::Result<CommandStatus> {
        let mut features = vec!["MLST type*;size*;modify*;".to_string()];
        if self.encoding == TextEncoding::Utf8 {
            features.push("UTF8".to_string());
        }
        let text = format_multiline(SYSTEM_STATUS, "Features supported:", &features, "End FEAT.");
        self.send_raw(&text).await?;
        Ok(CommandStatus::Success)
    }

    /// Only `OPTS UTF8 ON|OFF` is understood. The server's encoding is fixed;
    /// a request for the other one is refused.
    async fn handle_opts(&mut self, arg: &str) -> io::Result<CommandStatus> {
        let mut words = arg.split_whitespace().map(str::to_ascii_uppercase);
        let (option, value) = (words.next(), words.next());
        if option.as_deref() != Some("UTF8") {
            return self.fail(BAD_ARGUMENT, "Invalid OPTS argument.").await;
        }

        let requested = match value.as_deref() {
            None | Some("ON") => TextEncoding::Utf8,
            Some("OFF") => TextEncoding::Latin1,
            Some(_) => return self.fail(BAD_ARGUMENT, "Invalid OPTS UTF8 argument.").await,
        };
        if requested == self.encoding {
            self.reply(OK, &format!("Always in {} mode.", self.encoding))
                .await?;
            Ok(CommandStatus::Success)
        } else {
            self.fail(BAD_ARGUMENT, &format!("Only {} is supported.", self.encoding))
                .await
        }
    }

    async fn handle_type(&mut self, kind: &str) -> io::Result<CommandStatus> {
        match kind.trim().to_ascii_uppercase().as_str() {
            "I" | "L 8" => {
                self.reply(OK, "Type set to: Binary.").await?;
                Ok(CommandStatus::Success)
            }
            "A" | "A N" => {
                self.reply(OK, "Type set to: ASCII.").await?;
                Ok(CommandStatus::Success)
            }
            _ => self.fail(BAD_ARGUMENT, &format!("Unsupported type: {}", kind)).await,
        }
    }

    /// Reply 550 unless the logged-in account holds `letter`.
    async fn check_permission(&mut self, letter: char) -> io::Result<Option<CommandStatus>> {
        let allowed = self
            .account
            .as_ref()
            .is_some_and(|account| account.perm.allows(letter));
        if allowed {
            Ok(None)
        } else {
            let status = self.storage_failure(StorageError::PermissionDenied(letter)).await?;
            Ok(Some(status))
        }
    }

    // --------------------
    // Directory commands
    // --------------------

    async fn handle_cwd(&mut self, path: &str) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('e').await? {
            return Ok(denied);
        }
        match storage::change_directory(&self.home(), &self.cwd, path).await {
            Ok(new_cwd) => {
                self.reply(FILE_ACTION_OK, &format!("\"{}\" is the current directory.", new_cwd))
                    .await?;
                self.cwd = new_cwd;
                Ok(CommandStatus::Success)
            }
            Err(e) => self.storage_failure(e).await,
        }
    }

    async fn handle_mkd(&mut self, path: &str) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('m').await? {
            return Ok(denied);
        }
        match storage::make_directory(&self.home(), &self.cwd, path).await {
            Ok(created) => {
                let quoted = created.replace('"', "\"\"");
                self.reply(PATH_CREATED, &format!("\"{}\" directory created.", quoted))
                    .await?;
                Ok(CommandStatus::Success)
            }
            Err(e) => self.storage_failure(e).await,
        }
    }

    async fn handle_dele(&mut self, path: &str) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('d').await? {
            return Ok(denied);
        }
        match storage::delete_file(&self.home(), &self.cwd, path).await {
            Ok(_) => {
                self.reply(FILE_ACTION_OK, "File removed.").await?;
                Ok(CommandStatus::Success)
            }
            Err(e) => self.storage_failure(e).await,
        }
    }

    // --------------------
    // Data connection
    // --------------------

    async fn handle_pasv(&mut self) -> io::Result<CommandStatus> {
        // Replaces any listener left over from an earlier PASV.
        self.passive = None;

        let IpAddr::V4(ip) = self.local_ip else {
            return self
                .fail(CANNOT_OPEN_DATA, "Passive mode needs an IPv4 control connection.")
                .await;
        };

        let listener = match self.bind_passive(ip.into()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Cannot open passive port for {}: {}", self.client_addr, e);
                return self.fail(CANNOT_OPEN_DATA, "Cannot open passive connection.").await;
            }
        };
        let port = listener.local_addr()?.port();
        let [a, b, c, d] = ip.octets();
        let message = format!(
            "Entering Passive Mode ({},{},{},{},{},{}).",
            a,
            b,
            c,
            d,
            port >> 8,
            port & 0xff
        );
        debug!("Client {} passive port {}", self.client_addr, port);
        self.passive = Some(listener);
        self.reply(ENTERING_PASSIVE, &message).await?;
        Ok(CommandStatus::Success)
    }

    async fn bind_passive(&self, ip: IpAddr) -> io::Result<TcpListener> {
        match self.context.config.passive_ports() {
            None => TcpListener::bind((ip, 0)).await,
            Some(range) => {
                for port in range {
                    if let Ok(listener) = TcpListener::bind((ip, port)).await {
                        return Ok(listener);
                    }
                }
                Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    "no free port in the passive range",
                ))
            }
        }
    }

    /// Accept the client's data connection on the pending PASV listener.
    /// Replies 425 and returns `None` when there is none.
    async fn open_data(&mut self) -> io::Result<Option<TcpStream>> {
        let Some(listener) = self.passive.take() else {
            self.reply(CANNOT_OPEN_DATA, "Use PASV first.").await?;
            return Ok(None);
        };

        let timeout = self.context.config.data_timeout();
        match tokio::time::timeout(timeout, listener.accept()).await {
            Ok(Ok((stream, addr))) if addr.ip() == self.client_addr.ip() => Ok(Some(stream)),
            Ok(Ok((_, addr))) => {
                warn!(
                    "Rejected data connection from {} for client {}",
                    addr, self.client_addr
                );
                self.reply(CANNOT_OPEN_DATA, "Data connection from a foreign address.")
                    .await?;
                Ok(None)
            }
            Ok(Err(e)) => {
                self.reply(CANNOT_OPEN_DATA, &format!("Cannot open data connection: {}", e))
                    .await?;
                Ok(None)
            }
            Err(_) => {
                self.reply(CANNOT_OPEN_DATA, "Data connection timed out.").await?;
                Ok(None)
            }
        }
    }

    async fn handle_list(
        &mut self,
        path: Option<&str>,
        structured: bool,
    ) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('l').await? {
            return Ok(denied);
        }
        let items = match storage::list_directory(&self.home(), &self.cwd, path).await {
            Ok(items) => items,
            Err(e) => return self.storage_failure(e).await,
        };
        let text = self.encoding.encode(&listing::render(&items, structured));

        let Some(mut data) = self.open_data().await? else {
            return Ok(CommandStatus::Failure("no data connection".into()));
        };
        self.reply(OPENING_DATA, "Here comes the directory listing.")
            .await?;

        let sent = match data.write_all(&text).await {
            Ok(()) => data.shutdown().await,
            Err(e) => Err(e),
        };
        drop(data);

        match sent {
            Ok(()) => {
                self.reply(TRANSFER_COMPLETE, "Directory send OK.").await?;
                Ok(CommandStatus::Success)
            }
            Err(e) => self.fail(TRANSFER_ABORTED, &format!("Listing aborted: {}", e)).await,
        }
    }

    async fn handle_retr(&mut self, path: &str) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('r').await? {
            return Ok(denied);
        }
        let resolved = match storage::prepare_file_retrieval(&self.home(), &self.cwd, path).await {
            Ok(resolved) => resolved,
            Err(e) => return self.storage_failure(e).await,
        };
        let mut file = match File::open(&resolved.real).await {
            Ok(file) => file,
            Err(e) => return self.storage_failure(e.into()).await,
        };

        let Some(mut data) = self.open_data().await? else {
            return Ok(CommandStatus::Failure("no data connection".into()));
        };
        self.reply(
            OPENING_DATA,
            &format!("Opening BINARY mode data connection for {}.", resolved.virtual_path),
        )
        .await?;

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total_bytes_sent = 0u64;
        let outcome = loop {
            let n = match file.read(&mut buffer).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err((LOCAL_ERROR, e)),
            };
            if let Err(e) = data.write_all(&buffer[..n]).await {
                break Err((TRANSFER_ABORTED, e));
            }
            total_bytes_sent += n as u64;
        };
        let outcome = match outcome {
            Ok(()) => data.shutdown().await.map_err(|e| (TRANSFER_ABORTED, e)),
            Err(e) => Err(e),
        };
        drop(data);

        match outcome {
            Ok(()) => {
                info!(
                    "Sent {} to {} ({} bytes)",
                    resolved.virtual_path, self.client_addr, total_bytes_sent
                );
                self.reply(TRANSFER_COMPLETE, "Transfer complete.").await?;
                Ok(CommandStatus::Success)
            }
            Err((code, e)) => {
                warn!("RETR {} for {} failed: {}", resolved.virtual_path, self.client_addr, e);
                self.fail(code, &format!("Transfer aborted: {}", e)).await
            }
        }
    }

    /// Uploads land in a temporary sibling and are renamed into place only
    /// after the client closed the data connection cleanly.
    async fn handle_stor(&mut self, path: &str) -> io::Result<CommandStatus> {
        if let Some(denied) = self.check_permission('w').await? {
            return Ok(denied);
        }
        let (resolved, temp_path) =
            match storage::prepare_file_storage(&self.home(), &self.cwd, path).await {
                Ok(prepared) => prepared,
                Err(e) => return self.storage_failure(e).await,
            };
        let mut file = match File::create(&temp_path).await {
            Ok(file) => file,
            Err(e) => return self.storage_failure(e.into()).await,
        };

        let Some(mut data) = self.open_data().await? else {
            drop(file);
            remove_temp(&temp_path).await;
            return Ok(CommandStatus::Failure("no data connection".into()));
        };
        self.reply(OPENING_DATA, "Ok to send data.").await?;

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut total_bytes_received = 0u64;
        let outcome = loop {
            let n = match data.read(&mut buffer).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err((TRANSFER_ABORTED, e)),
            };
            if let Err(e) = file.write_all(&buffer[..n]).await {
                break Err((LOCAL_ERROR, e));
            }
            total_bytes_received += n as u64;
        };
        drop(data);
        let outcome = match outcome {
            Ok(()) => file.flush().await.map_err(|e| (LOCAL_ERROR, e)),
            Err(e) => Err(e),
        };
        drop(file);
        let outcome = match outcome {
            Ok(()) => fs::rename(&temp_path, &resolved.real)
                .await
                .map_err(|e| (LOCAL_ERROR, e)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(
                    "Received {} from {} ({} bytes)",
                    resolved.virtual_path, self.client_addr, total_bytes_received
                );
                self.reply(TRANSFER_COMPLETE, "Transfer complete.").await?;
                Ok(CommandStatus::Success)
            }
            Err((code, e)) => {
                remove_temp(&temp_path).await;
                warn!("STOR {} for {} failed: {}", resolved.virtual_path, self.client_addr, e);
                self.fail(code, &format!("Transfer aborted: {}", e)).await
            }
        }
    }
}

async fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove temporary file {}: {}", path.display(), e);
        }
    }
}
