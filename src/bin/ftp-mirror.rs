//! ftp-mirror client
//!
//! Command-line front end for the transfer engine: list a remote directory,
//! or upload/download a file or directory tree while printing progress.

use clap::{Parser, Subcommand};
use log::{error, warn};
use std::path::PathBuf;
use std::process::ExitCode;

use ftp_mirror::client::{Session, SharedSession};
use ftp_mirror::config::ClientConfig;
use ftp_mirror::error::handlers::reply_code;
use ftp_mirror::listing::{EntryKind, ListingFormat};
use ftp_mirror::protocol::TextEncoding;
use ftp_mirror::transfer::{
    Outcome, TransferEvent, TransferOrchestrator, TransferResult, TransferTask,
};

/// Mirror files and directory trees to and from an FTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Server control port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Login name (overrides configuration)
    #[arg(short, long)]
    user: Option<String>,

    /// Password (overrides configuration)
    #[arg(long)]
    password: Option<String>,

    /// Control connection encoding: utf-8 or latin-1
    #[arg(short, long)]
    encoding: Option<TextEncoding>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List a remote directory
    List {
        /// Remote directory (default: the login directory)
        path: Option<String>,

        /// Use LIST even when the server offers MLSD
        #[arg(long, default_value = "false")]
        long: bool,
    },
    /// Upload a local file or directory
    Upload { local: PathBuf, remote: String },
    /// Download a remote file or directory
    Download { remote: String, local: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(user) = args.user {
        config.username = user;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }

    let mut session = Session::new();
    if let Err(e) = session
        .connect(&config.host, config.port, config.connect_timeout())
        .await
    {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    match session.authenticate(&config.username, &config.password).await {
        Ok(welcome) => println!("{}", welcome),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    }
    if let Err(warning) = session.negotiate_encoding(config.encoding).await {
        warn!("{}", warning);
    }

    let session = session.into_shared();
    let code = match args.command {
        Action::List { path, long } => list(&session, path.as_deref(), long).await,
        Action::Upload { local, remote } => {
            let kind = if local.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let task = TransferTask::upload(local, remote, kind);
            run_transfer(&session, &config, task).await
        }
        Action::Download { remote, local } => {
            let kind = remote_kind(&session, &remote).await;
            let task = TransferTask::download(remote, local, kind);
            run_transfer(&session, &config, task).await
        }
    };

    session.lock().await.close().await;
    code
}

async fn list(session: &SharedSession, path: Option<&str>, long: bool) -> ExitCode {
    let mut session = session.lock().await;
    let format = if long {
        ListingFormat::LongFormat
    } else {
        session.listing_format(true)
    };
    match session.list(path, format).await {
        Ok(entries) => {
            for entry in entries {
                match entry.kind {
                    EntryKind::Directory => println!("{:>12}  {}/", "-", entry.name),
                    EntryKind::File => println!("{:>12}  {}", entry.size, entry.name),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// A remote path is a directory if CWD into it works.
async fn remote_kind(session: &SharedSession, remote: &str) -> EntryKind {
    let mut session = session.lock().await;
    let Ok(previous) = session.pwd().await else {
        return EntryKind::File;
    };
    match session.change_dir(remote).await {
        Ok(()) => {
            if let Err(e) = session.change_dir(&previous).await {
                warn!("Could not return to {}: {}", previous, e);
            }
            EntryKind::Directory
        }
        Err(_) => EntryKind::File,
    }
}

async fn run_transfer(
    session: &SharedSession,
    config: &ClientConfig,
    task: TransferTask,
) -> ExitCode {
    let orchestrator = TransferOrchestrator::new(session.clone(), config.walk_options());
    let mut handle = orchestrator.start(task);
    let cancel = handle.cancel_handle();

    let printer = handle.progress().map(|mut progress| {
        tokio::spawn(async move {
            while let Some(event) = progress.next().await {
                print_event(&event);
            }
        })
    });

    let wait = handle.wait();
    tokio::pin!(wait);
    let finished = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling after the current file...");
            cancel.cancel();
            wait.await
        }
    };
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match finished {
        Ok(result) => summarize(&result),
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_event(event: &TransferEvent) {
    match event {
        TransferEvent::Started(task) => {
            println!("{} -> {}", task.source(), task.destination())
        }
        TransferEvent::Item(outcome) => println!("  {}", outcome),
        TransferEvent::Finished { outcome, cancelled } => {
            if *cancelled {
                println!("cancelled ({:?})", outcome);
            }
        }
    }
}

fn summarize(result: &TransferResult) -> ExitCode {
    println!(
        "{} succeeded, {} failed, {} skipped, {} bytes",
        result.items_succeeded, result.items_failed, result.items_skipped, result.bytes_transferred
    );
    for (path, err) in &result.errors {
        match reply_code(err) {
            Some(code) => eprintln!("  {} [{}]: {}", path, code, err),
            None => eprintln!("  {}: {}", path, err),
        }
    }
    if let Some(cause) = &result.aborted {
        eprintln!("aborted: {}", cause);
    }
    match result.outcome() {
        Outcome::Succeeded if result.cancelled => ExitCode::from(3),
        Outcome::Succeeded => ExitCode::SUCCESS,
        Outcome::PartialFailure => ExitCode::from(2),
        Outcome::Failed => ExitCode::FAILURE,
    }
}
