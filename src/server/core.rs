use log::{error, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::protocol::format_response;
use crate::protocol::responses::SERVICE_UNAVAILABLE;
use crate::server::accounts::AccountStore;
use crate::server::handler::handle_client;

/// Everything a connection handler reads but never changes.
pub struct ServerContext {
    pub config: ServerConfig,
    pub accounts: AccountStore,
}

/// Open connections, in total and per client IP.
#[derive(Debug, Default)]
struct ConnectionRegistry {
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

impl ConnectionRegistry {
    fn try_register(
        &mut self,
        ip: IpAddr,
        max_total: usize,
        max_per_ip: usize,
    ) -> Result<(), &'static str> {
        if self.total >= max_total {
            return Err("Too many connections. Try again later.");
        }
        let count = self.per_ip.entry(ip).or_insert(0);
        if *count >= max_per_ip {
            return Err("Too many connections from your address.");
        }
        *count += 1;
        self.total += 1;
        Ok(())
    }

    fn release(&mut self, ip: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
            self.total = self.total.saturating_sub(1);
        }
    }
}

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    connections: Arc<Mutex<ConnectionRegistry>>,
}

impl Server {
    /// Validate `config`, create the home directories and bind the control
    /// socket.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let accounts = AccountStore::from_config(&config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        for home in config.home_directories() {
            tokio::fs::create_dir_all(&home).await?;
            info!("Home directory ready: {}", home.display());
        }

        let socket = config.control_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e);
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            context: Arc::new(ServerContext { config, accounts }),
            connections: Arc::new(Mutex::new(ConnectionRegistry::default())),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task per client.
    pub async fn run(self) {
        let config = &self.context.config;
        info!(
            "Starting FTP server (max {} connections, {} per address)",
            config.max_connections, config.max_connections_per_ip
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.admit(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn admit(&self, mut stream: TcpStream, addr: SocketAddr) {
        let config = &self.context.config;
        let admitted = self.connections.lock().await.try_register(
            addr.ip(),
            config.max_connections,
            config.max_connections_per_ip,
        );

        if let Err(reason) = admitted {
            warn!("Refusing connection from {}: {}", addr, reason);
            tokio::spawn(async move {
                let reply = format_response(SERVICE_UNAVAILABLE, reason);
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
            return;
        }

        info!("Accepted connection from {}", addr);
        let context = Arc::clone(&self.context);
        let connections = Arc::clone(&self.connections);

        // Spawn a task for each client so the accept loop doesn't block
        tokio::spawn(async move {
            handle_client(stream, addr, context).await;
            connections.lock().await.release(addr.ip());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_registry_limits() {
        let mut registry = ConnectionRegistry::default();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(registry.try_register(a, 3, 2).is_ok());
        assert!(registry.try_register(a, 3, 2).is_ok());
        assert!(registry.try_register(a, 3, 2).is_err());
        assert!(registry.try_register(b, 3, 2).is_ok());
        assert!(registry.try_register(b, 3, 2).is_err());

        registry.release(a);
        assert!(registry.try_register(b, 3, 2).is_ok());
        assert_eq!(registry.total, 3);
    }
}
