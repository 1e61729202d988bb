//! This is the server implementation of RakNet, allowing you to create a RakNet server.
//!
//! This module provides a [`Listener`] struct, which answers the offline handshake,
//! creates a [`Connection`] for every peer that completes it, and routes each
//! datagram to the connection it belongs to.
//!
//! [`Listener`]: crate::server::Listener
//! [`Connection`]: crate::connection::Connection
use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::{net::SocketAddr, sync::Arc};

#[cfg(feature = "async_std")]
use async_std::{
    channel::{bounded, Receiver, Sender, TrySendError},
    net::UdpSocket,
    sync::Mutex,
    task::{self},
};
#[cfg(feature = "async_std")]
use futures::{select, FutureExt};

use binary_util::interfaces::{Reader, Writer};
use binary_util::ByteReader;

#[cfg(feature = "async_tokio")]
use tokio::{
    net::UdpSocket,
    select,
    sync::mpsc::channel as bounded,
    sync::mpsc::{error::TrySendError, Receiver, Sender},
    sync::Mutex,
    task::{self},
};

use crate::config::ListenerConfig;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::metrics::{Metrics, NoopMetrics};
use crate::notify::Notify;
use crate::protocol::packet::offline::{
    IncompatibleProtocolVersion, OfflinePacket, OpenConnectReply, SessionInfoReply,
    UnconnectedPong,
};
use crate::protocol::Magic;
use crate::rakrs_debug;
use crate::util::{current_epoch, to_address_token};

/// Smallest receive buffer the listener allocates.
const MIN_RECV_BUFFER: usize = 2048;

/// This is a helper enum that allows you to pass in a `SocketAddr` or a `&str` to the `Listener::bind` function.
/// This is useful for when you want to bind to a specific address, but you don't want to parse it yourself.
///
/// This Trait will successfully parse the following:
/// - `SocketAddr::new("127.0.0.1:19132")`
/// - `"127.0.0.1:19132"`
/// - `String::from("localhost:19132")`
pub enum PossiblySocketAddr {
    SocketAddr(SocketAddr),
    String(String),
}

impl PossiblySocketAddr {
    pub fn to_socket_addr(self) -> Option<SocketAddr> {
        match self {
            PossiblySocketAddr::SocketAddr(addr) => Some(addr),
            PossiblySocketAddr::String(addr) => match addr.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                // try to resolve it as a host name
                Err(_) => addr.to_socket_addrs().ok()?.next(),
            },
        }
    }
}

impl From<&str> for PossiblySocketAddr {
    fn from(s: &str) -> Self {
        PossiblySocketAddr::String(s.to_string())
    }
}

impl From<String> for PossiblySocketAddr {
    fn from(s: String) -> Self {
        PossiblySocketAddr::String(s)
    }
}

impl From<SocketAddr> for PossiblySocketAddr {
    fn from(s: SocketAddr) -> Self {
        PossiblySocketAddr::SocketAddr(s)
    }
}

impl std::fmt::Display for PossiblySocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PossiblySocketAddr::SocketAddr(addr) => write!(f, "{}", addr),
            PossiblySocketAddr::String(addr) => write!(f, "{}", addr),
        }
    }
}

/// The main server struct, this is responsible for listening to connections, and dispatching them to a handler.
///
/// Offline packets (discovery and MTU negotiation) are answered by the listener
/// itself and never reach the application. Once a peer sends its second MTU
/// probe a [`Connection`] is created for it and handed out by [`Listener::accept`].
///
/// ## A generic example
/// ```rust ignore
/// use rak_server::server::Listener;
/// use rak_server::connection::Connection;
///
/// #[async_std::main]
/// async fn main() {
///     // Bind the server to the specified address, but do not start it.
///     let mut server = Listener::bind("0.0.0.0:19132").await.unwrap();
///
///     // Begins listening to connections
///     server.start().await.unwrap();
///
///     // Start recieving connections
///     loop {
///         let conn = server.accept().await;
///         async_std::task::spawn(handle(conn.unwrap()));
///     }
/// }
///
/// async fn handle(conn: Connection) {
///     while let Ok(pk) = conn.recv().await {
///         println!("Got a connection packet {:?} ", pk);
///     }
///     println!("Connection closed!");
/// }
/// ```
///
/// ## Accepting other protocols
/// ```rust ignore
/// use rak_server::config::ListenerConfig;
/// use rak_server::server::Listener;
///
/// #[async_std::main]
/// async fn main() {
///     let config = ListenerConfig::default().with_protocol_versions(&[9, 10, 11]);
///     let mut server = Listener::bind_with("0.0.0.0:19132", config).await.unwrap();
///     server.start().await.unwrap();
/// }
/// ```
pub struct Listener {
    /// A server Id, passed in unconnected pong.
    pub id: u64,
    config: ListenerConfig,
    metrics: Arc<dyn Metrics>,
    /// Whether or not the server is being served.
    serving: bool,
    /// The current socket.
    sock: Option<Arc<UdpSocket>>,
    /// Every live connection, by address, along with the channel feeding it datagrams.
    connections: Arc<Mutex<HashMap<SocketAddr, Sender<Vec<u8>>>>>,
    /// The recieve communication channel, This is used to dispatch connections between a handle
    /// It allows you to use the syntax sugar for `Listener::accept()`.
    recv_comm: Receiver<Connection>,
    send_comm: Sender<Connection>,
    /// Stops both listener tasks.
    closed: Arc<Notify>,
}

impl Listener {
    /// Binds a new listener to the specified address provided with the default
    /// [`ListenerConfig`], this will error if the address is invalid or already in use.
    /// This will not start the listener, you must call [`Listener::start`] to start listening to connections.
    pub async fn bind<I: Into<PossiblySocketAddr>>(address: I) -> Result<Self, ServerError> {
        Self::bind_with(address, ListenerConfig::default()).await
    }

    /// Same as [`Listener::bind`], with an explicit configuration.
    pub async fn bind_with<I: Into<PossiblySocketAddr>>(
        address: I,
        config: ListenerConfig,
    ) -> Result<Self, ServerError> {
        let a: PossiblySocketAddr = address.into();
        let address = match a.to_socket_addr() {
            Some(address) => address,
            None => {
                rakrs_debug!("Invalid binding value");
                return Err(ServerError::AddrBindErr);
            }
        };

        let sock = match UdpSocket::bind(address).await {
            Ok(s) => s,
            Err(_) => return Err(ServerError::AddrBindErr),
        };

        rakrs_debug!(true, "listener: Bound to {}", address);

        // This channel is a Communication channel for when `Connection` structs are initialized.
        let (send_comm, recv_comm) = bounded::<Connection>(10);

        Ok(Self {
            id: rand::random(),
            config,
            metrics: Arc::new(NoopMetrics),
            serving: false,
            sock: Some(Arc::new(sock)),
            connections: Arc::new(Mutex::new(HashMap::new())),
            send_comm,
            recv_comm,
            closed: Arc::new(Notify::new()),
        })
    }

    /// Installs the statistics sink shared by the listener and all of its connections.
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.sock
            .as_ref()
            .and_then(|sock| sock.local_addr().ok())
            .ok_or(ServerError::NotListening)
    }

    /// Spawns the network task and the cleanup task. Must be called after
    /// [`Listener::bind`] and before [`Listener::accept`].
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.serving {
            return Err(ServerError::AlreadyOnline);
        }

        let socket = self.sock.as_ref().ok_or(ServerError::NotListening)?.clone();
        let send_comm = self.send_comm.clone();
        let server_id = self.id;
        let versions = self.config.protocol_versions.clone();
        let max_mtu = self.config.max_mtu;
        let reliability = self.config.reliability;
        let metrics = self.metrics.clone();
        let connections = self.connections.clone();
        let connections2 = self.connections.clone();
        self.closed = Arc::new(Notify::new());
        let closer = self.closed.clone();
        let closer2 = self.closed.clone();

        self.serving = true;

        #[cfg(feature = "async_std")]
        let (cs, client_close_recv) = bounded::<SocketAddr>(10);
        #[cfg(feature = "async_tokio")]
        let (cs, mut client_close_recv) = bounded::<SocketAddr>(10);
        let client_close_send = Arc::new(cs);

        task::spawn(async move {
            // We allocate here to prevent constant allocation of this array
            let mut buf = vec![0u8; (max_mtu as usize).max(MIN_RECV_BUFFER)];
            loop {
                let length: usize;
                let origin: SocketAddr;

                macro_rules! recv_body {
                    ($recv: ident) => {
                        match $recv {
                            Ok((l, o)) => {
                                length = l;
                                origin = o;
                            }
                            Err(e) => {
                                if e.kind() != std::io::ErrorKind::ConnectionReset {
                                    rakrs_debug!(true, "[SERVER-SOCKET] Failed to recieve packet! {}", e);
                                }
                                continue;
                            }
                        }

                        // Offline packets are never forwarded, the handshake belongs to the listener.
                        if let Ok(pk) = OfflinePacket::read(&mut ByteReader::from(&buf[..length])) {
                            match pk {
                                OfflinePacket::UnconnectedPing(_) => {
                                    let resp = UnconnectedPong {
                                        timestamp: current_epoch(),
                                        server_id,
                                        magic: Magic::new(),
                                    };

                                    send_packet_to_socket(&socket, resp.into(), origin).await;
                                    continue;
                                }
                                OfflinePacket::OpenConnectRequest(mut pk) => {
                                    if !versions.contains(&pk.protocol) {
                                        let resp = IncompatibleProtocolVersion {
                                            protocol: pk.protocol,
                                            magic: Magic::new(),
                                            server_id,
                                        };

                                        rakrs_debug!("[{}] Sent ({}) which is invalid RakNet protocol. Version is incompatible with server.", to_address_token(origin), pk.protocol);

                                        send_packet_to_socket(&socket, resp.into(), origin).await;
                                        continue;
                                    }

                                    if pk.mtu_size > max_mtu {
                                        rakrs_debug!(
                                            true,
                                            "[{}] Client requested Mtu Size: {} which is larger than the maximum allowed size of {}",
                                            to_address_token(origin),
                                            pk.mtu_size,
                                            max_mtu
                                        );
                                        pk.mtu_size = max_mtu;
                                    }

                                    let resp = OpenConnectReply {
                                        server_id,
                                        security: false,
                                        magic: Magic::new(),
                                        mtu_size: pk.mtu_size,
                                    };
                                    send_packet_to_socket(&socket, resp.into(), origin).await;
                                    continue;
                                }
                                OfflinePacket::SessionInfoRequest(pk) => {
                                    let mtu_size = pk.mtu_size.min(max_mtu);
                                    let resp = SessionInfoReply {
                                        server_id,
                                        client_address: origin,
                                        magic: Magic::new(),
                                        mtu_size,
                                        security: false,
                                    };

                                    let mut sessions = connections.lock().await;

                                    if !sessions.contains_key(&origin) {
                                        rakrs_debug!(true, "[{}] Creating new session with mtu {}", to_address_token(origin), mtu_size);
                                        let (net_send, net_recv) = bounded::<Vec<u8>>(10);
                                        let connection = Connection::new(
                                            origin,
                                            &socket,
                                            net_recv,
                                            client_close_send.clone(),
                                            mtu_size,
                                            reliability,
                                            metrics.clone(),
                                        )
                                        .await;

                                        sessions.insert(origin, net_send);

                                        // notify the connection communicator
                                        if let Err(err) = send_comm.send(connection).await {
                                            let connection = err.0;
                                            // there was an error, and we should terminate this connection immediately.
                                            rakrs_debug!("[{}] Error while communicating with internal connection channel! Connection withdrawn.", to_address_token(connection.address));
                                            sessions.remove(&origin);
                                            continue;
                                        }
                                        metrics.incr_join(1);
                                    }
                                    drop(sessions);

                                    send_packet_to_socket(&socket, resp.into(), origin).await;
                                    continue;
                                }
                                _ => {
                                    rakrs_debug!(
                                        "[{}] Received invalid packet!",
                                        to_address_token(origin)
                                    );
                                    continue;
                                }
                            }
                        }

                        // Anything else belongs to a connection, if there is one.
                        // never waits on a connection while the map is locked
                        let mut sessions = connections.lock().await;
                        if let Some(net) = sessions.get(&origin) {
                            match net.try_send(buf[..length].to_vec()) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    rakrs_debug!(true, "[{}] Connection is not keeping up, dropped a datagram", to_address_token(origin));
                                }
                                Err(TrySendError::Closed(_)) => {
                                    rakrs_debug!(true, "[{}] Failed when handling recieved packet! Could not pass over to internal connection, the channel might be closed! (Removed the connection)", to_address_token(origin));
                                    sessions.remove(&origin);
                                }
                            }
                        }
                        drop(sessions);
                    };
                }

                #[cfg(feature = "async_std")]
                select! {
                    _ = closer.wait().fuse() => {
                        rakrs_debug!(true, "[SERVER] [NETWORK] Server has recieved the shutdown notification!");
                        break;
                    }
                    recv = socket.recv_from(&mut buf).fuse() => {
                       recv_body!(recv);
                    }
                }

                #[cfg(feature = "async_tokio")]
                select! {
                    _ = closer.wait() => {
                        rakrs_debug!(true, "[SERVER] [NETWORK] Server has recieved the shutdown notification!");
                        break;
                    }
                    recv = socket.recv_from(&mut buf) => {
                        recv_body!(recv);
                    }
                }
            }
        });

        task::spawn(async move {
            // here we loop and recv from the client_close_recv channel
            // and remove the connection from the hashmap
            loop {
                #[cfg(feature = "async_std")]
                select! {
                    _ = closer2.wait().fuse() => {
                        rakrs_debug!(true, "[SERVER] [Cleanup] Server has recieved the shutdown notification!");
                        break;
                    }
                    addr = client_close_recv.recv().fuse() => {
                        if let Ok(addr) = addr {
                            rakrs_debug!(true, "[SERVER] [Cleanup] Removing connection for {}", to_address_token(addr));
                            connections2.lock().await.remove(&addr);
                        }
                    }
                }

                #[cfg(feature = "async_tokio")]
                select! {
                    _ = closer2.wait() => {
                        rakrs_debug!(true, "[SERVER] [Cleanup] Server has recieved the shutdown notification!");
                        break;
                    }
                    addr = client_close_recv.recv() => {
                        if let Some(addr) = addr {
                            rakrs_debug!(true, "[SERVER] [Cleanup] Removing connection for {}", to_address_token(addr));
                            connections2.lock().await.remove(&addr);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// This method is used to accept a connection, this will block until a connection is available.
    /// You can only call this method once both [`Listener::bind`] AND [`Listener::start`] have. Alternatively,
    /// you can refuse a connection by dropping it when you accept it.
    pub async fn accept(&mut self) -> Result<Connection, ServerError> {
        if !self.serving {
            return Err(ServerError::NotListening);
        }

        let receiver = self.recv_comm.recv().await;
        match receiver {
            #[cfg(feature = "async_std")]
            Ok(c) => Ok(c),
            #[cfg(feature = "async_std")]
            Err(_) => Err(ServerError::Killed),
            #[cfg(feature = "async_tokio")]
            Some(c) => Ok(c),
            #[cfg(feature = "async_tokio")]
            None => Err(ServerError::Killed),
        }
    }

    /// Number of connections the listener is currently routing datagrams to.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Stops the Listener, effectively closing the socket and stopping the server.
    /// Connections lose their datagram feed and time out on their own.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        if !self.serving {
            return Err(ServerError::NotListening);
        }

        self.closed.notify().await;
        self.connections.lock().await.clear();

        self.sock = None;
        self.serving = false;

        Ok(())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.serving {
            let _ = futures_executor::block_on(self.stop());
        }
    }
}

async fn send_packet_to_socket(socket: &Arc<UdpSocket>, packet: OfflinePacket, origin: SocketAddr) {
    let buf = match packet.write_to_bytes() {
        Ok(buf) => buf,
        Err(e) => {
            rakrs_debug!("[{}] Failed to encode offline packet! {}", to_address_token(origin), e);
            return;
        }
    };

    if let Err(e) = socket.send_to(buf.as_slice(), origin).await {
        rakrs_debug!(
            "[{}] Failed sending payload to socket! {}",
            to_address_token(origin),
            e
        );
    }
}
