//! This module contains the logic to handle a connection or "peer" to the server.
//!
//! This module contains the following:
//! - [`Connection`]: the async handle an application gets from [`Listener::accept()`].
//! - [`ConnectionState`]: the handshake progress of a connection.
//!
//! And the sans-IO layers a connection is built from:
//! - [`session`]: the full per-connection pipeline.
//! - [`controller`]: the reliability engine, windows and RTT estimate.
//! - [`queue`]: the unacked table, split/reassembly and ordering queues.
//!
//! # Example
//! This is a snippet of code you would use after you've accepted a connection from the server with
//! [`Listener::accept()`].
//!
//! ```ignore
//! use rak_server::connection::Connection;
//! use rak_server::protocol::reliability::Reliability;
//!
//! async fn handle(conn: Connection) {
//!     while let Ok(packet) = conn.recv().await {
//!         // echo everything back on channel 0
//!         if conn.send(&packet, Reliability::ReliableOrd, 0).await.is_err() {
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! [`Listener::accept()`]: crate::server::Listener::accept
//! [`ConnectionState`]: crate::connection::state::ConnectionState
pub mod controller;
/// Necessary queues for the connection.
pub mod queue;
pub mod session;
pub mod state;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use binary_util::interfaces::{Reader, Writer};

#[cfg(feature = "async_std")]
use async_std::{
    channel::{bounded, Receiver, Sender},
    net::UdpSocket,
    sync::Mutex,
    task::{self, sleep, JoinHandle},
};
#[cfg(feature = "async_std")]
use futures::{select, select_biased, FutureExt};
#[cfg(feature = "async_tokio")]
use tokio::{
    net::UdpSocket,
    select,
    sync::{
        mpsc::{channel as bounded, Receiver, Sender},
        Mutex,
    },
    task::{self, JoinHandle},
    time::sleep,
};

use crate::{
    config::ReliabilityConfig,
    error::ConnectionError,
    metrics::Metrics,
    notify::Notify,
    protocol::{
        packet::online::{
            ConnectedPing, ConnectedPong, ConnectionAccept, Disconnect, OnlinePacket,
        },
        reliability::Reliability,
    },
    rakrs_debug,
    util::{current_epoch, to_address_token},
};

use self::{controller::reliability::EngineState, session::Session, state::ConnectionState};

/// How often a keep-alive ping is sent to the peer.
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// What the connection does with a payload that came out of the session.
enum PacketAction {
    /// A control packet, answered by the connection itself.
    Consumed,
    /// Belongs to the application.
    Forward,
    /// The peer disconnected.
    Close,
}

/// The connection struct contains the logic for a connection to the server.
/// The following methods are the most important:
/// - [`Connection::recv()`]: This is used to recieve packets from the client.
/// - [`Connection::send()`]: This is used to send packets to the client.
/// - [`Connection::close()`]: This is used to disconnect the client.
///
/// Two tasks run for every connection: one feeding datagrams from the listener
/// into the [`Session`], and the resend timer, which fires once per RTT
/// estimate. Both lock the same session, so everything that touches the state
/// of one connection happens one operation at a time.
pub struct Connection {
    /// The address of the connection
    /// This is internally tokenized by rak-server
    pub address: SocketAddr,
    pub state: Arc<Mutex<ConnectionState>>,
    session: Arc<Mutex<Session>>,
    socket: Arc<UdpSocket>,
    /// Payloads for the application, read by [`Connection::recv()`].
    internal_net_recv: Arc<Mutex<Receiver<Vec<u8>>>>,
    /// Tells the listener to forget this address.
    notifier: Arc<Sender<SocketAddr>>,
    /// A notifier for when the connection should close.
    disconnect: Arc<Notify>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Connection {
    /// Initializes a new Connection instance.
    pub(crate) async fn new(
        address: SocketAddr,
        socket: &Arc<UdpSocket>,
        net: Receiver<Vec<u8>>,
        notifier: Arc<Sender<SocketAddr>>,
        mtu: u16,
        config: ReliabilityConfig,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let (net_sender, net_receiver) = bounded::<Vec<u8>>(100);
        let c = Self {
            address,
            state: Arc::new(Mutex::new(ConnectionState::Unidentified)),
            session: Arc::new(Mutex::new(Session::new(
                mtu,
                config,
                metrics,
                Instant::now(),
            ))),
            socket: socket.clone(),
            internal_net_recv: Arc::new(Mutex::new(net_receiver)),
            notifier,
            disconnect: Arc::new(Notify::new()),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };

        {
            let mut tasks = c.tasks.lock().await;
            tasks.push(c.init_tick());
            tasks.push(c.init_net_recv(net, net_sender));
        }

        c
    }

    /// Spawns the resend timer.
    ///
    /// The timer is re-armed after every firing with the current RTT estimate.
    /// It also sends the keep-alive pings and notices idle timeouts.
    fn init_tick(&self) -> JoinHandle<()> {
        let address = self.address;
        let closer = self.disconnect.clone();
        let session = self.session.clone();
        let socket = self.socket.clone();
        let state = self.state.clone();
        let notifier = self.notifier.clone();
        let mut last_ping = Instant::now();

        task::spawn(async move {
            loop {
                let interval = session.lock().await.resend_interval();

                macro_rules! tick_body {
                    () => {
                        let now = Instant::now();
                        let mut s = session.lock().await;

                        if now.duration_since(last_ping) >= PING_INTERVAL {
                            let ping = ConnectedPing {
                                time: current_epoch() as i64,
                            };
                            if let Ok(buf) = OnlinePacket::from(ping).write_to_bytes() {
                                if let Err(e) = s.send(buf.as_slice(), Reliability::Unreliable, 0, now) {
                                    rakrs_debug!("[{}] Failed to send ping: {}", to_address_token(address), e);
                                }
                            }
                            last_ping = now;
                        }

                        if let Err(e) = s.tick(now) {
                            rakrs_debug!("[{}] Connection closed by tick: {}", to_address_token(address), e);
                            drop(s);
                            *state.lock().await = ConnectionState::Disconnecting;
                            closer.notify().await;
                            break;
                        }

                        if let Err(e) = flush(&mut s, &socket, address).await {
                            rakrs_debug!("[{}] {}", to_address_token(address), e);
                            drop(s);
                            *state.lock().await = ConnectionState::Disconnecting;
                            closer.notify().await;
                            break;
                        }
                    };
                }

                #[cfg(feature = "async_std")]
                select! {
                    _ = closer.wait().fuse() => {
                        rakrs_debug!(true, "[{}] [task: tick] Connection has been closed due to closer!", to_address_token(address));
                        break;
                    }
                    _ = sleep(interval).fuse() => {
                        tick_body!();
                    }
                }

                #[cfg(feature = "async_tokio")]
                select! {
                    _ = closer.wait() => {
                        rakrs_debug!(true, "[{}] [task: tick] Connection has been closed due to closer!", to_address_token(address));
                        break;
                    }
                    _ = sleep(interval) => {
                        tick_body!();
                    }
                }
            }

            // the listener may already be gone
            let _ = notifier.try_send(address);
            rakrs_debug!(
                true,
                "[{}] Connection has been cleaned up!",
                to_address_token(address)
            );
        })
    }

    /// Spawns the task that feeds datagrams from the listener into the session.
    fn init_net_recv(
        &self,
        #[cfg(feature = "async_std")] net: Receiver<Vec<u8>>,
        #[cfg(feature = "async_tokio")] mut net: Receiver<Vec<u8>>,
        sender: Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        let session = self.session.clone();
        let socket = self.socket.clone();
        let disconnect = self.disconnect.clone();
        let state = self.state.clone();
        let address = self.address;

        task::spawn(async move {
            loop {
                macro_rules! handle_payload {
                    ($payload: ident) => {
                        let mut s = session.lock().await;
                        let now = Instant::now();

                        let payloads = match s.handle_datagram(&$payload, now) {
                            Ok(payloads) => payloads,
                            Err(e) => {
                                rakrs_debug!("[{}] Connection closed: {}", to_address_token(address), e);
                                drop(s);
                                *state.lock().await = ConnectionState::Disconnecting;
                                disconnect.notify().await;
                                break;
                            }
                        };

                        let mut close = false;
                        let mut forward = Vec::with_capacity(payloads.len());
                        for buffer in payloads {
                            match Connection::process_packet(&buffer, &address, &mut s, &state, now).await {
                                Ok(PacketAction::Forward) => forward.push(buffer),
                                Ok(PacketAction::Consumed) => {}
                                Ok(PacketAction::Close) => {
                                    close = true;
                                    break;
                                }
                                Err(e) => {
                                    rakrs_debug!("[{}] Failed to process packet: {}", to_address_token(address), e);
                                    if e.is_fatal() {
                                        close = true;
                                        break;
                                    }
                                }
                            }
                        }

                        if let Err(e) = flush(&mut s, &socket, address).await {
                            rakrs_debug!("[{}] {}", to_address_token(address), e);
                            close = true;
                        }

                        if close {
                            s.close();
                        }
                        // a slow reader must not hold up sends and the resend timer
                        drop(s);

                        for buffer in forward {
                            if sender.send(buffer).await.is_err() {
                                rakrs_debug!(
                                    "[{}] Failed to forward packet to recv channel...",
                                    to_address_token(address)
                                );
                                break;
                            }
                        }

                        if close {
                            *state.lock().await = ConnectionState::Disconnecting;
                            disconnect.notify().await;
                            break;
                        }
                    };
                }

                #[cfg(feature = "async_std")]
                select! {
                    _ = disconnect.wait().fuse() => {
                        rakrs_debug!(true, "[{}] [task: net_recv] Connection has been closed due to closer!", to_address_token(address));
                        break;
                    }
                    res = net.recv().fuse() => {
                        match res {
                            Ok(payload) => {
                                handle_payload!(payload);
                            }
                            Err(_) => break,
                        }
                    }
                };

                #[cfg(feature = "async_tokio")]
                select! {
                    _ = disconnect.wait() => {
                        rakrs_debug!(true, "[{}] [task: net_recv] Connection has been closed due to closer!", to_address_token(address));
                        break;
                    }
                    res = net.recv() => {
                        match res {
                            Some(payload) => {
                                handle_payload!(payload);
                            }
                            None => break,
                        }
                    }
                };
            }
        })
    }

    /// Handles the online control packets, telling the caller whether the
    /// payload belongs to the application instead.
    async fn process_packet(
        buffer: &[u8],
        address: &SocketAddr,
        session: &mut Session,
        state: &Arc<Mutex<ConnectionState>>,
        now: Instant,
    ) -> Result<PacketAction, ConnectionError> {
        let id = match buffer.first() {
            Some(id) => *id,
            None => return Ok(PacketAction::Consumed),
        };

        if OnlinePacket::is_control(id) {
            if let Ok(online_packet) = OnlinePacket::read_from_slice(buffer) {
                match online_packet {
                    OnlinePacket::ConnectedPing(pk) => {
                        let response = ConnectedPong {
                            ping_time: pk.time,
                            pong_time: current_epoch() as i64,
                        };
                        send_online(session, response.into(), Reliability::Unreliable, now)?;
                        return Ok(PacketAction::Consumed);
                    }
                    OnlinePacket::ConnectionRequest(pk) => {
                        let internal_ids = vec![
                            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)), 19132);
                            10
                        ];
                        let response = ConnectionAccept {
                            system_index: 0,
                            client_address: *address,
                            internal_ids,
                            request_time: pk.time,
                            timestamp: current_epoch() as i64,
                        };
                        *state.lock().await = ConnectionState::Connecting;
                        send_online(session, response.into(), Reliability::Reliable, now)?;
                        return Ok(PacketAction::Consumed);
                    }
                    OnlinePacket::NewConnection(_) => {
                        *state.lock().await = ConnectionState::Connected;
                        return Ok(PacketAction::Consumed);
                    }
                    OnlinePacket::Disconnect(_) | OnlinePacket::LostConnection(_) => {
                        rakrs_debug!(
                            "[{}] Client disconnected!",
                            to_address_token(*address)
                        );
                        return Ok(PacketAction::Close);
                    }
                    OnlinePacket::ConnectedPong(_) | OnlinePacket::ConnectionAccept(_) => {
                        return Ok(PacketAction::Consumed);
                    }
                }
            }
        }

        Ok(PacketAction::Forward)
    }

    /// This method is used to recieve packets from the client connection.
    /// Packets that are recieved here are packets sent by the peer expected
    /// to be handled by the server, after reassembly and in channel order.
    ///
    /// Returns [`ConnectionError::Closed`] once the connection is closed and
    /// every payload received before that has been read.
    pub async fn recv(&self) -> Result<Vec<u8>, ConnectionError> {
        #[allow(unused_mut)]
        let mut q = self.internal_net_recv.lock().await;

        // buffered payloads win over the close signal
        #[cfg(feature = "async_std")]
        let result = select_biased! {
            packet = q.recv().fuse() => packet.map_err(|_| ConnectionError::Closed),
            _ = self.disconnect.wait().fuse() => Err(ConnectionError::Closed),
        };

        #[cfg(feature = "async_tokio")]
        let result = select! {
            biased;
            packet = q.recv() => packet.ok_or(ConnectionError::Closed),
            _ = self.disconnect.wait() => Err(ConnectionError::Closed),
        };

        result
    }

    /// This method is used to send payloads to the connection. The payload is
    /// split to fit the MTU of the connection and sent with the given
    /// reliability on the given order channel (`0..32`).
    ///
    /// # Example
    /// ```ignore
    /// use rak_server::connection::Connection;
    /// use rak_server::protocol::reliability::Reliability;
    ///
    /// async fn send_payload(conn: Connection) {
    ///     conn.send(&[0xfe, 0x01, 0x02], Reliability::ReliableOrd, 0).await.unwrap();
    /// }
    /// ```
    pub async fn send(
        &self,
        buffer: &[u8],
        reliability: Reliability,
        channel: u8,
    ) -> Result<(), ConnectionError> {
        let mut s = self.session.lock().await;
        if let Err(e) = s.send(buffer, reliability, channel, Instant::now()) {
            if e.is_fatal() {
                drop(s);
                *self.state.lock().await = ConnectionState::Disconnecting;
                self.disconnect.notify().await;
            }
            return Err(e);
        }
        flush(&mut s, &self.socket, self.address).await
    }

    pub async fn get_state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.is_closed()
    }

    /// The current round trip time estimate of the connection.
    pub async fn rtt(&self) -> Duration {
        self.session.lock().await.engine().rtt()
    }

    /// Sends a disconnect notification to the peer, then stops both tasks and
    /// discards everything still pending.
    pub async fn close(&self) {
        rakrs_debug!(
            true,
            "[{}] Dropping connection!",
            to_address_token(self.address)
        );

        {
            let mut s = self.session.lock().await;
            if s.is_active() {
                let _ = send_online(&mut s, Disconnect {}.into(), Reliability::Unreliable, Instant::now());
                if let Err(e) = flush(&mut s, &self.socket, self.address).await {
                    rakrs_debug!(
                        "[{}] Failed to send disconnect packet when closing! {}",
                        to_address_token(self.address),
                        e
                    );
                }
            }
            s.close();
        }

        self.disconnect.notify().await;

        for task in self.tasks.lock().await.drain(..) {
            #[cfg(feature = "async_std")]
            task.cancel().await;
            #[cfg(feature = "async_tokio")]
            task.abort();
        }

        *self.state.lock().await = ConnectionState::Disconnected;
        let _ = self.notifier.try_send(self.address);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        futures_executor::block_on(async {
            if *self.state.lock().await == ConnectionState::Disconnected {
                return;
            }
            self.close().await;
        });
    }
}

fn send_online(
    session: &mut Session,
    packet: OnlinePacket,
    reliability: Reliability,
    now: Instant,
) -> Result<(), ConnectionError> {
    let buf = packet
        .write_to_bytes()
        .map_err(|e| ConnectionError::Encode(e.to_string()))?;
    session.send(buf.as_slice(), reliability, 0, now)
}

/// Writes every datagram the session has queued to the socket. A send error
/// is fatal for the connection.
async fn flush(
    session: &mut Session,
    socket: &Arc<UdpSocket>,
    address: SocketAddr,
) -> Result<(), ConnectionError> {
    let datagrams = session.poll_transmit();
    // encoding failed and took the session down
    if session.state() == EngineState::Closing {
        return Err(ConnectionError::Closed);
    }
    for datagram in datagrams {
        if let Err(e) = socket.send_to(&datagram, address).await {
            return Err(session.fail(ConnectionError::Transport(e.to_string())));
        }
    }
    Ok(())
}
