//! Transport - where orders come from and how clients send them.
//!
//! The engine pulls from an [`OrderSource`]; clients push through an
//! [`OrderTransport`]. Both have a UDP implementation (one order per
//! datagram) and in-process implementations for tests and replay.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::mpsc;

use tracing::{debug, trace};

use crate::codec;
use crate::command::Order;
use crate::config::TransportConfig;
use crate::error::{EngineError, Result};

/// Inbound order stream.
pub trait OrderSource {
    /// Next order in arrival order. `Ok(None)` means the input is over.
    fn recv(&mut self) -> Result<Option<Order>>;
}

/// Outbound order stream.
pub trait OrderTransport {
    fn send(&mut self, order: &Order) -> Result<()>;
}

impl<S: OrderSource + ?Sized> OrderSource for Box<S> {
    fn recv(&mut self) -> Result<Option<Order>> {
        (**self).recv()
    }
}

impl<T: OrderTransport + ?Sized> OrderTransport for Box<T> {
    fn send(&mut self, order: &Order) -> Result<()> {
        (**self).send(order)
    }
}

// ============================================================================
// UDP
// ============================================================================

/// Server side: receives datagrams until the socket stays quiet for the
/// configured timeout.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpReceiver {
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.address)?;
        socket.set_read_timeout(Some(config.recv_timeout))?;
        debug!(addr = %socket.local_addr()?, timeout = ?config.recv_timeout, "listening");
        Ok(Self {
            socket,
            buf: vec![0; codec::MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl OrderSource for UdpReceiver {
    fn recv(&mut self) -> Result<Option<Order>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, peer)) => {
                let order = codec::decode(&self.buf[..len])?;
                trace!(%peer, kind = %order.kind, "order received");
                Ok(Some(order))
            }
            // Read timeouts surface as either kind depending on platform
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!("receive timed out, input exhausted");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Client side: sends each order as one datagram to the server.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
}

impl UdpSender {
    pub fn connect(config: &TransportConfig) -> Result<Self> {
        let local: SocketAddr = match config.address {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(config.address)?;
        debug!(peer = %config.address, "sender connected");
        Ok(Self { socket })
    }
}

impl OrderTransport for UdpSender {
    fn send(&mut self, order: &Order) -> Result<()> {
        let bytes = codec::encode(order)?;
        self.socket.send(&bytes)?;
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Yields the orders of an iterator, then reports the input as over.
#[derive(Debug, Clone)]
pub struct IterSource<I>(I);

impl<I> IterSource<I> {
    pub fn new(orders: impl IntoIterator<IntoIter = I>) -> Self {
        Self(orders.into_iter())
    }
}

impl<I: Iterator<Item = Order>> OrderSource for IterSource<I> {
    fn recv(&mut self) -> Result<Option<Order>> {
        Ok(self.0.next())
    }
}

/// Input ends when every sender has been dropped.
impl OrderSource for mpsc::Receiver<Order> {
    fn recv(&mut self) -> Result<Option<Order>> {
        Ok(mpsc::Receiver::recv(self).ok())
    }
}

impl OrderTransport for mpsc::Sender<Order> {
    fn send(&mut self, order: &Order) -> Result<()> {
        mpsc::Sender::send(self, order.clone()).map_err(|_| {
            EngineError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "order receiver dropped"))
        })
    }
}

impl OrderTransport for Vec<Order> {
    fn send(&mut self, order: &Order) -> Result<()> {
        self.push(order.clone());
        Ok(())
    }
}
