use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::{Error, Message, Result, VehicleId};

/// The largest datagram the server will read.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Delivers messages to vehicles.
pub trait Transport: Send + Sync {
    /// Sends a message to a vehicle.
    fn send(&self, to: VehicleId, msg: &Message) -> Result<()>;
}

/// JSON datagrams over a single UDP socket, used for both directions.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

/// Keeps every message in memory instead of sending it.
/// Clones share the same outbox.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<(VehicleId, Message)>>>,
    failing: Arc<AtomicBool>,
}

impl UdpTransport {
    /// Binds the socket. `read_timeout` bounds how long [Self::recv] blocks.
    pub fn bind(addr: impl ToSocketAddrs, read_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(Self { socket })
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for one datagram. Returns `None` if the read timed out.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&self, to: VehicleId, msg: &Message) -> Result<()> {
        let bytes = msg.encode()?;
        let sent = self.socket.send_to(&bytes, to.addr())?;
        if sent != bytes.len() {
            return Err(Error::Send {
                to,
                kind: msg.kind(),
            });
        }
        debug!("Sent {} to {}", msg.kind(), to);
        Ok(())
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every subsequent send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<(VehicleId, Message)> {
        self.sent.lock().clone()
    }

    /// Removes and returns the messages sent so far.
    pub fn take(&self) -> Vec<(VehicleId, Message)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for MemoryTransport {
    fn send(&self, to: VehicleId, msg: &Message) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Send {
                to,
                kind: msg.kind(),
            });
        }
        self.sent.lock().push((to, msg.clone()));
        Ok(())
    }
}
