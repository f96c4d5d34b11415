//! The UDP front end: receives vehicle messages and feeds them to the policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::light::TrafficLightController;
use crate::policy::AdmissionPolicy;
use crate::transport::MAX_DATAGRAM;
use crate::{
    Clock, Message, ParallelController, PolicyKind, Result, SequentialController, ServerConfig,
    SystemClock, Transport, UdpTransport,
};

/// How long a receive blocks before the server checks for shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// An intersection manager bound to its socket.
pub struct Server {
    transport: Arc<UdpTransport>,
    policy: Arc<dyn AdmissionPolicy>,
    stopped: Arc<AtomicBool>,
}

/// Stops a running [Server] from another thread.
#[derive(Clone, Debug)]
pub struct ServerHandle(Arc<AtomicBool>);

/// Builds the configured admission policy.
pub fn build_policy(
    config: &ServerConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn AdmissionPolicy>> {
    let policy: Arc<dyn AdmissionPolicy> = match config.policy {
        PolicyKind::Sequential => Arc::new(
            SequentialController::new(transport, clock, config.lease)
                .with_idle_poll(config.idle_poll()),
        ),
        PolicyKind::Parallel => Arc::new(ParallelController::new(
            config.layout()?,
            transport,
            clock,
            config.lease,
        )),
        PolicyKind::TrafficLight => Arc::new(TrafficLightController::new(
            config.layout()?,
            config.rotation,
            transport,
            clock,
        )?),
    };
    Ok(policy)
}

impl Server {
    /// Binds the listening socket and sets up the configured policy.
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(UdpTransport::bind(config.listen_addr(), RECV_TIMEOUT)?);
        let policy = build_policy(config, transport.clone(), Arc::new(SystemClock))?;
        info!(
            "Starting {} intersection manager on {}",
            policy.name(),
            transport.local_addr()?
        );
        Ok(Self {
            transport,
            policy,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The address the server listens on.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle that can stop the server.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle(self.stopped.clone())
    }

    /// Serves until stopped through a [ServerHandle].
    pub fn run(self) -> Result<()> {
        let workers = self.policy.clone().spawn_workers()?;
        let mut buf = vec![0; MAX_DATAGRAM];

        while !self.stopped.load(Ordering::Acquire) {
            let (len, from) = match self.transport.recv(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(e) => {
                    error!("Receive failed: {e}");
                    continue;
                }
            };
            match Message::decode(&buf[..len]) {
                Ok(msg) => {
                    debug!("Received {} from {} ({from})", msg.kind(), msg.vehicle());
                    self.policy.handle(msg);
                }
                Err(e) => warn!("Discarding {len} byte datagram from {from}: {e}"),
            }
        }

        info!("Shutting down");
        self.policy.shutdown();
        for worker in workers {
            if worker.join().is_err() {
                error!("A worker thread panicked");
            }
        }
        Ok(())
    }
}

impl ServerHandle {
    /// Asks the server to stop after its current receive.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}
