use crate::types::{LogSink, MAX_DATAGRAM, ProbeError, packet_line};
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::{net::UdpSocket, sync::watch, task::JoinHandle};

/// Receive-and-log server. At most one receive loop runs at a time; the loop
/// lives until `stop` signals it or the process ends.
pub struct Server {
    inner: Mutex<Option<Running>>,
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Binds `bind` and spawns the receive task. Fails without touching the
    /// running state when the server is already up or the bind is refused.
    /// Returns the bound address, which carries the actual port.
    pub async fn start(&self, bind: SocketAddr, log: LogSink) -> Result<SocketAddr, ProbeError> {
        if bind.port() == 0 {
            return Err(ProbeError::InvalidArgument(
                "no port or illegal port value provided".to_string(),
            ));
        }
        if self.inner.lock().is_some() {
            return Err(ProbeError::AlreadyRunning);
        }

        let socket = UdpSocket::bind(bind).await.map_err(|source| ProbeError::Bind {
            port: bind.port(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| ProbeError::Bind {
            port: bind.port(),
            source,
        })?;

        let mut inner = self.inner.lock();
        // Re-check: a concurrent start may have won while we were binding.
        if inner.is_some() {
            return Err(ProbeError::AlreadyRunning);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(recv_loop(socket, log, shutdown_rx));
        *inner = Some(Running {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Signals the receive task and waits for it to drop the socket, which
    /// releases the port. Stopping an idle server is reported as an error.
    pub async fn stop(&self) -> Result<(), ProbeError> {
        let running = self.inner.lock().take().ok_or(ProbeError::NotRunning)?;
        let _ = running.shutdown_tx.send(true);
        let _ = running.task.await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().as_ref().map(|running| running.local_addr)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

async fn recv_loop(socket: UdpSocket, log: LogSink, mut shutdown_rx: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            recv = socket.recv_from(&mut buf) => {
                match recv {
                    Ok((len, src)) if len >= 2 => {
                        log.line(&packet_line("recv", src.ip(), len as u64, [buf[0], buf[1]]));
                    }
                    // Too short to carry a sequence number, or the read failed.
                    Ok(_) | Err(_) => log.line("error"),
                }
            }
        }
    }
}
