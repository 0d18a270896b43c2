use crate::types::{LogSink, MAX_DATAGRAM, ProbeError, packet_line};
use rand::Rng;
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    sync::watch,
    time::{Instant, sleep_until},
};

/// Parameters of one transmit session.
#[derive(Debug, Clone)]
pub struct BurstConfig {
    pub dest: SocketAddr,
    pub data_len: usize,
    pub delay_ms: u64,
    pub count: u16,
}

impl BurstConfig {
    fn validate(&self) -> Result<(), ProbeError> {
        if self.dest.port() == 0 {
            return Err(ProbeError::InvalidArgument(
                "no port or illegal port value provided".to_string(),
            ));
        }
        if self.data_len == 0 || self.data_len > MAX_DATAGRAM {
            return Err(ProbeError::InvalidArgument(format!(
                "invalid data_len {}",
                self.data_len
            )));
        }
        if self.delay_ms == 0 {
            return Err(ProbeError::InvalidArgument(format!(
                "invalid delay {}",
                self.delay_ms
            )));
        }
        if self.count == 0 {
            return Err(ProbeError::InvalidArgument(format!(
                "invalid count {}",
                self.count
            )));
        }
        Ok(())
    }
}

/// Sends `config.count` sequence-stamped datagrams on a jittered periodic
/// schedule. Individual send failures are logged and do not end the burst;
/// only argument validation and socket creation can fail the call. Observing
/// `true` on `shutdown_rx` between packets ends the session early.
pub async fn run_burst(
    config: BurstConfig,
    log: LogSink,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ProbeError> {
    config.validate()?;

    let bind_addr: SocketAddr = match config.dest.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(ProbeError::SocketCreate)?;

    let delay_us = config.delay_ms * 1_000;
    let delay_base = delay_us - delay_us / 2;
    let delay_range = delay_us;

    // Desynchronizes senders started at the same instant.
    let head_start = {
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..=config.delay_ms))
    };
    let mut wakeup = Instant::now() + head_start;
    let mut buf = vec![0u8; config.data_len];

    for seq in 0..config.count {
        fill_sequence(&mut buf, seq);
        if seq > 0 {
            let step = {
                let mut rng = rand::rng();
                jittered_step(delay_base, delay_range, &mut rng)
            };
            // Deadlines advance from the previous deadline, not from send
            // completion.
            wakeup += Duration::from_micros(step);
        }
        if !wait_until(wakeup, &mut shutdown_rx).await {
            return Ok(());
        }

        let lead = [buf[0], buf.get(1).copied().unwrap_or(0)];
        match socket.send_to(&buf, config.dest).await {
            Ok(sent) => {
                log.line(&packet_line("send", config.dest.ip(), sent as u64, lead));
            }
            Err(err) => {
                let code = err.raw_os_error().map_or(0, i32::unsigned_abs);
                log.line(&packet_line("error", config.dest.ip(), u64::from(code), lead));
            }
        }
    }

    Ok(())
}

/// Stamps the 16-bit big-endian sequence number at every even offset. A
/// one-byte buffer takes only the high byte.
pub fn fill_sequence(buf: &mut [u8], seq: u16) {
    let seq = seq.to_be_bytes();
    for pair in buf.chunks_mut(2) {
        pair[0] = seq[0];
        if let Some(low) = pair.get_mut(1) {
            *low = seq[1];
        }
    }
}

fn jittered_step(delay_base: u64, delay_range: u64, rng: &mut impl Rng) -> u64 {
    if delay_range == 0 {
        delay_base
    } else {
        delay_base + rng.random_range(0..delay_range)
    }
}

async fn wait_until(deadline: Instant, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        tokio::select! {
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    return false;
                }
            }
            _ = sleep_until(deadline) => return true,
        }
    }
}
