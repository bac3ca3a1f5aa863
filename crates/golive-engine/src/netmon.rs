//! Network availability monitor.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

/// Interval between reachability probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// Per-probe connect timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Watches reachability of an endpoint and reports transitions.
///
/// A background thread opens (and immediately drops) a TCP connection to
/// the probe address on an interval; the callback fires only when
/// availability flips, never on every poll. The callback runs on the
/// monitor thread, so it must only re-dispatch — the engine hands it a
/// channel sender and nothing else.
pub struct NetworkMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    /// Begin monitoring `probe_addr` (a `host:port` pair).
    ///
    /// Availability is assumed until the first probe says otherwise.
    pub fn start<F>(probe_addr: String, interval: Duration, on_change: F) -> Self
    where
        F: Fn(bool) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("golive-netmon".to_string())
            .spawn(move || {
                info!(addr = %probe_addr, "Network monitor started");
                let mut available = true;

                while !stop_flag.load(Ordering::SeqCst) {
                    let now_available = probe(&probe_addr);
                    if now_available != available {
                        debug!(available = now_available, "Network availability changed");
                        available = now_available;
                        on_change(available);
                    }
                    thread::sleep(interval);
                }

                info!("Network monitor stopped");
            })
            .expect("failed to spawn network monitor thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Deregister and join the monitor thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn probe(addr: &str) -> bool {
    let resolved = match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            warn!(addr = %addr, "Probe address resolution failed: {}", e);
            None
        }
    };

    match resolved {
        Some(socket_addr) => TcpStream::connect_timeout(&socket_addr, PROBE_TIMEOUT).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::net::TcpListener;

    #[test]
    fn reports_loss_as_a_single_transition() {
        // Nothing listens on this port, so the first probe flips to false
        // and later probes stay silent.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (tx, rx) = unbounded();
        let mut monitor =
            NetworkMonitor::start(addr, Duration::from_millis(10), move |available| {
                let _ = tx.send(available);
            });

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), false);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        monitor.stop();
    }

    #[test]
    fn reports_recovery_when_the_endpoint_returns() {
        let probe_port;
        {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            probe_port = listener.local_addr().unwrap().port();
        }
        let addr = format!("127.0.0.1:{probe_port}");

        let (tx, rx) = unbounded();
        let mut monitor =
            NetworkMonitor::start(addr, Duration::from_millis(10), move |available| {
                let _ = tx.send(available);
            });

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), false);

        let _listener = TcpListener::bind(("127.0.0.1", probe_port)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), true);
        monitor.stop();
    }

    #[test]
    fn stop_joins_the_thread() {
        let (tx, _rx) = unbounded();
        let mut monitor = NetworkMonitor::start(
            "127.0.0.1:1".to_string(),
            Duration::from_millis(10),
            move |available| {
                let _ = tx.send(available);
            },
        );
        monitor.stop();
        monitor.stop(); // idempotent
    }
}
