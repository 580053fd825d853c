use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostpulse_core::{MetricValue, ProbeConfig, REASON_NETWORK_ERROR};
use thiserror::Error;
use tracing::debug;

use crate::sensors::Sensor;

/// Timeout on the outbound-interface discovery socket
const FALLBACK_SOCKET_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("resolution failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no IPv4 address for {0}")]
    NoIpv4(String),
    #[error("resolution timed out after {0:?}")]
    TimedOut(Duration),
    #[error("resolver thread exited")]
    Interrupted,
    #[error("previous lookup still running")]
    LookupPending,
}

/// OS-facing half of the network identity lookup
pub trait AddressResolver: Send + Sync {
    /// IPv4 address the local hostname resolves to
    fn resolve_hostname(&self) -> Result<Ipv4Addr, ResolveError>;

    /// Local address the OS picks for outbound traffic
    fn outbound_address(&self) -> Result<Ipv4Addr, ResolveError>;
}

pub struct SystemResolver {
    fallback_target: String,
    timeout: Duration,
    lookup_pending: Arc<AtomicBool>,
}

impl SystemResolver {
    pub fn new(fallback_target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fallback_target: fallback_target.into(),
            timeout,
            lookup_pending: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Clears the pending flag when the lookup thread finishes or unwinds
struct PendingGuard(Arc<AtomicBool>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run a blocking lookup on a helper thread and wait at most `timeout`.
///
/// A lookup that outlives its timeout keeps running detached. Until it
/// returns, further calls fail with [`ResolveError::LookupPending`] instead
/// of spawning another thread, so a hung resolver costs one thread at most.
fn bounded_lookup<T, F>(
    pending: &Arc<AtomicBool>,
    timeout: Duration,
    lookup: F,
) -> Result<T, ResolveError>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    if pending.swap(true, Ordering::AcqRel) {
        return Err(ResolveError::LookupPending);
    }

    let guard = PendingGuard(Arc::clone(pending));
    let (tx, rx) = channel();
    thread::Builder::new()
        .name("hostname-lookup".to_string())
        .spawn(move || {
            // Declared after tx so an unwinding lookup clears the flag first
            let tx = tx;
            let guard = guard;
            let result = lookup();
            drop(guard);
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(RecvTimeoutError::Timeout) => Err(ResolveError::TimedOut(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(ResolveError::Interrupted),
    }
}

impl AddressResolver for SystemResolver {
    fn resolve_hostname(&self) -> Result<Ipv4Addr, ResolveError> {
        let host = hostname::get()?.to_string_lossy().into_owned();

        // getaddrinfo has no timeout of its own, so bound it from outside
        let lookup = host.clone();
        let addrs = bounded_lookup(&self.lookup_pending, self.timeout, move || {
            (lookup.as_str(), 0u16)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>())
        })?;

        addrs
            .into_iter()
            .find_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or(ResolveError::NoIpv4(host))
    }

    fn outbound_address(&self) -> Result<Ipv4Addr, ResolveError> {
        // UDP connect sends nothing; it only makes the OS choose a route
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_read_timeout(Some(FALLBACK_SOCKET_TIMEOUT))?;
        socket.set_write_timeout(Some(FALLBACK_SOCKET_TIMEOUT))?;
        socket.connect(self.fallback_target.as_str())?;

        match socket.local_addr()?.ip() {
            IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
            other => Err(ResolveError::NoIpv4(other.to_string())),
        }
    }
}

/// Reports the host's primary non-loopback IPv4 address
pub struct NetworkSensor<R = SystemResolver> {
    resolver: R,
}

impl NetworkSensor<SystemResolver> {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(SystemResolver::new(
            config.fallback_target.clone(),
            config.timeout(),
        ))
    }
}

impl<R: AddressResolver> NetworkSensor<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

impl<R: AddressResolver> Sensor for NetworkSensor<R> {
    type Reading = MetricValue<String>;

    fn name(&self) -> &'static str {
        "network"
    }

    fn sample(&self) -> MetricValue<String> {
        let primary = match self.resolver.resolve_hostname() {
            Ok(ip) => ip,
            Err(e) => {
                debug!(error = %e, "Hostname resolution failed");
                return MetricValue::unavailable(REASON_NETWORK_ERROR);
            }
        };

        if !primary.is_loopback() {
            return MetricValue::available(primary.to_string());
        }

        match self.resolver.outbound_address() {
            Ok(ip) => MetricValue::available(ip.to_string()),
            Err(e) => {
                debug!(error = %e, "Outbound address discovery failed, re-resolving hostname");
                match self.resolver.resolve_hostname() {
                    Ok(ip) => MetricValue::available(ip.to_string()),
                    Err(e) => {
                        debug!(error = %e, "Hostname re-resolution failed");
                        MetricValue::unavailable(REASON_NETWORK_ERROR)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct MockResolver {
        hostname: Option<Ipv4Addr>,
        outbound: Option<Ipv4Addr>,
        hostname_calls: AtomicUsize,
        outbound_calls: AtomicUsize,
    }

    impl MockResolver {
        fn new(hostname: Option<Ipv4Addr>, outbound: Option<Ipv4Addr>) -> Self {
            Self {
                hostname,
                outbound,
                hostname_calls: AtomicUsize::new(0),
                outbound_calls: AtomicUsize::new(0),
            }
        }
    }

    impl AddressResolver for MockResolver {
        fn resolve_hostname(&self) -> Result<Ipv4Addr, ResolveError> {
            self.hostname_calls.fetch_add(1, Ordering::SeqCst);
            self.hostname
                .ok_or_else(|| ResolveError::NoIpv4("testhost".to_string()))
        }

        fn outbound_address(&self) -> Result<Ipv4Addr, ResolveError> {
            self.outbound_calls.fetch_add(1, Ordering::SeqCst);
            self.outbound
                .ok_or(ResolveError::TimedOut(FALLBACK_SOCKET_TIMEOUT))
        }
    }

    #[test]
    fn test_non_loopback_returned_directly() {
        let sensor = NetworkSensor::new(MockResolver::new(
            Some(Ipv4Addr::new(10, 1, 2, 3)),
            Some(Ipv4Addr::new(192, 168, 1, 50)),
        ));
        assert_eq!(sensor.sample(), MetricValue::available("10.1.2.3".to_string()));
        assert_eq!(sensor.resolver.outbound_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_loopback_uses_outbound_address() {
        let sensor = NetworkSensor::new(MockResolver::new(
            Some(Ipv4Addr::LOCALHOST),
            Some(Ipv4Addr::new(192, 168, 1, 50)),
        ));
        assert_eq!(sensor.sample(), MetricValue::available("192.168.1.50".to_string()));
    }

    #[test]
    fn test_any_127_address_counts_as_loopback() {
        let sensor = NetworkSensor::new(MockResolver::new(
            Some(Ipv4Addr::new(127, 0, 1, 1)),
            Some(Ipv4Addr::new(172, 16, 0, 9)),
        ));
        assert_eq!(sensor.sample(), MetricValue::available("172.16.0.9".to_string()));
    }

    #[test]
    fn test_fallback_failure_refetches_loopback() {
        let sensor = NetworkSensor::new(MockResolver::new(Some(Ipv4Addr::LOCALHOST), None));
        assert_eq!(sensor.sample(), MetricValue::available("127.0.0.1".to_string()));
        assert_eq!(sensor.resolver.hostname_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolution_failure_is_network_error() {
        let sensor = NetworkSensor::new(MockResolver::new(None, Some(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(sensor.sample(), MetricValue::unavailable("network error"));
        assert_eq!(sensor.resolver.outbound_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hung_lookup_blocks_new_threads_until_it_returns() {
        let pending = Arc::new(AtomicBool::new(false));
        let timeout = Duration::from_millis(50);

        let first = bounded_lookup(&pending, timeout, || {
            thread::sleep(Duration::from_millis(300));
            Ok(1u8)
        });
        assert!(matches!(first, Err(ResolveError::TimedOut(_))));

        let second = bounded_lookup(&pending, timeout, || Ok(2u8));
        assert!(matches!(second, Err(ResolveError::LookupPending)));

        thread::sleep(Duration::from_millis(600));
        assert!(!pending.load(Ordering::Acquire));
        assert_eq!(bounded_lookup(&pending, timeout, || Ok(3u8)).unwrap(), 3);
    }

    #[test]
    fn test_panicking_lookup_releases_pending_flag() {
        let pending = Arc::new(AtomicBool::new(false));
        let timeout = Duration::from_secs(2);

        let result: Result<u8, _> =
            bounded_lookup(&pending, timeout, || panic!("resolver crashed"));
        assert!(matches!(result, Err(ResolveError::Interrupted)));
        assert!(!pending.load(Ordering::Acquire));

        assert_eq!(bounded_lookup(&pending, timeout, || Ok(4u8)).unwrap(), 4);
    }
}
