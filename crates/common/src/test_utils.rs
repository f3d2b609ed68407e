//! Test utilities for usbwall
//!
//! Helpers shared by the unit and integration tests of every crate.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{reference_identity, variant_product};
//!
//! let allowed = reference_identity();
//! let lookalike = variant_product(&allowed, 0x6545);
//! assert_ne!(allowed, lookalike);
//! ```

use crate::channel::ObservedDevice;
use crate::trace::TRACE_PREFIX;
use protocol::DeviceIdentity;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Serial of the reference pen drive used across tests
pub const REFERENCE_SERIAL: &str = "001D92DC4AF0C95163A2092C";

/// The reference pen drive: 0930:6544 with [`REFERENCE_SERIAL`]
pub fn reference_identity() -> DeviceIdentity {
    DeviceIdentity::new(0x0930, 0x6544, REFERENCE_SERIAL)
}

/// Same device with a different product ID
pub fn variant_product(identity: &DeviceIdentity, product_id: u16) -> DeviceIdentity {
    DeviceIdentity::new(
        identity.vendor_id(),
        product_id,
        identity.serial_number().clone(),
    )
}

/// Same device with a different serial
pub fn variant_serial(identity: &DeviceIdentity, serial: &str) -> DeviceIdentity {
    DeviceIdentity::new(identity.vendor_id(), identity.product_id(), serial)
}

/// A batch of distinct identities from one vendor
pub fn identity_batch(count: u16) -> Vec<DeviceIdentity> {
    (0..count)
        .map(|i| DeviceIdentity::new(0x1234, i, format!("SN{:06}", i)))
        .collect()
}

/// Wrap an identity as if it had been seen on bus 1
pub fn observed(device_address: u8, identity: DeviceIdentity) -> ObservedDevice {
    ObservedDevice {
        bus_number: 1,
        device_address,
        identity,
    }
}

/// Run a future with a timeout
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Formatted `tracing` output collected on one thread
///
/// ```
/// use common::test_utils::TraceCapture;
/// use common::{TraceLevel, diag_trace};
///
/// let capture = TraceCapture::new();
/// capture.capture(|| diag_trace!(TraceLevel::Error, "disk on fire"));
/// assert_eq!(capture.trace_lines().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct TraceCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl TraceCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this capture as the current thread's subscriber
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Every captured line
    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Captured lines that came from the diagnostic trace
    pub fn trace_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(TRACE_PREFIX))
            .collect()
    }
}

impl io::Write for TraceCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for TraceCapture {
    type Writer = TraceCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
