//! In-memory transport for tests and device simulations
//!
//! A [`MockTransport`] hands every written report to a responder closure and
//! delivers the returned report (zero-padded to the report size) to the
//! receive callback, either immediately or after a fixed delay. Delayed
//! responses are delivered by a single task, so they arrive in write order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::callbacks::CallbackSlots;
use crate::error::TransportError;
use crate::protocol::REPORT_SIZE;
use crate::types::{TransportDeviceInfo, TransportType};
use crate::{CloseCallback, ReceiveCallback, Transport};

type Responder = dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync;

/// Shared state between the transport and its delivery task
struct Delivery {
    callbacks: CallbackSlots,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Delivery {
    fn begin(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn deliver(&self, response: Option<Vec<u8>>) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(response) = response {
            self.callbacks.dispatch(&response);
        }
    }
}

/// Mock transport answering writes through a responder closure
pub struct MockTransport {
    info: TransportDeviceInfo,
    responder: Arc<Responder>,
    delivery: Arc<Delivery>,
    delay: Duration,
    queue: Mutex<Option<mpsc::UnboundedSender<(Instant, Option<Vec<u8>>)>>>,
    written: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockTransport {
    /// Create a mock whose responder maps each written report to an optional response
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            info: TransportDeviceInfo {
                vid: 0xFEED,
                pid: 0x0000,
                transport_type: TransportType::Mock,
                device_path: "mock".into(),
                serial: None,
                product_name: Some("Mock Keyboard".into()),
                usage_page: crate::protocol::hid::USAGE_PAGE,
                usage: crate::protocol::hid::USAGE,
            },
            responder: Arc::new(responder),
            delivery: Arc::new(Delivery {
                callbacks: CallbackSlots::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
            delay: Duration::ZERO,
            queue: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Create a mock that echoes every report back
    pub fn echo() -> Self {
        Self::new(|report| Some(report.to_vec()))
    }

    /// Deliver each response `delay` after its write
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// All reports written so far, unpadded
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    /// Forget recorded writes
    pub fn clear_written(&self) {
        self.written.lock().clear();
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Highest number of writes awaiting delivery at any one time
    pub fn max_in_flight(&self) -> usize {
        self.delivery.max_in_flight.load(Ordering::SeqCst)
    }

    /// Push an unsolicited inbound report
    pub fn inject(&self, report: &[u8]) {
        self.delivery.callbacks.dispatch(&pad(report));
    }

    /// Simulate the device dropping off the bus
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.delivery.callbacks.notify_closed();
    }

    fn enqueue(&self, response: Option<Vec<u8>>) {
        let mut queue = self.queue.lock();
        let sender = queue.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_delivery(rx, self.delivery.clone()));
            tx
        });
        if sender.send((Instant::now() + self.delay, response)).is_err() {
            debug!("Mock delivery task gone, dropping response");
        }
    }
}

async fn run_delivery(
    mut rx: mpsc::UnboundedReceiver<(Instant, Option<Vec<u8>>)>,
    delivery: Arc<Delivery>,
) {
    while let Some((due, response)) = rx.recv().await {
        sleep_until(due).await;
        delivery.deliver(response);
    }
}

fn pad(report: &[u8]) -> Vec<u8> {
    let mut padded = report.to_vec();
    if padded.len() < REPORT_SIZE {
        padded.resize(REPORT_SIZE, 0);
    }
    padded
}

#[async_trait]
impl Transport for MockTransport {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&self, report: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::HidError("mock write failure".into()));
        }
        self.written.lock().push(report.to_vec());

        let response = (self.responder)(report).map(|r| pad(&r));
        self.delivery.begin();
        if self.delay.is_zero() {
            self.delivery.deliver(response);
        } else {
            self.enqueue(response);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.delivery.callbacks.notify_closed();
        }
        Ok(())
    }

    fn set_receive_callback(&self, callback: Option<ReceiveCallback>) {
        self.delivery.callbacks.set_receive(callback);
    }

    fn set_close_callback(&self, callback: Option<CloseCallback>) {
        self.delivery.callbacks.set_close(callback);
    }
}
