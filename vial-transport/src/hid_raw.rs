//! Raw HID transport for USB-connected VIA keyboards
//!
//! The VIA interface exposes 32-byte input and output reports. The device is
//! opened twice: one handle for writes, one moved into a dedicated reader
//! thread that forwards input reports to the receive callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::callbacks::CallbackSlots;
use crate::error::TransportError;
use crate::protocol::{hid, timing, REPORT_SIZE};
use crate::types::TransportDeviceInfo;
use crate::{CloseCallback, ReceiveCallback, Transport};

/// Raw HID transport
pub struct HidRawTransport {
    /// Output handle
    writer: Mutex<HidDevice>,
    /// Device information
    info: TransportDeviceInfo,
    callbacks: Arc<CallbackSlots>,
    connected: Arc<AtomicBool>,
    /// Shutdown flag for the reader thread
    shutdown: Arc<AtomicBool>,
}

impl HidRawTransport {
    /// Create a raw HID transport from two handles to the same interface
    ///
    /// # Arguments
    /// * `writer` - Handle used for output reports
    /// * `reader` - Handle moved into the reader thread
    /// * `info` - Device information
    pub fn new(
        writer: HidDevice,
        reader: HidDevice,
        info: TransportDeviceInfo,
    ) -> Result<Self, TransportError> {
        let callbacks = Arc::new(CallbackSlots::new());
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader_callbacks = callbacks.clone();
        let reader_connected = connected.clone();
        let reader_shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("hid-report-reader".into())
            .spawn(move || {
                run_reader_loop(reader, reader_callbacks, reader_connected, reader_shutdown)
            })
            .map_err(|e| TransportError::Internal(format!("spawn reader thread: {e}")))?;

        info!("Opened raw HID device {}", info.display_name());
        Ok(Self {
            writer: Mutex::new(writer),
            info,
            callbacks,
            connected,
            shutdown,
        })
    }
}

/// Forward input reports until shutdown or a read error
fn run_reader_loop(
    device: HidDevice,
    callbacks: Arc<CallbackSlots>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("HID reader thread started");
    // Report ID byte plus payload
    let mut buf = [0u8; REPORT_SIZE + 1];

    while !shutdown.load(Ordering::Relaxed) {
        match device.read_timeout(&mut buf, timing::READ_TIMEOUT_MS) {
            Ok(len) if len > 0 => {
                debug!("HID in {} bytes: {:02X?}", len, &buf[..len.min(8)]);
                callbacks.dispatch(&buf[..len]);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("HID read failed, treating device as disconnected: {}", e);
                connected.store(false, Ordering::SeqCst);
                callbacks.notify_closed();
                break;
            }
        }
    }

    debug!("HID reader thread exiting");
}

#[async_trait]
impl Transport for HidRawTransport {
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
        if report.len() > REPORT_SIZE {
            return Err(TransportError::ReportTooLarge {
                len: report.len(),
                max: REPORT_SIZE,
            });
        }

        let mut buf = [0u8; REPORT_SIZE + 1];
        buf[0] = hid::REPORT_ID;
        buf[1..=report.len()].copy_from_slice(report);
        debug!("HID out: {:02X?}", &buf[1..9]);

        self.writer.lock().write(&buf)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Closed raw HID device {}", self.info.display_name());
            self.callbacks.notify_closed();
        }
        Ok(())
    }

    fn set_receive_callback(&self, callback: Option<ReceiveCallback>) {
        self.callbacks.set_receive(callback);
    }

    fn set_close_callback(&self, callback: Option<CloseCallback>) {
        self.callbacks.set_close(callback);
    }
}

impl Drop for HidRawTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        debug!("HidRawTransport dropped, reader thread signalled to stop");
    }
}
