//! Nordic UART Service tunnel transport
//!
//! Reports are carried over a BLE serial characteristic that accepts at most
//! [`ble::MTU`] bytes per write. Each report is split into zero-padded MTU
//! chunks. When the payload is empty or an exact multiple of the MTU, one
//! extra all-zero chunk follows so the peripheral can find the report end.
//!
//! The GATT stack itself is abstracted behind [`GattLink`]; the host BLE
//! integration forwards RX notifications through
//! [`NusTransport::handle_notification`] and link loss through
//! [`NusTransport::handle_disconnect`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::callbacks::CallbackSlots;
use crate::error::TransportError;
use crate::protocol::{ble, REPORT_SIZE};
use crate::types::TransportDeviceInfo;
use crate::{CloseCallback, ReceiveCallback, Transport};

/// Minimal GATT client operations needed by the tunnel
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Write one chunk to the NUS TX characteristic
    async fn write_chunk(&self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Drop the GATT connection
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Split a payload into zero-padded `mtu`-sized chunks
///
/// Appends one all-zero chunk when `payload` is empty or its length is an
/// exact multiple of `mtu`.
pub fn chunk_for_mtu(payload: &[u8], mtu: usize) -> Vec<Vec<u8>> {
    let mtu = mtu.max(1);
    let mut chunks: Vec<Vec<u8>> = payload
        .chunks(mtu)
        .map(|part| {
            let mut chunk = vec![0u8; mtu];
            chunk[..part.len()].copy_from_slice(part);
            chunk
        })
        .collect();
    if payload.len() % mtu == 0 {
        chunks.push(vec![0u8; mtu]);
    }
    chunks
}

/// BLE serial tunnel transport
pub struct NusTransport<L: GattLink> {
    link: L,
    info: TransportDeviceInfo,
    callbacks: CallbackSlots,
    connected: AtomicBool,
}

impl<L: GattLink> NusTransport<L> {
    /// Wrap an already-connected GATT link
    pub fn new(link: L, info: TransportDeviceInfo) -> Self {
        info!("BLE NUS connection opened: {}", info.display_name());
        Self {
            link,
            info,
            callbacks: CallbackSlots::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Feed an RX characteristic notification
    pub fn handle_notification(&self, value: &[u8]) {
        debug!("NUS in {} bytes", value.len());
        self.callbacks.dispatch(value);
    }

    /// Signal that the GATT server disconnected
    pub fn handle_disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("BLE NUS link lost");
            self.callbacks.notify_closed();
        }
    }
}

#[async_trait]
impl<L: GattLink> Transport for NusTransport<L> {
    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn report_size(&self) -> usize {
        REPORT_SIZE
    }

    async fn write(&self, report: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        debug!("NUS out: {:02X?}", &report[..report.len().min(8)]);
        for chunk in chunk_for_mtu(report, ble::MTU) {
            self.link.write_chunk(&chunk).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.link.disconnect().await?;
            info!("BLE NUS connection closed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportType;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingLink {
        chunks: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl GattLink for Arc<RecordingLink> {
        async fn write_chunk(&self, chunk: &[u8]) -> Result<(), TransportError> {
            self.chunks.lock().push(chunk.to_vec());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn info() -> TransportDeviceInfo {
        TransportDeviceInfo {
            vid: 0,
            pid: 0,
            transport_type: TransportType::BleNus,
            device_path: "ble".into(),
            serial: None,
            product_name: Some("(BMP) board".into()),
            usage_page: 0,
            usage: 0,
        }
    }

    #[test]
    fn test_chunk_partial_payload() {
        let chunks = chunk_for_mtu(&[1, 2, 3], 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(&chunks[0][..4], &[1, 2, 3, 0]);
    }

    #[test]
    fn test_chunk_exact_multiple_appends_terminator() {
        let payload = [0xAAu8; 40];
        let chunks = chunk_for_mtu(&payload, 20);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_chunk_empty_payload() {
        let chunks = chunk_for_mtu(&[], 20);
        assert_eq!(chunks, vec![vec![0u8; 20]]);
    }

    #[tokio::test]
    async fn test_report_is_chunked() {
        let link = Arc::new(RecordingLink::default());
        let transport = NusTransport::new(link.clone(), info());

        transport.write(&[0x11; 32]).await.unwrap();
        let chunks = link.chunks.lock();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[1][..12], &[0x11; 12]);
        assert!(chunks[1][12..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_disconnect_blocks_writes() {
        let link = Arc::new(RecordingLink::default());
        let transport = NusTransport::new(link, info());
        transport.handle_disconnect();
        assert!(matches!(
            transport.write(&[0x01]).await,
            Err(TransportError::Disconnected)
        ));
    }
}
