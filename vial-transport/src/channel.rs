//! Command channel and batch pipeline
//!
//! The VIA protocol carries no request tags: the next inbound report after a
//! write is taken to be that write's response. [`CommandChannel`] makes this
//! assumption hold by owning a per-connection exclusive scope held across
//! write+wait, for single commands and batches alike.
//!
//! Correlation itself lives in [`Inbox`], which has two hooks:
//!
//! - **Single** (default): the most recent inbound report replaces the slot.
//! - **Collect**: every inbound report is appended.
//!
//! A batch installs the collecting hook for its duration. The default hook is
//! restored when the guard drops, including on error paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::timing;
use crate::Transport;

// ============================================================================
// Configuration
// ============================================================================

/// Command channel timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long a single command waits for its response
    pub command_timeout: Duration,
    /// Interval between inbound polls
    pub poll_interval: Duration,
    /// Maximum outstanding writes before the batch waits for responses
    pub batch_window: usize,
    /// How long a batch waits without any new response before giving up
    pub batch_stall_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
            poll_interval: Duration::from_millis(timing::POLL_INTERVAL_MS),
            batch_window: timing::BATCH_WINDOW,
            batch_stall_timeout: Duration::from_millis(timing::BATCH_STALL_TIMEOUT_MS),
        }
    }
}

impl ChannelConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_window(mut self, window: usize) -> Self {
        self.batch_window = window.max(1);
        self
    }

    pub fn with_batch_stall_timeout(mut self, timeout: Duration) -> Self {
        self.batch_stall_timeout = timeout;
        self
    }
}

// ============================================================================
// Response correlation
// ============================================================================

enum Hook {
    Single(Option<Vec<u8>>),
    Collect(Vec<Vec<u8>>),
}

/// Positional response correlation for one connection
struct Inbox {
    hook: Mutex<Hook>,
}

impl Inbox {
    fn new() -> Self {
        Self {
            hook: Mutex::new(Hook::Single(None)),
        }
    }

    fn push(&self, report: &[u8]) {
        match &mut *self.hook.lock() {
            Hook::Single(slot) => *slot = Some(report.to_vec()),
            Hook::Collect(list) => list.push(report.to_vec()),
        }
    }

    fn take_single(&self) -> Option<Vec<u8>> {
        match &mut *self.hook.lock() {
            Hook::Single(slot) => slot.take(),
            Hook::Collect(_) => None,
        }
    }

    fn collected(&self) -> usize {
        match &*self.hook.lock() {
            Hook::Collect(list) => list.len(),
            Hook::Single(_) => 0,
        }
    }

    fn take_collected(&self) -> Vec<Vec<u8>> {
        match &mut *self.hook.lock() {
            Hook::Collect(list) => std::mem::take(list),
            Hook::Single(_) => Vec::new(),
        }
    }

    /// Install a fresh hook; the default single hook returns when the guard drops
    fn install(&self, hook: Hook) -> HookGuard<'_> {
        *self.hook.lock() = hook;
        HookGuard { inbox: self }
    }
}

struct HookGuard<'a> {
    inbox: &'a Inbox,
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        *self.inbox.hook.lock() = Hook::Single(None);
    }
}

// ============================================================================
// Command channel
// ============================================================================

/// Serialized command/response exchanges over one transport
///
/// At most one command or batch is in flight at any time. Concurrent callers
/// queue on the exchange lock and are never interleaved.
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    inbox: Arc<Inbox>,
    exchange_lock: tokio::sync::Mutex<()>,
    config: ChannelConfig,
}

impl CommandChannel {
    /// Create a channel with default timing
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    /// Create a channel with custom timing
    ///
    /// Takes over the transport's receive callback.
    pub fn with_config(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let inbox = Arc::new(Inbox::new());
        let sink = inbox.clone();
        transport.set_receive_callback(Some(Arc::new(move |report: &[u8]| sink.push(report))));
        Self {
            transport,
            inbox,
            exchange_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Get the timing configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Check if the transport is still connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the underlying transport
    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    /// Send one report and wait for the next inbound report
    ///
    /// # Returns
    /// The response report, or `TransportError::Timeout` if nothing arrived
    /// within the command timeout. A timeout leaves the connection open.
    pub async fn send(&self, report: &[u8]) -> Result<Vec<u8>, TransportError> {
        let _scope = self.exchange_lock.lock().await;
        let _hook = self.inbox.install(Hook::Single(None));

        self.write_or_close(report).await?;

        let start = Instant::now();
        loop {
            if let Some(response) = self.inbox.take_single() {
                debug!("Response for 0x{:02X}: {:02X?}", report[0], short(&response));
                return Ok(response);
            }
            if start.elapsed() >= self.config.command_timeout {
                warn!(
                    "Command 0x{:02X} timed out after {:?}",
                    report.first().copied().unwrap_or(0),
                    self.config.command_timeout
                );
                return Err(TransportError::Timeout);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Send many reports, collecting responses in send order
    ///
    /// Uses the configured stall timeout.
    pub async fn send_batch(&self, reports: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, TransportError> {
        self.send_batch_with_stall_timeout(reports, self.config.batch_stall_timeout)
            .await
    }

    /// Send many reports with at most `batch_window` outstanding writes
    ///
    /// After each window the batch waits until the number of collected
    /// responses reaches the number of reports sent so far. The wait gives up
    /// when no new response arrives for `stall_timeout`, and sending resumes.
    ///
    /// # Returns
    /// Exactly one response per report, positionally matched. A batch that
    /// ends with fewer responses than reports fails with
    /// `TransportError::BatchIncomplete`.
    pub async fn send_batch_with_stall_timeout(
        &self,
        reports: &[Vec<u8>],
        stall_timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        if reports.is_empty() {
            return Ok(Vec::new());
        }

        let _scope = self.exchange_lock.lock().await;
        let _hook = self.inbox.install(Hook::Collect(Vec::with_capacity(reports.len())));

        let window = self.config.batch_window.max(1);
        let mut sent = 0;
        for chunk in reports.chunks(window) {
            for report in chunk {
                self.write_or_close(report).await?;
                sent += 1;
            }
            self.wait_for_collected(sent, stall_timeout).await;
        }

        let mut responses = self.inbox.take_collected();
        if responses.len() < reports.len() {
            warn!(
                "Batch incomplete: {} of {} responses",
                responses.len(),
                reports.len()
            );
            return Err(TransportError::BatchIncomplete {
                expected: reports.len(),
                received: responses.len(),
            });
        }
        if responses.len() > reports.len() {
            debug!(
                "Dropping {} surplus batch responses",
                responses.len() - reports.len()
            );
            responses.truncate(reports.len());
        }
        debug!("Batch of {} complete", reports.len());
        Ok(responses)
    }

    /// Wait until `target` responses are collected or the count stalls
    async fn wait_for_collected(&self, target: usize, stall_timeout: Duration) -> bool {
        let mut last = self.inbox.collected();
        let mut since = Instant::now();
        loop {
            let count = self.inbox.collected();
            if count >= target {
                return true;
            }
            if count > last {
                last = count;
                since = Instant::now();
            } else if since.elapsed() >= stall_timeout {
                warn!("Batch stalled at {} of {} responses", count, target);
                return false;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn write_or_close(&self, report: &[u8]) -> Result<(), TransportError> {
        if report.is_empty() {
            return Err(TransportError::Internal("empty report".into()));
        }
        let max = self.transport.report_size();
        if report.len() > max {
            return Err(TransportError::ReportTooLarge {
                len: report.len(),
                max,
            });
        }
        if !self.transport.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if let Err(e) = self.transport.write(report).await {
            warn!("Write failed, closing transport: {}", e);
            if let Err(close_err) = self.transport.close().await {
                debug!("Close after write failure also failed: {}", close_err);
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.transport.set_receive_callback(None);
    }
}

fn short(report: &[u8]) -> &[u8] {
    &report[..report.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn fast_config() -> ChannelConfig {
        ChannelConfig::default()
            .with_command_timeout(Duration::from_millis(50))
            .with_batch_stall_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_send_returns_response() {
        let mock = Arc::new(MockTransport::echo());
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let response = channel.send(&[0x01, 0xAB]).await.unwrap();
        assert_eq!(&response[..2], &[0x01, 0xAB]);
        assert_eq!(mock.written(), vec![vec![0x01, 0xAB]]);
    }

    #[tokio::test]
    async fn test_send_times_out_and_stays_open() {
        let mock = Arc::new(MockTransport::new(|_| None));
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let err = channel.send(&[0x01]).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_write_failure_closes_transport() {
        let mock = Arc::new(MockTransport::echo());
        mock.set_fail_writes(true);
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let err = channel.send(&[0x01]).await.unwrap_err();
        assert!(matches!(err, TransportError::HidError(_)));
        assert!(!mock.is_connected());

        let err = channel.send(&[0x01]).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_oversized_report_rejected() {
        let mock = Arc::new(MockTransport::echo());
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let err = channel.send(&[0u8; 33]).await.unwrap_err();
        assert!(matches!(err, TransportError::ReportTooLarge { len: 33, max: 32 }));
        assert!(mock.written().is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_send_order() {
        let mock = Arc::new(MockTransport::echo().with_delay(Duration::from_millis(2)));
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let reports: Vec<Vec<u8>> = (0..10u8).map(|i| vec![0x12, i]).collect();
        let responses = channel.send_batch(&reports).await.unwrap();

        assert_eq!(responses.len(), 10);
        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response[1], i as u8);
        }
    }

    #[tokio::test]
    async fn test_batch_window_limits_outstanding_writes() {
        let mock = Arc::new(MockTransport::echo().with_delay(Duration::from_millis(3)));
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let reports: Vec<Vec<u8>> = (0..9u8).map(|i| vec![0x0E, i]).collect();
        channel.send_batch(&reports).await.unwrap();

        assert!(mock.max_in_flight() <= 3);
        assert_eq!(mock.written().len(), 9);
    }

    #[tokio::test]
    async fn test_stalled_batch_is_incomplete() {
        // Only the first two reports get answers
        let mock = Arc::new(MockTransport::new(|report| {
            (report[1] < 2).then(|| report.to_vec())
        }));
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let reports: Vec<Vec<u8>> = (0..5u8).map(|i| vec![0x12, i]).collect();
        let err = channel.send_batch(&reports).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::BatchIncomplete {
                expected: 5,
                received: 2
            }
        ));
        // A stall aborts only the wait: every report still went out
        assert_eq!(mock.written().len(), 5);
    }

    #[tokio::test]
    async fn test_single_hook_restored_after_batch() {
        let mock = Arc::new(MockTransport::echo());
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        let reports = vec![vec![0x12, 0], vec![0x12, 1]];
        channel.send_batch(&reports).await.unwrap();

        let response = channel.send(&[0x11]).await.unwrap();
        assert_eq!(response[0], 0x11);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let mock = Arc::new(MockTransport::echo());
        let channel = CommandChannel::with_config(mock.clone(), fast_config());

        assert!(channel.send_batch(&[]).await.unwrap().is_empty());
        assert!(mock.written().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sends_are_not_interleaved() {
        let mock = Arc::new(MockTransport::echo().with_delay(Duration::from_millis(5)));
        let channel = Arc::new(CommandChannel::with_config(mock.clone(), fast_config()));

        let mut handles = Vec::new();
        for marker in 0..6u8 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let response = channel.send(&[0x02, marker]).await.unwrap();
                assert_eq!(response[1], marker);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(mock.max_in_flight(), 1);
    }
}
