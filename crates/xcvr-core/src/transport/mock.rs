//! Mock coding-box transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{Transport, TransportError};
use crate::protocol::constants::{CODING_BOX_PRODUCT_ID, CODING_BOX_VENDOR_ID};

/// One scripted reply to a `receive` call.
#[derive(Debug, Clone)]
enum MockReply {
    Frame(Vec<u8>),
    Timeout,
}

/// Mock transport for unit testing protocol logic.
///
/// Clones share the same queues, so a test can keep one handle while a
/// session owns another.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued replies returned by `receive`, in order.
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Captured sends.
    send_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Zero-based send index that should fail, if any.
    fail_send_at: Arc<Mutex<Option<usize>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            send_log: Arc::new(Mutex::new(Vec::new())),
            fail_send_at: Arc::new(Mutex::new(None)),
            vid: CODING_BOX_VENDOR_ID,
            pid: CODING_BOX_PRODUCT_ID,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a response frame to be returned on the next receive.
    pub fn queue_response(&self, frame: &[u8]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Frame(frame.to_vec()));
    }

    /// Queue a single-byte response (identifier or read-back value).
    pub fn queue_byte(&self, value: u8) {
        self.queue_response(&[value]);
    }

    /// Queue an explicit timeout. An empty queue also times out.
    pub fn queue_timeout(&self) {
        self.replies.lock().unwrap().push_back(MockReply::Timeout);
    }

    /// Make the n-th send (zero-based, counting every send so far) fail.
    pub fn fail_send_at(&self, index: usize) {
        *self.fail_send_at.lock().unwrap() = Some(index);
    }

    /// Number of replies still queued.
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Get all captured sends.
    pub fn get_sends(&self) -> Vec<Vec<u8>> {
        self.send_log.lock().unwrap().clone()
    }

    /// Clear captured sends.
    pub fn clear_sends(&self) {
        self.send_log.lock().unwrap().clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    /// Set VID/PID reported by the mock.
    pub fn set_ids(&mut self, vid: u16, pid: u16) {
        self.vid = vid;
        self.pid = pid;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::NotConnected);
        }
        let mut log = self.send_log.lock().unwrap();
        if *self.fail_send_at.lock().unwrap() == Some(log.len()) {
            log.push(frame.to_vec());
            return Err(TransportError::SendFailed("injected send failure".into()));
        }
        log.push(frame.to_vec());
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::NotConnected);
        }
        let timeout_ms = timeout.as_millis() as u64;
        match self.replies.lock().unwrap().pop_front() {
            Some(MockReply::Frame(frame)) => Ok(frame),
            Some(MockReply::Timeout) | None => Err(TransportError::Timeout { timeout_ms }),
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_response_queue() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        mock.queue_response(&[0x01, 0x02]);

        assert_eq!(mock.receive(WAIT).unwrap(), vec![0x03]);
        assert_eq!(mock.receive(WAIT).unwrap(), vec![0x01, 0x02]);

        // Queue is empty now
        assert!(matches!(
            mock.receive(WAIT),
            Err(TransportError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_mock_send_capture() {
        let mock = MockTransport::new();
        mock.send(b"Hello").unwrap();
        mock.send(b"World").unwrap();

        let sends = mock.get_sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0], b"Hello");
        assert_eq!(sends[1], b"World");
    }

    #[test]
    fn test_mock_bookkeeping() {
        let mut mock = MockTransport::new();
        mock.queue_byte(0x03);
        mock.queue_timeout();
        assert_eq!(mock.pending_replies(), 2);
        assert!(mock.receive(WAIT).is_ok());
        assert!(mock.receive(WAIT).is_err());
        assert_eq!(mock.pending_replies(), 0);

        mock.send(b"frame").unwrap();
        mock.clear_sends();
        assert!(mock.get_sends().is_empty());

        mock.set_ids(0x1234, 0xABCD);
        assert_eq!((mock.vendor_id(), mock.product_id()), (0x1234, 0xABCD));
    }

    #[test]
    fn test_mock_injected_send_failure() {
        let mock = MockTransport::new();
        mock.fail_send_at(1);
        assert!(mock.send(b"first").is_ok());
        assert!(matches!(
            mock.send(b"second"),
            Err(TransportError::SendFailed(_))
        ));
        assert!(mock.send(b"third").is_ok());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send(b"test"),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            mock.receive(WAIT),
            Err(TransportError::NotConnected)
        ));
    }
}
