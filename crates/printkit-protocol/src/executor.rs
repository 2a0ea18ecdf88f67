//! Command execution over a half-duplex link.
//!
//! One command frame goes out, one reply frame comes back, and nothing
//! else moves on the wire in between. A mutex serializes callers so the
//! build worker and the status poller can share the link.
//!
//! Retry policy:
//! - buffer overflow replies re-send the identical frame after a short
//!   delay, indefinitely; the firmware is merely busy.
//! - CRC mismatches and timeouts re-send up to `max_retries` times,
//!   then yield a synthesized timeout response. Callers decide whether
//!   that is fatal.
//! - a negative retry budget is "probe mode": one silent attempt, used
//!   when scanning ports for a printer that may not be there.

use crate::decoder::PacketDecoder;
use crate::response::PacketResponse;
use crate::transport::Transport;
use parking_lot::Mutex;
use printkit_core::{ProtocolError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retries after a CRC mismatch or timeout before giving up.
    pub max_retries: i32,
    /// Delay before re-sending after a buffer-overflow reply.
    pub overflow_delay: Duration,
    /// How long to wait for a complete reply frame.
    pub response_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_retries: 5,
            overflow_delay: Duration::from_millis(25),
            response_timeout: Duration::from_millis(1000),
        }
    }
}

/// Cumulative wire statistics, for logging and tests.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub commands_sent: AtomicU64,
    pub overflow_retries: AtomicU64,
    pub error_retries: AtomicU64,
    pub timeouts: AtomicU64,
}

/// Serialized command/reply exchange over a [`Transport`].
pub struct CommandExecutor {
    transport: Mutex<Box<dyn Transport>>,
    config: ExecutorConfig,
    stats: ExecutorStats,
}

impl CommandExecutor {
    pub fn new(transport: Box<dyn Transport>, config: ExecutorConfig) -> Self {
        CommandExecutor {
            transport: Mutex::new(transport),
            config,
            stats: ExecutorStats::default(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    /// Link name, for logging.
    pub fn link_name(&self) -> String {
        self.transport.lock().name()
    }

    /// Run one command with the default retry budget.
    pub fn run(&self, frame: &[u8]) -> Result<PacketResponse> {
        self.run_with_retries(frame, self.config.max_retries)
    }

    /// Run one command with an explicit retry budget. A negative budget
    /// probes: single attempt, failures stay quiet.
    pub fn run_with_retries(&self, frame: &[u8], retries: i32) -> Result<PacketResponse> {
        let probe = retries < 0;
        let mut attempt = 0;
        // Hold the lock across retries; a retried frame must not
        // interleave with another caller's exchange.
        let mut transport = self.transport.lock();

        loop {
            attempt += 1;
            self.stats.commands_sent.fetch_add(1, Ordering::Relaxed);

            match self.exchange(&mut **transport, frame) {
                Ok(response) => {
                    if response.code() == crate::response::ResponseCode::BufferOverflow {
                        // Firmware motion buffer is full. Not a fault;
                        // wait and push the same frame again.
                        self.stats.overflow_retries.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            command = frame.get(2).copied().unwrap_or(0),
                            "buffer overflow, re-sending after {:?}",
                            self.config.overflow_delay
                        );
                        std::thread::sleep(self.config.overflow_delay);
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if is_retryable(&e) => {
                    if probe {
                        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                        return Ok(PacketResponse::timeout());
                    }
                    if attempt > retries.max(0) {
                        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            command = frame.get(2).copied().unwrap_or(0),
                            attempts = attempt,
                            "giving up on command: {}",
                            e
                        );
                        return Ok(PacketResponse::timeout());
                    }
                    self.stats.error_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        command = frame.get(2).copied().unwrap_or(0),
                        attempt,
                        "retrying command: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One write-then-read exchange. Reads bytes through the decoder
    /// until a full frame arrives or the response deadline passes.
    fn exchange(&self, transport: &mut dyn Transport, frame: &[u8]) -> Result<PacketResponse> {
        tracing::trace!(tx = ?frame, "sending frame");
        transport.send(frame)?;

        let mut decoder = PacketDecoder::new();
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            match transport.recv_byte()? {
                Some(byte) => {
                    if let Some(payload) = decoder.feed(byte)? {
                        tracing::trace!(rx = ?payload, "received reply");
                        return Ok(PacketResponse::new(payload));
                    }
                }
                None => {
                    if Instant::now() >= deadline {
                        return Err(ProtocolError::Timeout {
                            timeout_ms: self.config.response_timeout.as_millis() as u64,
                        }
                        .into());
                    }
                }
            }
        }
    }
}

fn is_retryable(error: &printkit_core::Error) -> bool {
    matches!(
        error,
        printkit_core::Error::Protocol(
            ProtocolError::Timeout { .. } | ProtocolError::ResponseCrcMismatch { .. }
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8;
    use crate::packet::{PacketBuilder, START_BYTE};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Scripted firmware double: each sent frame pops the next canned
    /// reply byte stream.
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        sends: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Vec<u8>>, sends: Arc<AtomicUsize>) -> Self {
            ScriptedTransport {
                replies: replies.into(),
                pending: VecDeque::new(),
                sends,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, _frame: &[u8]) -> Result<()> {
            self.sends.fetch_add(1, Ordering::Relaxed);
            if let Some(reply) = self.replies.pop_front() {
                self.pending.extend(reply);
            }
            Ok(())
        }

        fn recv_byte(&mut self) -> Result<Option<u8>> {
            Ok(self.pending.pop_front())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> String {
            "scripted".into()
        }
    }

    fn reply_frame(payload: &[u8]) -> Vec<u8> {
        let mut f = vec![START_BYTE, payload.len() as u8];
        f.extend_from_slice(payload);
        f.push(crc8(payload));
        f
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_retries: 3,
            overflow_delay: Duration::from_millis(1),
            response_timeout: Duration::from_millis(5),
        }
    }

    fn command() -> Vec<u8> {
        PacketBuilder::new(0x01).finish().unwrap()
    }

    #[test]
    fn ok_reply_returned() {
        let sends = Arc::new(AtomicUsize::new(0));
        let t = ScriptedTransport::new(vec![reply_frame(&[0x81, 0x2a])], sends.clone());
        let exec = CommandExecutor::new(Box::new(t), fast_config());
        let mut r = exec.run(&command()).unwrap();
        assert!(r.is_ok());
        assert_eq!(r.read_u8(), 0x2a);
        assert_eq!(sends.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn overflow_resends_until_accepted() {
        let sends = Arc::new(AtomicUsize::new(0));
        let t = ScriptedTransport::new(
            vec![
                reply_frame(&[0x82]),
                reply_frame(&[0x82]),
                reply_frame(&[0x81]),
            ],
            sends.clone(),
        );
        let exec = CommandExecutor::new(Box::new(t), fast_config());
        let r = exec.run(&command()).unwrap();
        assert!(r.is_ok());
        assert_eq!(sends.load(Ordering::Relaxed), 3);
        assert_eq!(exec.stats().overflow_retries.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn corrupt_reply_retried_then_ok() {
        let sends = Arc::new(AtomicUsize::new(0));
        let mut bad = reply_frame(&[0x81]);
        let last = bad.len() - 1;
        bad[last] ^= 0xff;
        let t = ScriptedTransport::new(vec![bad, reply_frame(&[0x81])], sends.clone());
        let exec = CommandExecutor::new(Box::new(t), fast_config());
        let r = exec.run(&command()).unwrap();
        assert!(r.is_ok());
        assert_eq!(sends.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn exhausted_retries_yield_timeout_sentinel() {
        let sends = Arc::new(AtomicUsize::new(0));
        // No replies at all.
        let t = ScriptedTransport::new(vec![], sends.clone());
        let exec = CommandExecutor::new(Box::new(t), fast_config());
        let r = exec.run(&command()).unwrap();
        assert_eq!(r.code(), crate::response::ResponseCode::Timeout);
        // Initial attempt plus three retries.
        assert_eq!(sends.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn probe_mode_fails_fast() {
        let sends = Arc::new(AtomicUsize::new(0));
        let t = ScriptedTransport::new(vec![], sends.clone());
        let exec = CommandExecutor::new(Box::new(t), fast_config());
        let r = exec.run_with_retries(&command(), -1).unwrap();
        assert_eq!(r.code(), crate::response::ResponseCode::Timeout);
        assert_eq!(sends.load(Ordering::Relaxed), 1);
    }
}
