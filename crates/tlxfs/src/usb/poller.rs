//! Polling protocol driver
//!
//! Drives one physical session end to end: initialize, then request frames
//! until the transport drops or shutdown is signalled. Every poll elicits
//! either fresh data or a heartbeat; an indefinite stream of heartbeats is
//! normal and keeps the session alive.

use std::time::{Duration, SystemTime};

use protocol::frame::{self, CMD_INIT, CMD_POLL, FRAME_LEN, Frame};
use protocol::{Transport, TransportError};
use tracing::trace;

use crate::session::{SessionSettings, StopToken};
use crate::store::ReadingCache;

/// Runs the request/response loop for one session, writing observations
/// into the cache as they arrive.
pub struct Poller<'a> {
    cache: &'a ReadingCache,
    stop: &'a StopToken,
    io_timeout: Duration,
    heartbeat_delay: Duration,
}

impl<'a> Poller<'a> {
    pub fn new(cache: &'a ReadingCache, stop: &'a StopToken, settings: &SessionSettings) -> Self {
        Self {
            cache,
            stop,
            io_timeout: settings.io_timeout,
            heartbeat_delay: settings.heartbeat_delay,
        }
    }

    /// Poll until the transport fails or shutdown is requested.
    ///
    /// `Ok(())` means a clean exit at shutdown; any transport error ends the
    /// session and is left to the session manager to recover from.
    pub fn run(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        transport.write(&frame::command_frame(CMD_INIT), self.io_timeout)?;

        let mut buf = [0u8; FRAME_LEN];
        loop {
            if self.stop.is_set() {
                return Ok(());
            }

            transport.write(&frame::command_frame(CMD_POLL), self.io_timeout)?;
            let n = transport.read(&mut buf, self.io_timeout)?;

            match Frame::parse(&buf[..n]) {
                Frame::Data(obs) => {
                    trace!(channel = obs.channel, raw = obs.raw, "observation");
                    self.cache.upsert(obs.channel, obs.raw, SystemTime::now());
                }
                Frame::Heartbeat => {
                    // Nothing buffered; don't hammer the device.
                    if self.stop.wait_for(self.heartbeat_delay) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    /// Records the command byte of every outbound frame and replays a
    /// scripted sequence of inbound frames, then fails.
    struct ScriptedTransport {
        commands: Vec<u8>,
        replies: Vec<[u8; FRAME_LEN]>,
        next: usize,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<[u8; FRAME_LEN]>) -> Self {
            Self {
                commands: Vec::new(),
                replies,
                next: 0,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, frame: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
            self.commands.push(frame[0]);
            Ok(frame.len())
        }

        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
            let Some(reply) = self.replies.get(self.next) else {
                return Err(TransportError::TransferFailed("script exhausted".into()));
            };
            self.next += 1;
            buf[..FRAME_LEN].copy_from_slice(reply);
            Ok(FRAME_LEN)
        }
    }

    fn data_frame(channel: u16, raw: i16) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x01;
        frame[2..4].copy_from_slice(&channel.to_le_bytes());
        frame[4..6].copy_from_slice(&raw.to_be_bytes());
        frame
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            io_timeout: Duration::from_millis(10),
            heartbeat_delay: Duration::from_millis(1),
            reconnect_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_init_then_poll_command_sequence() {
        let cache = ReadingCache::new(SystemTime::now());
        let stop = StopToken::default();
        let mut transport = ScriptedTransport::new(vec![data_frame(1, 5)]);

        let settings = settings();
        let poller = Poller::new(&cache, &stop, &settings);
        let result = poller.run(&mut transport);

        assert!(result.is_err());
        assert_eq!(transport.commands, vec![CMD_INIT, CMD_POLL, CMD_POLL]);
    }

    #[test]
    fn test_data_frames_reach_the_cache() {
        let cache = ReadingCache::new(SystemTime::now());
        let stop = StopToken::default();
        let mut transport =
            ScriptedTransport::new(vec![data_frame(3, 1234), data_frame(3, 1300)]);

        let settings = settings();
        let poller = Poller::new(&cache, &stop, &settings);
        let _ = poller.run(&mut transport);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(3).unwrap().raw, 1300);
    }

    #[test]
    fn test_heartbeats_leave_cache_untouched() {
        let cache = ReadingCache::new(SystemTime::now());
        let stop = StopToken::default();
        let mut transport = ScriptedTransport::new(vec![[0u8; FRAME_LEN]; 5]);

        let settings = settings();
        let poller = Poller::new(&cache, &stop, &settings);
        let _ = poller.run(&mut transport);

        assert!(cache.is_empty());
        assert!(cache.ids().is_empty());
    }

    #[test]
    fn test_stop_before_first_poll() {
        let cache = ReadingCache::new(SystemTime::now());
        let stop = StopToken::default();
        stop.set();
        let mut transport = ScriptedTransport::new(Vec::new());

        let settings = settings();
        let poller = Poller::new(&cache, &stop, &settings);
        assert!(poller.run(&mut transport).is_ok());
        assert_eq!(transport.commands, vec![CMD_INIT]);
    }
}
