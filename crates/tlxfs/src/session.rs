//! Background polling session lifecycle
//!
//! Exactly one polling thread exists per [`SessionManager`]. It is launched
//! lazily by the first caller of [`SessionManager::ensure_started`] and then
//! supervised: whenever the device is missing or the transport drops, the
//! thread waits a fixed interval and tries discovery again, forever, until
//! an explicit shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use protocol::{Connect, TransportError};
use tracing::{debug, info, warn};

use crate::store::{Reading, ReadingCache};
use crate::usb::poller::Poller;

/// Lifecycle of the background polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No caller has demanded a session yet.
    NotStarted,
    /// The polling thread is up but has no open device session.
    Starting,
    /// A device session is established and frames are flowing.
    Running,
    /// Explicitly shut down. Terminal.
    Stopped,
}

/// Timing knobs for the session, derived from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bounded timeout for each bulk transfer.
    pub io_timeout: Duration,
    /// Pause after a heartbeat frame before polling again.
    pub heartbeat_delay: Duration,
    /// Pause between device discovery attempts.
    pub reconnect_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(1),
            heartbeat_delay: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

/// Shutdown signal shared with the polling thread.
///
/// Waits park on a condition variable, so reconnect and heartbeat delays
/// burn no CPU and end as soon as shutdown is requested.
#[derive(Debug, Default)]
pub struct StopToken {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopToken {
    pub fn set(&self) {
        let mut stopped = self.lock();
        *stopped = true;
        self.cv.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `timeout` unless the token is set first. Returns whether
    /// the token is set.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let stopped = self.lock();
        let (stopped, _) = self
            .cv
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
        *stopped
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SessionState>,
    stop: StopToken,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.lock_state()
    }

    fn set_state(&self, state: SessionState) {
        *self.lock_state() = state;
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the reading cache and the one background polling session.
///
/// Constructed once at startup and handed to the filesystem layer by
/// reference; all methods take `&self`.
pub struct SessionManager {
    connector: Arc<dyn Connect>,
    cache: Arc<ReadingCache>,
    settings: SessionSettings,
    started: AtomicBool,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connect>, settings: SessionSettings) -> Self {
        Self {
            connector,
            cache: Arc::new(ReadingCache::new(SystemTime::now())),
            settings,
            started: AtomicBool::new(false),
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::NotStarted),
                stop: StopToken::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Launch the background polling session if no one has yet.
    ///
    /// Safe to call concurrently from any number of threads; the first
    /// caller wins and every later call is a cheap atomic load. Once it
    /// returns, a session has been launched by this or a prior call, unless
    /// the manager was explicitly shut down.
    pub fn ensure_started(&self) {
        if self.started.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.shared.lock_state();
        if *state != SessionState::NotStarted {
            // Lost the race, or already shut down.
            return;
        }
        *state = SessionState::Starting;
        drop(state);

        let shared = Arc::clone(&self.shared);
        let connector = Arc::clone(&self.connector);
        let cache = Arc::clone(&self.cache);
        let settings = self.settings.clone();
        let handle = std::thread::Builder::new()
            .name("tlx-poller".to_string())
            .spawn(move || supervise(shared, connector, cache, settings))
            .expect("failed to spawn polling thread");

        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        self.started.store(true, Ordering::Release);
    }

    /// Signal the polling thread to stop and wait for it to exit.
    ///
    /// The thread notices at its next loop boundary, after the transfer in
    /// flight completes. Idempotent; later `ensure_started` calls stay
    /// no-ops.
    pub fn shutdown(&self) {
        self.shared.stop.set();
        self.shared.set_state(SessionState::Stopped);

        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("polling thread panicked");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn cache(&self) -> Arc<ReadingCache> {
        Arc::clone(&self.cache)
    }

    /// Latest reading for one channel, if it has ever been observed.
    pub fn lookup(&self, id: u16) -> Option<Reading> {
        self.cache.lookup(id)
    }

    /// Snapshot of all known channel ids.
    pub fn ids(&self) -> Vec<u16> {
        self.cache.ids()
    }

    pub fn first_seen(&self) -> SystemTime {
        self.cache.first_seen()
    }

    pub fn last_update(&self) -> SystemTime {
        self.cache.last_update()
    }
}

/// Body of the polling thread: connect, poll until the session ends, wait,
/// repeat.
fn supervise(
    shared: Arc<Shared>,
    connector: Arc<dyn Connect>,
    cache: Arc<ReadingCache>,
    settings: SessionSettings,
) {
    info!("polling thread started");

    while !shared.stop.is_set() {
        match connector.connect() {
            Ok(mut transport) => {
                shared.set_state(SessionState::Running);
                info!("device session established");

                let poller = Poller::new(&cache, &shared.stop, &settings);
                match poller.run(transport.as_mut()) {
                    Ok(()) => debug!("session closed for shutdown"),
                    Err(e) => warn!("session lost: {}", e),
                }
                shared.set_state(SessionState::Starting);
            }
            Err(TransportError::DeviceAbsent) => {
                debug!("logger not attached");
            }
            Err(e) => {
                warn!("could not open logger: {}", e);
            }
        }

        if shared.stop.wait_for(settings.reconnect_interval) {
            break;
        }
    }

    shared.set_state(SessionState::Stopped);
    info!("polling thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token_wait_expires() {
        let token = StopToken::default();
        assert!(!token.wait_for(Duration::from_millis(1)));
        assert!(!token.is_set());
    }

    #[test]
    fn test_stop_token_set_ends_wait() {
        let token = Arc::new(StopToken::default());
        let waiter = {
            let token = Arc::clone(&token);
            std::thread::spawn(move || token.wait_for(Duration::from_secs(30)))
        };
        token.set();
        assert!(waiter.join().unwrap());
        assert!(token.is_set());
    }
}
