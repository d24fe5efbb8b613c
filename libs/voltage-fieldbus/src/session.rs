//! Connection lifecycle
//!
//! A [`Session`] owns at most one open stream to a device. The stream is
//! opened lazily, closed on request, on any I/O failure and after a period
//! of inactivity. Every access goes through one async mutex, so a request
//! holds the stream exclusively from connect through the final read.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::debug;

use crate::error::{FieldbusError, Result};
use crate::link::Link;
use crate::logging::FrameLogger;

/// Mutable state guarded by the session lock
struct SessionState<S> {
    stream: Option<S>,
    last_activity: Instant,
    idle_timer: Option<JoinHandle<()>>,
}

impl<S> Drop for SessionState<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

type SharedState<S> = Arc<Mutex<SessionState<S>>>;

/// Lazily connected, idle-closing handle to one device
pub struct Session<L: Link> {
    link: L,
    timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    logger: FrameLogger,
    state: SharedState<L::Stream>,
}

/// Treat a zero duration as "disabled"
fn non_zero(duration: Option<Duration>) -> Option<Duration> {
    duration.filter(|d| !d.is_zero())
}

impl<L: Link> Session<L> {
    /// Create a disconnected session
    ///
    /// `timeout` bounds connect and each request; `idle_timeout` closes the
    /// stream after that long without activity. `None` or zero disables either.
    pub fn new(link: L, timeout: Option<Duration>, idle_timeout: Option<Duration>) -> Self {
        let logger = FrameLogger::new(link.target());
        Self {
            link,
            timeout: non_zero(timeout),
            idle_timeout: non_zero(idle_timeout),
            logger,
            state: Arc::new(Mutex::new(SessionState {
                stream: None,
                last_activity: Instant::now(),
                idle_timer: None,
            })),
        }
    }

    pub fn with_logger(mut self, logger: FrameLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Replace both timeouts before the session is first used
    pub fn with_timeouts(mut self, timeout: Option<Duration>, idle_timeout: Option<Duration>) -> Self {
        self.timeout = non_zero(timeout);
        self.idle_timeout = non_zero(idle_timeout);
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn logger(&self) -> &FrameLogger {
        &self.logger
    }

    /// Acquire exclusive access for one request
    pub async fn lock(&self) -> SessionGuard<'_, L> {
        SessionGuard {
            session: self,
            state: self.state.lock().await,
            deadline: None,
        }
    }

    /// Open the stream unless already open
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.lock().await;
        guard.ensure_connected().await?;
        guard.mark_activity();
        Ok(())
    }

    /// Drop the stream; a no-op when already closed
    pub async fn close(&self) -> Result<()> {
        self.lock().await.close("closed by caller");
        Ok(())
    }

    /// Record activity now and re-arm the idle timer
    pub async fn mark_activity(&self) {
        self.lock().await.mark_activity();
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.stream.is_some()
    }

    pub async fn last_activity(&self) -> Instant {
        self.state.lock().await.last_activity
    }
}

/// Idle timer body: close only if nothing happened since the timer was armed
async fn close_idle<S>(
    state: Weak<Mutex<SessionState<S>>>,
    deadline: Instant,
    idle: Duration,
    logger: FrameLogger,
) {
    sleep_until(deadline).await;

    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;
    let elapsed = state.last_activity.elapsed();
    if elapsed >= idle && state.stream.take().is_some() {
        logger.log_idle_close(elapsed);
    }
}

/// Map a deadline-bounded I/O result into the crate error
async fn with_deadline<T, F>(deadline: Option<Instant>, op: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    let result = match deadline {
        Some(deadline) => match timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => return Err(FieldbusError::timeout(format!("{op} deadline exceeded"))),
        },
        None => fut.await,
    };
    result.map_err(|e| FieldbusError::io(format!("{op}: {e}")))
}

/// Exclusive access to a session for the duration of one request
pub struct SessionGuard<'a, L: Link> {
    session: &'a Session<L>,
    state: MutexGuard<'a, SessionState<L::Stream>>,
    deadline: Option<Instant>,
}

impl<L: Link> SessionGuard<'_, L> {
    pub fn logger(&self) -> &FrameLogger {
        &self.session.logger
    }

    pub fn is_connected(&self) -> bool {
        self.state.stream.is_some()
    }

    /// Open the stream if it is closed; on failure the session stays closed
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.state.stream.is_some() {
            return Ok(());
        }
        match self.session.link.open(self.session.timeout).await {
            Ok(stream) => {
                self.state.stream = Some(stream);
                self.session.logger.log_connect();
                Ok(())
            },
            Err(e) => {
                self.session.logger.log_connect_failed(&e.to_string());
                Err(e)
            },
        }
    }

    /// Record activity now and re-arm the idle timer
    pub fn mark_activity(&mut self) {
        self.state.last_activity = Instant::now();

        if let Some(timer) = self.state.idle_timer.take() {
            timer.abort();
        }
        if let Some(idle) = self.session.idle_timeout {
            let weak = Arc::downgrade(&self.session.state);
            let logger = self.session.logger.clone();
            let deadline = self.state.last_activity + idle;
            self.state.idle_timer = Some(tokio::spawn(close_idle(weak, deadline, idle, logger)));
        }
    }

    /// Connect, mark activity and start the per-request deadline
    pub async fn begin(&mut self) -> Result<()> {
        self.ensure_connected().await?;
        self.mark_activity();
        self.deadline = self
            .session
            .timeout
            .map(|timeout| self.state.last_activity + timeout);
        Ok(())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drop the stream
    pub fn close(&mut self, reason: &str) {
        if self.state.stream.take().is_some() {
            self.session.logger.log_close(reason);
        }
    }

    fn stream(&mut self) -> Result<&mut L::Stream> {
        self.state.stream.as_mut().ok_or(FieldbusError::NotConnected)
    }

    /// Close the stream on any failure
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.close(&e.to_string());
        }
        result
    }

    /// Write and flush the whole buffer
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.deadline;
        let stream = self.stream()?;
        let result = with_deadline(deadline, "write", async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;
        self.settle(result)
    }

    /// Fill `buf` completely
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let deadline = self.deadline;
        let stream = self.stream()?;
        let result = with_deadline(deadline, "read", async {
            stream.read_exact(buf).await.map(|_| ())
        })
        .await;
        self.settle(result)
    }

    /// Read until at least `min` bytes are in `buf`, returning the count
    pub async fn read_at_least(&mut self, buf: &mut [u8], min: usize) -> Result<usize> {
        if min > buf.len() {
            return Err(FieldbusError::invalid_length(format!(
                "cannot read {min} bytes into a {} byte buffer",
                buf.len()
            )));
        }

        let deadline = self.deadline;
        let stream = self.stream()?;
        let result = with_deadline(deadline, "read", async {
            let mut filled = 0;
            while filled < min {
                let n = stream.read(&mut buf[filled..]).await?;
                if n == 0 {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
                }
                filled += n;
            }
            Ok::<_, std::io::Error>(filled)
        })
        .await;
        self.settle(result)
    }

    /// Discard bytes already buffered on the stream without waiting
    ///
    /// Closes the session if the peer has gone away.
    pub async fn drain(&mut self) -> Vec<u8> {
        let mut drained = Vec::new();
        let mut eof = false;
        if let Some(stream) = self.state.stream.as_mut() {
            let mut buf = [0u8; 256];
            loop {
                match stream.read(&mut buf).now_or_never() {
                    Some(Ok(0)) => {
                        eof = true;
                        break;
                    },
                    Some(Ok(n)) => drained.extend_from_slice(&buf[..n]),
                    Some(Err(_)) => {
                        eof = true;
                        break;
                    },
                    None => break,
                }
            }
        }
        self.session.logger.log_drain(&drained);
        if eof {
            debug!("Drain hit end of stream: {}", self.session.logger.target());
            self.close("peer closed during drain");
        }
        drained
    }
}
