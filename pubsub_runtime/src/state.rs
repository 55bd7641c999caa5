//! Loop life cycle: `Idle → Running → Stopping → Stopped`.
//!
//! A [`LoopControl`] is shared between the loop thread and its owner. The
//! owner requests a stop; the loop observes it once per cycle and marks
//! itself stopped on the way out. Stopping is cooperative, never forced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;

use pubsub_common::consts::CACHE_LINE_SIZE;
use pubsub_common::pubsub::config::RtConfig;
use static_assertions::const_assert_eq;
use tracing::{error, info};

use crate::error::LoopError;
use crate::rt;

/// Life-cycle state of a publisher or subscriber loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Built, thread not started.
    Idle = 0,
    /// Thread is cycling.
    Running = 1,
    /// Stop requested, not yet observed.
    Stopping = 2,
    /// Loop returned.
    Stopped = 3,
}

impl LoopState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Atomic state shared by a loop and its owner.
///
/// Cache-line aligned so the flag polled every cycle never shares a line
/// with unrelated data.
#[derive(Debug)]
#[repr(C, align(64))]
pub struct LoopControl {
    state: AtomicU8,
}

const_assert_eq!(core::mem::align_of::<LoopControl>(), CACHE_LINE_SIZE);

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    /// Control in `Idle`.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Idle as u8),
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while the loop should keep cycling.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// `Idle → Running`. False if the loop was already started.
    pub fn start(&self) -> bool {
        self.transition(LoopState::Idle, LoopState::Running)
    }

    /// `Running → Stopping`. False if the loop was not running.
    pub fn request_stop(&self) -> bool {
        self.transition(LoopState::Running, LoopState::Stopping)
    }

    /// Enter `Stopped` from any state.
    pub fn mark_stopped(&self) {
        self.state.store(LoopState::Stopped as u8, Ordering::Release);
    }

    fn transition(&self, from: LoopState, to: LoopState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Owner side of a loop thread.
///
/// `S` is what the loop returns when it stops cleanly (its statistics),
/// `E` its fatal error.
#[derive(Debug)]
pub struct LoopHandle<S, E> {
    name: String,
    control: Arc<LoopControl>,
    thread: Option<JoinHandle<Result<S, E>>>,
}

impl<S, E> LoopHandle<S, E>
where
    S: Send + 'static,
    E: From<LoopError> + std::fmt::Display + Send + 'static,
{
    /// Start `body` on a new named thread.
    ///
    /// The thread applies `rt` first, then runs `body` until it returns.
    /// `Stopped` is entered on every exit path.
    pub fn spawn<F>(name: &str, rt: Option<RtConfig>, body: F) -> Result<Self, E>
    where
        F: FnOnce(&LoopControl) -> Result<S, E> + Send + 'static,
    {
        let control = Arc::new(LoopControl::new());
        if !control.start() {
            return Err(LoopError::AlreadyStarted(name.to_string()).into());
        }

        let thread_control = Arc::clone(&control);
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = match rt {
                    Some(cfg) => rt::apply(&thread_name, &cfg)
                        .map_err(E::from)
                        .and_then(|_| body(&thread_control)),
                    None => body(&thread_control),
                };
                thread_control.mark_stopped();
                match &result {
                    Ok(_) => info!(loop_name = %thread_name, "Loop stopped"),
                    Err(e) => error!(loop_name = %thread_name, "Loop failed: {e}"),
                }
                result
            })
            .map_err(|e| E::from(LoopError::Spawn(e)))?;

        Ok(Self {
            name: name.to_string(),
            control,
            thread: Some(thread),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    /// Shared control, e.g. for a signal handler.
    pub fn control(&self) -> Arc<LoopControl> {
        Arc::clone(&self.control)
    }

    /// True once the loop thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request a cooperative stop. Returns immediately.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Stop, then wait for the thread and return its result.
    pub fn join(mut self) -> Result<S, E> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(LoopError::Panicked(self.name.clone()).into())),
            None => Err(LoopError::AlreadyJoined(self.name.clone()).into()),
        }
    }
}

impl<S, E> Drop for LoopHandle<S, E> {
    fn drop(&mut self) {
        self.control.request_stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error(transparent)]
    struct TestError(#[from] LoopError);

    #[test]
    fn control_transitions() {
        let control = LoopControl::new();
        assert_eq!(control.state(), LoopState::Idle);
        assert!(!control.request_stop());
        assert!(control.start());
        assert!(!control.start());
        assert!(control.is_running());
        assert!(control.request_stop());
        assert_eq!(control.state(), LoopState::Stopping);
        control.mark_stopped();
        assert_eq!(control.state(), LoopState::Stopped);
    }

    #[test]
    fn handle_runs_until_stopped() {
        let handle = LoopHandle::<u64, TestError>::spawn("test-loop", None, |control| {
            let mut cycles = 0u64;
            while control.is_running() {
                cycles += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(cycles)
        })
        .unwrap();
        assert_eq!(handle.name(), "test-loop");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(handle.state(), LoopState::Running);

        let control = handle.control();
        let cycles = handle.join().unwrap();
        assert!(cycles > 0);
        assert_eq!(control.state(), LoopState::Stopped);
    }

    #[test]
    fn failing_body_enters_stopped() {
        let handle = LoopHandle::<(), TestError>::spawn("failing", None, |_| {
            Err(LoopError::AlreadyStarted("inner".into()).into())
        })
        .unwrap();
        let control = handle.control();
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(handle.join().is_err());
    }

    #[cfg(not(feature = "rt"))]
    #[test]
    fn rt_settings_applied_before_body() {
        let rt = RtConfig {
            cpu_core: 0,
            priority: 80,
        };
        let handle = LoopHandle::<u8, TestError>::spawn("rt-loop", Some(rt), |_| Ok(7)).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn panicking_body_reported() {
        let handle =
            LoopHandle::<(), TestError>::spawn("panicking", None, |_| panic!("boom")).unwrap();
        assert!(matches!(handle.join(), Err(TestError(LoopError::Panicked(_)))));
    }
}
