//! Real-time setup of a loop thread.
//!
//! [`apply`] runs on the loop thread itself, before its first cycle, using
//! the connection's `[rt]` table. Locking memory, CPU pinning and
//! SCHED_FIFO need the `rt` feature and the matching privileges. Without
//! the feature those steps are reported as skipped and the loop runs as
//! an ordinary thread.

use std::fmt;
use std::io;

use pubsub_common::pubsub::config::RtConfig;
use tracing::{info, warn};

use crate::error::LoopError;

/// Stack touched by the prefault step.
const PREFAULT_STACK_BYTES: usize = 256 * 1024;

/// One step of the setup sequence, in the order it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtStep {
    /// `mlockall(MCL_CURRENT | MCL_FUTURE)`.
    LockMemory,
    /// Touch the stack so early cycles do not page-fault.
    PrefaultStack,
    /// Restrict the thread to `cpu_core`.
    PinCpu,
    /// SCHED_FIFO at `priority`.
    Fifo,
}

impl RtStep {
    const SEQUENCE: [Self; 4] = [Self::LockMemory, Self::PrefaultStack, Self::PinCpu, Self::Fifo];

    /// True when the step needs the `rt` feature.
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::PrefaultStack)
    }

    /// Run on the calling thread. `Ok(false)` when skipped.
    fn run(self, rt: &RtConfig) -> io::Result<bool> {
        if self.is_privileged() && !cfg!(feature = "rt") {
            return Ok(false);
        }
        match self {
            Self::LockMemory => lock_memory()?,
            Self::PrefaultStack => prefault_stack(),
            Self::PinCpu => pin_to_core(rt.cpu_core)?,
            Self::Fifo => set_fifo(rt.priority)?,
        }
        Ok(true)
    }
}

impl fmt::Display for RtStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LockMemory => "memory lock",
            Self::PrefaultStack => "stack prefault",
            Self::PinCpu => "CPU pinning",
            Self::Fifo => "SCHED_FIFO",
        })
    }
}

/// What [`apply`] did for one loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtReport {
    /// Steps that took effect.
    pub applied: Vec<RtStep>,
    /// Steps left out because the `rt` feature is disabled.
    pub skipped: Vec<RtStep>,
}

impl RtReport {
    /// True when every step took effect.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Apply `rt` to the calling thread on behalf of `loop_name`.
///
/// Stops at the first failing step.
pub fn apply(loop_name: &str, rt: &RtConfig) -> Result<RtReport, LoopError> {
    let mut report = RtReport::default();
    for step in RtStep::SEQUENCE {
        let ran = step.run(rt).map_err(|source| LoopError::RtSetup {
            loop_name: loop_name.to_string(),
            step,
            source,
        })?;
        if ran {
            report.applied.push(step);
        } else {
            report.skipped.push(step);
        }
    }

    if report.is_complete() {
        info!(
            loop_name,
            cpu_core = rt.cpu_core,
            priority = rt.priority,
            "Loop thread is real-time"
        );
    } else {
        warn!(
            loop_name,
            skipped = ?report.skipped,
            "RT settings ignored, built without the rt feature"
        );
    }
    Ok(report)
}

fn lock_memory() -> io::Result<()> {
    use nix::sys::mman::{MlockAllFlags, mlockall};

    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)?;
    Ok(())
}

fn prefault_stack() {
    std::hint::black_box([0xA5u8; PREFAULT_STACK_BYTES]);
}

fn pin_to_core(cpu: usize) -> io::Result<()> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cores = CpuSet::new();
    cores.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &cores)?;
    Ok(())
}

fn set_fifo(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pthread_self() is the calling thread; `param` outlives the call.
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    match ret {
        0 => Ok(()),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}
