//! Fixed-period cycle pacing, statistics and real-time thread setup.
//!
//! ## Pacing
//! The [`Pacer`] keeps an absolute schedule: every tick is due exactly one
//! period after the previous *deadline*, not after the previous wake-up.
//! Only the remainder of the period is slept, so a late wake or a slow
//! update step does not push later ticks back and drift never
//! accumulates. If an iteration overruns by more than a whole period, the
//! schedule is re-anchored to "now" and the missed ticks are skipped.
//!
//! The wait doubles as the cancellation point: it is a `recv_timeout` on
//! the unit's stop channel, so a stop request ends the wait immediately.
//!
//! ## RT Setup
//! With the `rt` feature the cycle thread can be pinned to a CPU core and
//! switched to `SCHED_FIFO`. Without it both calls are no-ops.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle body duration [ns].
    pub last_cycle_ns: u64,
    /// Minimum cycle body duration [ns].
    pub min_cycle_ns: u64,
    /// Maximum cycle body duration [ns].
    pub max_cycle_ns: u64,
    /// Running sum for average computation.
    pub sum_cycle_ns: u128,
    /// Maximum wake-up latency [ns] (actual wake minus deadline).
    pub max_latency_ns: u64,
    /// Deadlines missed by more than one whole period.
    pub overruns: u64,
    /// Update steps that returned an error.
    pub update_failures: u64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: u64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            max_latency_ns: 0,
            overruns: 0,
            update_failures: 0,
        }
    }

    /// Record one cycle. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration: Duration, latency: Duration) {
        let duration_ns = duration.as_nanos() as u64;
        let latency_ns = latency.as_nanos() as u64;
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += u128::from(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle body time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            (self.sum_cycle_ns / u128::from(self.cycle_count)) as u64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// `true` for the first 10 occurrences and then every 1000th.
#[inline]
pub fn should_log_occurrence(count: u64) -> bool {
    count <= 10 || count % 1000 == 0
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// Outcome of one [`Pacer::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Deadline reached; `latency` is how late the wake-up was.
    Due {
        /// Wake time minus deadline.
        latency: Duration,
    },
    /// Stop requested (or the stop sender was dropped).
    Cancelled,
}

/// Absolute-deadline scheduler for one cycle thread.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    next_deadline: Instant,
    overruns: u64,
}

impl Pacer {
    /// First tick due `initial_delay + period` from now.
    pub fn new(period: Duration, initial_delay: Duration) -> Self {
        Self::starting_at(Instant::now() + initial_delay, period)
    }

    /// First tick due one period after `origin`.
    pub fn starting_at(origin: Instant, period: Duration) -> Self {
        Self {
            period,
            next_deadline: origin + period,
            overruns: 0,
        }
    }

    /// Configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Deadline of the next tick.
    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Number of schedule re-anchors so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Block until the next deadline or until a stop request arrives.
    pub fn wait(&mut self, stop: &Receiver<()>) -> Tick {
        let remaining = self.next_deadline.saturating_duration_since(Instant::now());
        match stop.recv_timeout(remaining) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Tick::Cancelled,
        }

        let now = Instant::now();
        let latency = now.saturating_duration_since(self.next_deadline);
        self.advance(now);
        Tick::Due { latency }
    }

    /// Move the deadline one period forward, re-anchoring after an overrun.
    fn advance(&mut self, now: Instant) {
        self.next_deadline += self.period;
        if now > self.next_deadline {
            self.overruns += 1;
            self.next_deadline = now + self.period;
        }
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), String> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| format!("CpuSet::set({cpu}) failed: {e}"))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| format!("sched_setaffinity failed: {e}"))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), String> {
    Ok(())
}

/// Set SCHED_FIFO with the given RT priority for the current thread.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), String> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 addresses the caller.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        ));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), String> {
    Ok(())
}

/// Apply optional pinning and RT priority to the calling thread.
///
/// # Errors
/// The first failing system call, as a message.
pub fn rt_setup(cpu_core: Option<usize>, rt_priority: Option<i32>) -> Result<(), String> {
    if let Some(cpu) = cpu_core {
        rt_set_affinity(cpu)?;
    }
    if let Some(priority) = rt_priority {
        rt_set_scheduler(priority)?;
    }
    Ok(())
}

/// Detect whether the process runs under an RT scheduling policy.
pub fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: querying the calling process's policy has no preconditions.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
