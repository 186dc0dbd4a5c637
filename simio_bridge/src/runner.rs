//! Device-unit runner: lifecycle state machine plus the cyclic loop.
//!
//! One `UnitRunner` owns one `DeviceUnit`. Starting it configures the unit
//! against freshly built layouts, binds the unit's input and output
//! channels and spawns a dedicated cycle thread. Every period the thread
//! pulls the input buffer from the registry, runs the update step and
//! pushes the output buffer back.
//!
//! Stopping is cooperative: the stop request wakes the pacer wait, the
//! thread finishes its current iteration (if any) and hands the unit back.

use parking_lot::Mutex;
use simio_common::unit::config::UnitConfig;
use simio_common::unit::driver::{DeviceUnit, UnitError, UnitIo, UnitSetup};
use simio_common::unit::state::{LifecycleEvent, LifecycleNotice, UnitState};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::control::TimeScale;
use crate::cycle::{CycleStats, Pacer, Tick, rt_setup, should_log_occurrence};
use crate::registry::{ChannelError, ChannelHandle, ChannelRegistry};

/// Running cycle thread.
struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<Box<dyn DeviceUnit>>,
}

/// Lifecycle owner of one device unit.
pub struct UnitRunner {
    config: UnitConfig,
    state: UnitState,
    /// `None` while the cycle thread holds it, or after the thread panicked.
    unit: Option<Box<dyn DeviceUnit>>,
    registry: ChannelRegistry,
    time_scale: TimeScale,
    lifecycle: broadcast::Sender<LifecycleNotice>,
    stats: Arc<Mutex<CycleStats>>,
    worker: Option<Worker>,
}

impl UnitRunner {
    /// Wrap `unit` for the configuration `config`.
    pub fn new(
        config: UnitConfig,
        unit: Box<dyn DeviceUnit>,
        registry: ChannelRegistry,
        time_scale: TimeScale,
        lifecycle: broadcast::Sender<LifecycleNotice>,
    ) -> Self {
        Self {
            config,
            state: UnitState::Idle,
            unit: Some(unit),
            registry,
            time_scale,
            lifecycle,
            stats: Arc::new(Mutex::new(CycleStats::new())),
            worker: None,
        }
    }

    /// Unit (and channel) name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Unit configuration.
    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Snapshot of the cycle statistics of the current (or last) run.
    pub fn stats(&self) -> CycleStats {
        self.stats.lock().clone()
    }

    /// Configure the unit, bind its channels and start the cycle loop.
    ///
    /// # Errors
    /// - `InvalidState` unless the unit is `Idle` or `Stopped`
    /// - `Unavailable` if a previous cycle thread panicked with the unit
    /// - the unit's own error if configure or start fails (the unit is
    ///   then `Stopped`)
    /// - `Spawn` if the cycle thread could not be created
    pub fn start(&mut self) -> Result<(), UnitError> {
        if !self.state.can_start() {
            return Err(UnitError::InvalidState {
                unit: self.config.name.clone(),
                operation: "start",
                state: self.state,
            });
        }
        let mut unit = self
            .unit
            .take()
            .ok_or_else(|| UnitError::Unavailable(self.config.name.clone()))?;

        self.transition(UnitState::Starting, LifecycleEvent::Starting);

        let mode = self.config.io.mode();
        let (inputs, outputs) = self.config.io.build_layouts();
        let setup = UnitSetup {
            config: &self.config,
            mode,
            inputs: &inputs,
            outputs: &outputs,
        };
        if let Err(e) = unit.configure(&setup).and_then(|()| unit.on_start()) {
            error!("Unit '{}' failed to start: {}", self.config.name, e);
            self.unit = Some(unit);
            self.transition(UnitState::Stopped, LifecycleEvent::Stopped);
            return Err(e);
        }

        let (input, output) = if mode.exchanges_data() {
            (
                Some(self.registry.bind_input(&self.config.name, inputs.byte_len())),
                Some(self.registry.bind_output(&self.config.name, outputs.byte_len())),
            )
        } else {
            (None, None)
        };

        *self.stats.lock() = CycleStats::new();
        let cycle = CycleLoop {
            name: self.config.name.clone(),
            unit,
            input,
            output,
            in_buf: vec![0u8; inputs.byte_len()],
            out_buf: vec![0u8; outputs.byte_len()],
            period: Duration::from_millis(self.config.period_ms),
            start_delay: Duration::from_millis(self.config.start_delay_ms),
            cpu_core: self.config.cpu_core,
            rt_priority: self.config.rt_priority,
            time_scale: self.time_scale.clone(),
            stats: Arc::clone(&self.stats),
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("unit-{}", self.config.name))
            .spawn(move || cycle.run(stop_rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Unit '{}' cycle thread spawn failed: {}", self.config.name, e);
                if mode.exchanges_data() {
                    self.registry.unbind(&self.config.name);
                }
                self.transition(UnitState::Stopped, LifecycleEvent::Stopped);
                return Err(UnitError::Spawn(e.to_string()));
            }
        };
        self.worker = Some(Worker { stop_tx, handle });

        info!(
            "Unit '{}' ({}) running: period={}ms, mode={:?}, in={}B, out={}B",
            self.config.name,
            self.config.kind,
            self.config.period_ms,
            mode,
            inputs.byte_len(),
            outputs.byte_len()
        );
        self.transition(UnitState::Running, LifecycleEvent::Started);
        Ok(())
    }

    /// Cancel the cycle loop, wait for it and release the channels.
    ///
    /// No-op unless the unit is running.
    ///
    /// # Errors
    /// `Unavailable` if the cycle thread panicked; the unit still ends up
    /// `Stopped` with its channels released.
    pub fn stop(&mut self) -> Result<(), UnitError> {
        if self.state != UnitState::Running {
            return Ok(());
        }
        self.transition(UnitState::Stopping, LifecycleEvent::Stopping);

        let mut result = Ok(());
        if let Some(worker) = self.worker.take() {
            // The thread may already have exited; a closed channel is fine.
            let _ = worker.stop_tx.send(());
            match worker.handle.join() {
                Ok(mut unit) => {
                    unit.on_stop();
                    self.unit = Some(unit);
                }
                Err(_) => {
                    error!("Unit '{}' cycle thread panicked", self.config.name);
                    result = Err(UnitError::Unavailable(self.config.name.clone()));
                }
            }
        }

        if self.config.io.mode().exchanges_data() {
            self.registry.unbind(&self.config.name);
        }
        let stats = self.stats();
        info!(
            "Unit '{}' stopped after {} cycles (avg={}ns, max={}ns, overruns={}, failures={})",
            self.config.name,
            stats.cycle_count,
            stats.avg_cycle_ns(),
            stats.max_cycle_ns,
            stats.overruns,
            stats.update_failures
        );
        self.transition(UnitState::Stopped, LifecycleEvent::Stopped);
        result
    }

    fn transition(&mut self, state: UnitState, event: LifecycleEvent) {
        debug!("Unit '{}': {} -> {}", self.config.name, self.state, state);
        self.state = state;
        // No subscribers is not an error.
        let _ = self.lifecycle.send(LifecycleNotice {
            unit: self.config.name.clone(),
            event,
        });
    }
}

impl Drop for UnitRunner {
    fn drop(&mut self) {
        if self.state == UnitState::Running {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for UnitRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRunner")
            .field("name", &self.config.name)
            .field("kind", &self.config.kind)
            .field("state", &self.state)
            .finish()
    }
}

// ─── Cycle Thread ───────────────────────────────────────────────────

/// Everything the cycle thread owns.
struct CycleLoop {
    name: String,
    unit: Box<dyn DeviceUnit>,
    input: Option<ChannelHandle>,
    output: Option<ChannelHandle>,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    period: Duration,
    start_delay: Duration,
    cpu_core: Option<usize>,
    rt_priority: Option<i32>,
    time_scale: TimeScale,
    stats: Arc<Mutex<CycleStats>>,
}

impl CycleLoop {
    fn run(mut self, stop: Receiver<()>) -> Box<dyn DeviceUnit> {
        if let Err(e) = rt_setup(self.cpu_core, self.rt_priority) {
            warn!("Unit '{}': RT setup failed, running unpinned: {}", self.name, e);
        }

        let mut pacer = Pacer::new(self.period, self.start_delay);
        let mut stats = CycleStats::new();
        let mut channel_faults: u64 = 0;
        let mut last_wake = pacer.next_deadline() - self.period;
        let mut cycle: u64 = 0;

        loop {
            let latency = match pacer.wait(&stop) {
                Tick::Due { latency } => latency,
                Tick::Cancelled => break,
            };
            let wake = Instant::now();
            let dt = wake.saturating_duration_since(last_wake);
            last_wake = wake;

            if let Some(input) = &self.input {
                if let Err(e) = input.read_into(&mut self.in_buf) {
                    channel_faults += 1;
                    log_channel_fault(&self.name, &e, channel_faults);
                }
            }

            let mut io = UnitIo {
                inputs: &self.in_buf,
                outputs: &mut self.out_buf,
                cycle,
                dt,
                time_scale: self.time_scale.get(),
            };
            if let Err(e) = self.unit.update(&mut io) {
                stats.update_failures += 1;
                if should_log_occurrence(stats.update_failures) {
                    warn!(
                        "Unit '{}' update failed at cycle {} (#{} total): {}",
                        self.name, cycle, stats.update_failures, e
                    );
                }
            }

            if let Some(output) = &self.output {
                if let Err(e) = output.copy_in(&self.out_buf) {
                    channel_faults += 1;
                    log_channel_fault(&self.name, &e, channel_faults);
                }
            }

            stats.record(wake.elapsed(), latency);
            if pacer.overruns() != stats.overruns {
                stats.overruns = pacer.overruns();
                if should_log_occurrence(stats.overruns) {
                    warn!(
                        "Unit '{}' overran its {}ms period (#{} total), schedule re-anchored",
                        self.name,
                        self.period.as_millis(),
                        stats.overruns
                    );
                }
            }
            *self.stats.lock() = stats.clone();

            trace!("Unit '{}' cycle {} done", self.name, cycle);
            cycle += 1;
        }

        debug!("Unit '{}' cycle loop exited after {} cycles", self.name, cycle);
        self.unit
    }
}

fn log_channel_fault(name: &str, err: &ChannelError, count: u64) {
    match err {
        ChannelError::NotBound(_) => trace!("Unit '{}': {}", name, err),
        ChannelError::SizeMismatch { .. } if should_log_occurrence(count) => {
            warn!("Unit '{}': {} (#{} total)", name, err, count)
        }
        ChannelError::SizeMismatch { .. } => {}
    }
}
