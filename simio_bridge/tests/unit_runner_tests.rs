//! Unit runner integration tests: lifecycle, cycle timing and channel flow.

use parking_lot::Mutex;
use simio_bridge::control::TimeScale;
use simio_bridge::registry::ChannelRegistry;
use simio_bridge::runner::UnitRunner;
use simio_bridge::unit_registry::UnitRegistry;
use simio_common::unit::config::{FieldConfig, UnitConfig, UnitIoConfig};
use simio_common::unit::driver::{DeviceUnit, UnitError, UnitIo, UnitSetup};
use simio_common::unit::state::{LifecycleEvent, LifecycleNotice, UnitState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Records the wall-clock time and time scale of every update.
#[derive(Clone, Default)]
struct Trace {
    wakes: Arc<Mutex<Vec<Instant>>>,
    scales: Arc<Mutex<Vec<f64>>>,
}

struct TraceUnit {
    trace: Trace,
    work: Duration,
    fail_updates: bool,
}

impl DeviceUnit for TraceUnit {
    fn kind(&self) -> &'static str {
        "trace"
    }

    fn configure(&mut self, _setup: &UnitSetup<'_>) -> Result<(), UnitError> {
        Ok(())
    }

    fn update(&mut self, io: &mut UnitIo<'_>) -> Result<(), UnitError> {
        self.trace.wakes.lock().push(Instant::now());
        self.trace.scales.lock().push(io.time_scale);
        if !self.work.is_zero() {
            thread::sleep(self.work);
        }
        if self.fail_updates {
            return Err(UnitError::Update("simulated fault".into()));
        }
        Ok(())
    }
}

struct Harness {
    runner: UnitRunner,
    registry: ChannelRegistry,
    events: broadcast::Receiver<LifecycleNotice>,
    time_scale: TimeScale,
}

fn harness(config: UnitConfig, unit: Box<dyn DeviceUnit>) -> Harness {
    let registry = ChannelRegistry::new();
    let time_scale = TimeScale::new();
    let (tx, events) = broadcast::channel(32);
    let runner = UnitRunner::new(config, unit, registry.clone(), time_scale.clone(), tx);
    Harness {
        runner,
        registry,
        events,
        time_scale,
    }
}

fn trace_harness(period_ms: u64, work: Duration, fail_updates: bool) -> (Harness, Trace) {
    let trace = Trace::default();
    let unit = TraceUnit {
        trace: trace.clone(),
        work,
        fail_updates,
    };
    let config = UnitConfig::new("trace", "trace", period_ms).with_io(UnitIoConfig::AddressMapped {
        input_bytes: 4,
        output_bytes: 4,
    });
    (harness(config, Box::new(unit)), trace)
}

fn drain(events: &mut broadcast::Receiver<LifecycleNotice>) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    while let Ok(notice) = events.try_recv() {
        seen.push(notice.event);
    }
    seen
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn lifecycle_notifications_fire_once_per_transition() {
    let (mut h, _trace) = trace_harness(5, Duration::ZERO, false);

    h.runner.start().unwrap();
    h.runner.stop().unwrap();
    h.runner.stop().unwrap();

    assert_eq!(
        drain(&mut h.events),
        vec![
            LifecycleEvent::Starting,
            LifecycleEvent::Started,
            LifecycleEvent::Stopping,
            LifecycleEvent::Stopped,
        ]
    );
    assert_eq!(h.runner.state(), UnitState::Stopped);
}

#[test]
fn failed_configuration_aborts_to_stopped() {
    let config = UnitConfig::new("hb", "heartbeat", 5).with_io(UnitIoConfig::Structured {
        inputs: vec![],
        outputs: vec![FieldConfig::new("not_a_counter", "u16")],
    });
    let unit = UnitRegistry::with_builtin().create("heartbeat").unwrap();
    let mut h = harness(config, unit);

    assert!(matches!(h.runner.start(), Err(UnitError::Config(_))));
    assert_eq!(h.runner.state(), UnitState::Stopped);
    assert_eq!(
        drain(&mut h.events),
        vec![LifecycleEvent::Starting, LifecycleEvent::Stopped]
    );
    assert!(!h.registry.outputs().contains("hb"));
}

#[test]
fn update_failures_do_not_stop_the_loop() {
    let (mut h, trace) = trace_harness(5, Duration::ZERO, true);
    h.runner.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || trace.wakes.lock().len() >= 5));
    assert_eq!(h.runner.state(), UnitState::Running);
    h.runner.stop().unwrap();

    let stats = h.runner.stats();
    assert!(stats.update_failures >= 5);
    assert_eq!(stats.update_failures, stats.cycle_count);
}

#[test]
fn cycle_span_stays_within_one_period_of_n_periods() {
    let period = Duration::from_millis(20);
    let (mut h, trace) = trace_harness(20, Duration::from_millis(8), false);
    let iterations = 25;

    h.runner.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || trace.wakes.lock().len() >= iterations));
    h.runner.stop().unwrap();

    let wakes = trace.wakes.lock();
    let span = wakes[iterations - 1] - wakes[0];
    let expected = period * (iterations as u32 - 1);
    let drift = if span > expected { span - expected } else { expected - span };
    assert!(
        drift < period,
        "span {span:?} drifted {drift:?} from {expected:?}"
    );
}

#[test]
fn stop_completes_within_one_period() {
    let period = Duration::from_millis(100);
    let (mut h, trace) = trace_harness(100, Duration::ZERO, false);
    h.runner.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !trace.wakes.lock().is_empty()));

    let requested = Instant::now();
    h.runner.stop().unwrap();
    let elapsed = requested.elapsed();

    assert!(elapsed < period, "stop took {elapsed:?}");
    assert!(!h.registry.inputs().contains("trace"));
    assert!(!h.registry.outputs().contains("trace"));
}

#[test]
fn start_delay_postpones_first_cycle_and_is_cancellable() {
    let (mut h, trace) = trace_harness(5, Duration::ZERO, false);
    let mut config = h.runner.config().clone();
    config.start_delay_ms = 10_000;
    let unit = TraceUnit {
        trace: trace.clone(),
        work: Duration::ZERO,
        fail_updates: false,
    };
    h = harness(config, Box::new(unit));

    h.runner.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(trace.wakes.lock().is_empty());

    let requested = Instant::now();
    h.runner.stop().unwrap();
    assert!(requested.elapsed() < Duration::from_secs(1));
    assert!(trace.wakes.lock().is_empty());
}

#[test]
fn update_step_sees_time_scale() {
    let (mut h, trace) = trace_harness(5, Duration::ZERO, false);
    h.time_scale.set(3.0);
    h.runner.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !trace.scales.lock().is_empty()));
    h.runner.stop().unwrap();
    assert_eq!(trace.scales.lock()[0], 3.0);
}

#[test]
fn loopback_moves_inputs_to_outputs_through_registry() {
    let config = UnitConfig::new("lb", "loopback", 5).with_io(UnitIoConfig::AddressMapped {
        input_bytes: 3,
        output_bytes: 3,
    });
    let unit = UnitRegistry::with_builtin().create("loopback").unwrap();
    let mut h = harness(config, unit);
    h.runner.start().unwrap();

    h.registry.inputs().copy_in("lb", &[1, 2, 3]).unwrap();
    let mirrored = wait_until(Duration::from_secs(2), || {
        h.registry
            .outputs()
            .copy_out("lb")
            .is_some_and(|b| b.as_ref() == [1, 2, 3])
    });
    h.runner.stop().unwrap();
    assert!(mirrored);
}

#[test]
fn heartbeat_counter_reaches_output_channel() {
    let config = UnitConfig::new("hb", "heartbeat", 5).with_io(UnitIoConfig::Structured {
        inputs: vec![],
        outputs: vec![FieldConfig::new("counter", "u32")],
    });
    let unit = UnitRegistry::with_builtin().create("heartbeat").unwrap();
    let mut h = harness(config, unit);
    h.runner.start().unwrap();

    let counting = wait_until(Duration::from_secs(2), || {
        h.registry.outputs().copy_out("hb").is_some_and(|b| {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]]) >= 3
        })
    });
    h.runner.stop().unwrap();
    assert!(counting);
}

#[test]
fn restart_uses_fresh_statistics() {
    let (mut h, trace) = trace_harness(5, Duration::ZERO, false);
    h.runner.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || trace.wakes.lock().len() >= 3));
    h.runner.stop().unwrap();
    let first = h.runner.stats().cycle_count;
    assert!(first >= 3);

    h.runner.start().unwrap();
    assert!(h.runner.stats().cycle_count < first);
    h.runner.stop().unwrap();
}

#[test]
fn unit_without_io_cycles_without_binding_channels() {
    let trace = Trace::default();
    let unit = TraceUnit {
        trace: trace.clone(),
        work: Duration::ZERO,
        fail_updates: false,
    };
    let mut h = harness(UnitConfig::new("clock", "trace", 5), Box::new(unit));

    h.runner.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || trace.wakes.lock().len() >= 3));
    assert_eq!(h.runner.state(), UnitState::Running);
    assert!(h.registry.inputs().is_empty());
    assert!(h.registry.outputs().is_empty());

    h.runner.stop().unwrap();
    assert_eq!(h.runner.state(), UnitState::Stopped);
    assert!(h.runner.stats().cycle_count >= 3);
    assert_eq!(h.runner.stats().update_failures, 0);
    assert_eq!(
        drain(&mut h.events),
        vec![
            LifecycleEvent::Starting,
            LifecycleEvent::Started,
            LifecycleEvent::Stopping,
            LifecycleEvent::Stopped,
        ]
    );
}
