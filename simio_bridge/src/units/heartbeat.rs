//! Heartbeat unit: proves to the peer that the cycle loop is alive.
//!
//! - Structured mode: writes a running counter into the output field
//!   `counter` and, if declared, the scaled simulation time in milliseconds
//!   into `sim_time_ms`. A missing `counter` field fails configuration.
//! - Address-mapped mode: writes the counter big-endian into the first
//!   (up to 4) output bytes.
//! - No I/O: counts cycles only.
//!
//! Parameter `step` (integer, default 1) sets the counter increment.

use simio_common::layout::LayoutField;
use simio_common::unit::driver::{DeviceUnit, UnitError, UnitIo, UnitSetup};
use simio_common::unit::state::IoMode;
use std::time::Duration;
use tracing::debug;

/// Registry kind.
pub const KIND: &str = "heartbeat";

/// Constructor stored in the unit registry.
pub fn create_unit() -> Box<dyn DeviceUnit> {
    Box::new(HeartbeatUnit::default())
}

/// Where the counter goes in the output block.
#[derive(Debug, Default)]
enum CounterSlot {
    #[default]
    Discard,
    Field(LayoutField),
    Prefix(usize),
}

/// Cycle counter with optional simulation clock.
#[derive(Debug, Default)]
pub struct HeartbeatUnit {
    counter: u64,
    step: u64,
    sim_time: Duration,
    counter_slot: CounterSlot,
    sim_time_field: Option<LayoutField>,
}

impl HeartbeatUnit {
    /// Current counter value.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Accumulated scaled simulation time.
    pub fn sim_time(&self) -> Duration {
        self.sim_time
    }
}

impl DeviceUnit for HeartbeatUnit {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn configure(&mut self, setup: &UnitSetup<'_>) -> Result<(), UnitError> {
        self.step = match setup.config.params.get("step") {
            None => 1,
            Some(value) => value
                .as_integer()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| {
                    UnitError::Config(format!("heartbeat 'step' must be a non-negative integer, got {value}"))
                })?,
        };

        self.counter_slot = match setup.mode {
            IoMode::None => CounterSlot::Discard,
            IoMode::AddressMapped => CounterSlot::Prefix(setup.outputs.byte_len().min(4)),
            IoMode::Structured => {
                let field = setup
                    .outputs
                    .field("counter")
                    .filter(|f| !f.kind.is_bit())
                    .ok_or_else(|| {
                        UnitError::Config(format!(
                            "unit '{}' declares no byte-aligned 'counter' output field",
                            setup.config.name
                        ))
                    })?;
                CounterSlot::Field(field.clone())
            }
        };
        self.sim_time_field = setup
            .outputs
            .field("sim_time_ms")
            .filter(|f| !f.kind.is_bit())
            .cloned();

        debug!(
            "Heartbeat '{}' configured: step={}, clock field={}",
            setup.config.name,
            self.step,
            self.sim_time_field.is_some()
        );
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), UnitError> {
        self.counter = 0;
        self.sim_time = Duration::ZERO;
        Ok(())
    }

    fn update(&mut self, io: &mut UnitIo<'_>) -> Result<(), UnitError> {
        self.counter = self.counter.wrapping_add(self.step);
        self.sim_time += io.scaled_dt();

        match &self.counter_slot {
            CounterSlot::Discard => {}
            CounterSlot::Field(field) => {
                if !field.write_uint(io.outputs, 0, self.counter) {
                    return Err(UnitError::Update(format!(
                        "output buffer too short for 'counter' ({} bytes)",
                        io.outputs.len()
                    )));
                }
            }
            CounterSlot::Prefix(n) => {
                let bytes = (self.counter as u32).to_be_bytes();
                let n = (*n).min(io.outputs.len());
                io.outputs[..n].copy_from_slice(&bytes[4 - n..]);
            }
        }

        if let Some(field) = &self.sim_time_field {
            field.write_uint(io.outputs, 0, self.sim_time.as_millis() as u64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simio_common::unit::config::{FieldConfig, UnitConfig, UnitIoConfig};

    fn configure(unit: &mut HeartbeatUnit, config: &UnitConfig) -> Result<(), UnitError> {
        let (inputs, outputs) = config.io.build_layouts();
        unit.configure(&UnitSetup {
            config,
            mode: config.io.mode(),
            inputs: &inputs,
            outputs: &outputs,
        })
    }

    fn cycle(unit: &mut HeartbeatUnit, out: &mut [u8], dt_ms: u64, scale: f64) {
        let mut io = UnitIo {
            inputs: &[],
            outputs: out,
            cycle: 0,
            dt: Duration::from_millis(dt_ms),
            time_scale: scale,
        };
        unit.update(&mut io).unwrap();
    }

    #[test]
    fn structured_counter_and_clock() {
        let config = UnitConfig::new("hb", KIND, 10).with_io(UnitIoConfig::Structured {
            inputs: vec![],
            outputs: vec![
                FieldConfig::new("alive", "bool"),
                FieldConfig::new("counter", "u16"),
                FieldConfig::new("sim_time_ms", "u32"),
            ],
        });
        let mut unit = HeartbeatUnit::default();
        configure(&mut unit, &config).unwrap();
        unit.on_start().unwrap();

        let mut out = [0u8; 7];
        cycle(&mut unit, &mut out, 10, 2.0);
        cycle(&mut unit, &mut out, 10, 2.0);

        assert_eq!(&out[1..3], &[0, 2]);
        assert_eq!(&out[3..7], &40u32.to_be_bytes());
        assert_eq!(unit.sim_time(), Duration::from_millis(40));
    }

    #[test]
    fn structured_without_counter_fails_configuration() {
        let config = UnitConfig::new("hb", KIND, 10).with_io(UnitIoConfig::Structured {
            inputs: vec![],
            outputs: vec![FieldConfig::new("other", "u8")],
        });
        let err = configure(&mut HeartbeatUnit::default(), &config).unwrap_err();
        assert!(matches!(err, UnitError::Config(_)));
    }

    #[test]
    fn address_mapped_prefix_and_step_param() {
        let mut config = UnitConfig::new("hb", KIND, 10).with_io(UnitIoConfig::AddressMapped {
            input_bytes: 0,
            output_bytes: 2,
        });
        config.params.insert("step".to_string(), toml::Value::Integer(300));

        let mut unit = HeartbeatUnit::default();
        configure(&mut unit, &config).unwrap();
        let mut out = [0u8; 2];
        cycle(&mut unit, &mut out, 1, 1.0);
        assert_eq!(out, 300u16.to_be_bytes());
        assert_eq!(unit.counter(), 300);
    }

    #[test]
    fn negative_step_rejected() {
        let mut config = UnitConfig::new("hb", KIND, 10);
        config.params.insert("step".to_string(), toml::Value::Integer(-1));
        assert!(configure(&mut HeartbeatUnit::default(), &config).is_err());
    }
}
