//! Bridge orchestrator.
//!
//! `Bridge` owns everything that lives for the process lifetime: the
//! channel registry, the record correlator, the time scale and one
//! [`UnitRunner`] per configured unit. The transport server is built from
//! its [`Exchange`] and runs separately on the async runtime.

use simio_common::config::Validate;
use simio_common::consts::DEFAULT_EVENT_CAPACITY;
use simio_common::record::RecordEvent;
use simio_common::unit::config::BridgeConfig;
use simio_common::unit::state::{LifecycleNotice, UnitState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::control::{ControlEvent, TimeScale};
use crate::cycle::{CycleStats, detect_rt_mode};
use crate::error::BridgeError;
use crate::record::RecordCorrelator;
use crate::registry::ChannelRegistry;
use crate::runner::UnitRunner;
use crate::transport::{Exchange, FrameLimits};
use crate::unit_registry::UnitRegistry;

/// Process-wide bridge state.
pub struct Bridge {
    config: BridgeConfig,
    registry: ChannelRegistry,
    correlator: Arc<RecordCorrelator>,
    factories: UnitRegistry,
    units: Vec<UnitRunner>,
    time_scale: TimeScale,
    lifecycle: broadcast::Sender<LifecycleNotice>,
}

impl Bridge {
    /// Validate `config` and create (but not start) every unit.
    ///
    /// # Errors
    /// Validation errors, including unknown unit kinds.
    pub fn new(config: BridgeConfig, factories: UnitRegistry) -> Result<Self, BridgeError> {
        config.validate()?;
        factories.check_kinds(&config)?;

        let (lifecycle, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let registry = ChannelRegistry::new();
        let time_scale = TimeScale::new();
        let units = build_units(&config, &factories, &registry, &time_scale, &lifecycle)?;

        if detect_rt_mode() {
            info!("Process runs under an RT scheduling policy");
        } else {
            info!("Process runs under standard (non-RT) scheduling");
        }
        info!(
            "Bridge created with {} unit(s), listen={}",
            units.len(),
            config.listen
        );

        Ok(Self {
            correlator: Arc::new(RecordCorrelator::new(config.record_event_capacity)),
            config,
            registry,
            factories,
            units,
            time_scale,
            lifecycle,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shared channel registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Shared record correlator (controller-side API).
    pub fn correlator(&self) -> &Arc<RecordCorrelator> {
        &self.correlator
    }

    /// Shared time scale.
    pub fn time_scale(&self) -> &TimeScale {
        &self.time_scale
    }

    /// Frame dispatch for a [`crate::transport::TransportServer`].
    pub fn exchange(&self) -> Exchange {
        Exchange::new(self.registry.clone(), Arc::clone(&self.correlator))
    }

    /// Length limits for incoming frames.
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits::uniform(self.config.max_frame_len)
    }

    /// Receiver of unit lifecycle transitions.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.lifecycle.subscribe()
    }

    /// Receiver of record-data completions.
    pub fn subscribe_records(&self) -> broadcast::Receiver<RecordEvent> {
        self.correlator.subscribe_events()
    }

    /// Configured unit names, in declaration order.
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(UnitRunner::name).collect()
    }

    /// Lifecycle state of `name`.
    pub fn unit_state(&self, name: &str) -> Option<UnitState> {
        self.find(name).map(UnitRunner::state)
    }

    /// Cycle statistics of `name`.
    pub fn unit_stats(&self, name: &str) -> Option<CycleStats> {
        self.find(name).map(UnitRunner::stats)
    }

    /// Start every unit with `auto_start`. Failures are logged and skipped.
    ///
    /// Returns the number of units started.
    pub fn start_auto(&mut self) -> usize {
        let mut started = 0;
        for runner in self.units.iter_mut().filter(|r| r.config().auto_start) {
            match runner.start() {
                Ok(()) => started += 1,
                Err(e) => warn!("Auto-start of '{}' skipped: {}", runner.name(), e),
            }
        }
        started
    }

    /// Start one unit.
    ///
    /// # Errors
    /// `UnknownUnit`, or the runner's start error.
    pub fn start_unit(&mut self, name: &str) -> Result<(), BridgeError> {
        self.find_mut(name)?.start()?;
        Ok(())
    }

    /// Stop one unit. Stopping a stopped unit is a no-op.
    ///
    /// # Errors
    /// `UnknownUnit`, or `Unavailable` if its cycle thread panicked.
    pub fn stop_unit(&mut self, name: &str) -> Result<(), BridgeError> {
        self.find_mut(name)?.stop()?;
        Ok(())
    }

    /// React to a control-plane event.
    ///
    /// A reload builds the new units first; if that fails, the running
    /// configuration is left untouched. The transport endpoint and frame
    /// limits are fixed at bind time and are not reloaded.
    ///
    /// # Errors
    /// Validation errors and unknown unit kinds of a reload.
    pub fn apply(&mut self, event: ControlEvent) -> Result<(), BridgeError> {
        match event {
            ControlEvent::TimeScale(factor) => {
                if self.time_scale.set(factor) {
                    info!("Time scale set to {}", factor);
                }
                Ok(())
            }
            ControlEvent::Reload(config) => {
                config.validate()?;
                self.factories.check_kinds(&config)?;
                let units = build_units(
                    &config,
                    &self.factories,
                    &self.registry,
                    &self.time_scale,
                    &self.lifecycle,
                )?;
                if config.listen != self.config.listen || config.max_frame_len != self.config.max_frame_len {
                    warn!("Reload does not rebind the transport; listen/max_frame_len changes need a restart");
                }

                self.stop_all();
                self.units = units;
                self.config = config;
                let started = self.start_auto();
                info!(
                    "Configuration reloaded: {} unit(s), {} auto-started",
                    self.units.len(),
                    started
                );
                Ok(())
            }
        }
    }

    /// Stop every unit and release all channels.
    pub fn shutdown(&mut self) {
        info!("Bridge shutdown requested");
        self.stop_all();
        info!("Bridge shutdown complete");
    }

    fn stop_all(&mut self) {
        for runner in self.units.iter_mut().rev() {
            if let Err(e) = runner.stop() {
                error!("Stopping '{}' failed: {}", runner.name(), e);
            }
        }
    }

    fn find(&self, name: &str) -> Option<&UnitRunner> {
        self.units.iter().find(|r| r.name() == name)
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut UnitRunner, BridgeError> {
        self.units
            .iter_mut()
            .find(|r| r.name() == name)
            .ok_or_else(|| BridgeError::UnknownUnit(name.to_string()))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn build_units(
    config: &BridgeConfig,
    factories: &UnitRegistry,
    registry: &ChannelRegistry,
    time_scale: &TimeScale,
    lifecycle: &broadcast::Sender<LifecycleNotice>,
) -> Result<Vec<UnitRunner>, BridgeError> {
    config
        .units
        .iter()
        .map(|unit_config| {
            let unit = factories.create(&unit_config.kind)?;
            Ok(UnitRunner::new(
                unit_config.clone(),
                unit,
                registry.clone(),
                time_scale.clone(),
                lifecycle.clone(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simio_common::config::ConfigLoader;
    use simio_common::config::ConfigError;
    use simio_common::unit::config::{UnitConfig, UnitIoConfig};

    fn config(units: Vec<UnitConfig>) -> BridgeConfig {
        BridgeConfig {
            listen: "127.0.0.1:0".to_string(),
            units,
            ..BridgeConfig::default()
        }
    }

    fn loopback(name: &str, auto_start: bool) -> UnitConfig {
        let mut unit = UnitConfig::new(name, "loopback", 5).with_io(UnitIoConfig::AddressMapped {
            input_bytes: 2,
            output_bytes: 2,
        });
        unit.auto_start = auto_start;
        unit
    }

    #[test]
    fn unknown_kind_fails_creation() {
        let cfg = config(vec![UnitConfig::new("x", "pump", 10)]);
        match Bridge::new(cfg, UnitRegistry::with_builtin()) {
            Err(BridgeError::Config(ConfigError::ValidationError(msg))) => {
                assert!(msg.contains("unknown kind 'pump'"));
                assert!(msg.contains("registered: heartbeat, loopback"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn oversized_unit_block_fails_creation() {
        let mut cfg = config(vec![UnitConfig::new("rack", "loopback", 10).with_io(
            UnitIoConfig::AddressMapped {
                input_bytes: 536_870_912,
                output_bytes: 8,
            },
        )]);
        cfg.max_frame_len = 4096;
        assert!(matches!(
            Bridge::new(cfg, UnitRegistry::with_builtin()),
            Err(BridgeError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn auto_start_only_flagged_units() {
        let cfg = config(vec![loopback("a", true), loopback("b", false)]);
        let mut bridge = Bridge::new(cfg, UnitRegistry::with_builtin()).unwrap();
        assert_eq!(bridge.start_auto(), 1);
        assert_eq!(bridge.unit_state("a"), Some(UnitState::Running));
        assert_eq!(bridge.unit_state("b"), Some(UnitState::Idle));
        bridge.shutdown();
        assert_eq!(bridge.unit_state("a"), Some(UnitState::Stopped));
        assert!(bridge.registry().outputs().is_empty());
    }

    #[test]
    fn unknown_unit_name() {
        let mut bridge = Bridge::new(config(vec![]), UnitRegistry::with_builtin()).unwrap();
        assert!(matches!(bridge.start_unit("ghost"), Err(BridgeError::UnknownUnit(_))));
    }

    #[test]
    fn reload_replaces_units() {
        let mut bridge =
            Bridge::new(config(vec![loopback("old", true)]), UnitRegistry::with_builtin()).unwrap();
        bridge.start_auto();
        assert!(bridge.registry().outputs().contains("old"));

        bridge
            .apply(ControlEvent::Reload(config(vec![loopback("new", true)])))
            .unwrap();
        assert_eq!(bridge.unit_names(), vec!["new"]);
        assert!(!bridge.registry().outputs().contains("old"));
        assert!(bridge.registry().outputs().contains("new"));
        bridge.shutdown();
    }

    #[test]
    fn failed_reload_keeps_running_units() {
        let mut bridge =
            Bridge::new(config(vec![loopback("keep", true)]), UnitRegistry::with_builtin()).unwrap();
        bridge.start_auto();

        let bad = config(vec![UnitConfig::new("x", "pump", 10)]);
        assert!(bridge.apply(ControlEvent::Reload(bad)).is_err());
        assert_eq!(bridge.unit_state("keep"), Some(UnitState::Running));
        bridge.shutdown();
    }

    #[test]
    fn time_scale_event() {
        let mut bridge = Bridge::new(config(vec![]), UnitRegistry::with_builtin()).unwrap();
        bridge.apply(ControlEvent::TimeScale(4.0)).unwrap();
        assert_eq!(bridge.time_scale().get(), 4.0);
        bridge.apply(ControlEvent::TimeScale(-1.0)).unwrap();
        assert_eq!(bridge.time_scale().get(), 4.0);
    }

    #[test]
    fn sample_config_builds() {
        let config = BridgeConfig::parse(include_str!("../config/bridge.toml")).unwrap();
        let bridge = Bridge::new(config, UnitRegistry::with_builtin()).unwrap();
        assert_eq!(bridge.unit_names(), vec!["conveyor", "plc_heartbeat", "rack_1"]);
        assert_eq!(bridge.frame_limits(), FrameLimits::uniform(1_048_576));
    }
}
