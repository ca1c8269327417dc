//! Pluggable behaviour for power-supply components
//!
//! Every component (relay or whole-vehicle aggregate) delegates its decisions
//! to a [`PowerSupplyScript`] over a host type that exposes the component's
//! sub-systems. Built-in scripts are picked by name from configuration;
//! other names are looked up in a [`ScriptTable`] filled by the embedding
//! application, with a logged fallback to the built-in default.

use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

use super::cars::{ControlCarSystems, PassengerCarSystems};
use super::diesel::DieselSystems;
use super::dual_mode::DualModeSystems;
use super::electric::ElectricSystems;
use super::relay::RelayCore;
use super::state::PowerSupplyEvent;

/// Behaviour driving a power-supply host of type `H`
pub trait PowerSupplyScript<H>: fmt::Debug {
    /// Name used in logs and configuration
    fn name(&self) -> &str;

    /// Called once after the host is built
    fn initialize(&mut self, _host: &mut H) {}

    /// Advances the host by one tick
    fn update(&mut self, host: &mut H, elapsed_s: f32);

    /// Reacts to a driver or automation command
    fn handle_event(&mut self, _host: &mut H, _event: PowerSupplyEvent) {}
}

type ScriptFactory<H> = Box<dyn Fn() -> Box<dyn PowerSupplyScript<H>>>;

/// Named script factories for one host type
pub struct ScriptTable<H> {
    factories: HashMap<String, ScriptFactory<H>>,
}

impl<H> Default for ScriptTable<H> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<H> fmt::Debug for ScriptTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTable")
            .field("scripts", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<H> ScriptTable<H> {
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn PowerSupplyScript<H>> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates `name`, or the fallback when no such script is registered
    pub fn create_or(
        &self,
        name: &str,
        fallback: impl FnOnce() -> Box<dyn PowerSupplyScript<H>>,
    ) -> Box<dyn PowerSupplyScript<H>> {
        match self.factories.get(name) {
            Some(factory) => {
                debug!("Loaded power supply script {}", name);
                factory()
            }
            None => {
                let script = fallback();
                warn!(
                    "Power supply script {} not found, using {}",
                    name,
                    script.name()
                );
                script
            }
        }
    }
}

/// Custom scripts for every scriptable power-supply host
///
/// Names not found here fall back to the host's built-in default.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    pub relays: ScriptTable<RelayCore>,
    pub electric: ScriptTable<ElectricSystems>,
    pub diesel: ScriptTable<DieselSystems>,
    pub dual_mode: ScriptTable<DualModeSystems>,
    pub control_car: ScriptTable<ControlCarSystems>,
    pub passenger_car: ScriptTable<PassengerCarSystems>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
