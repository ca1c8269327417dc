//! Circuit breakers and traction cut-off relays
//!
//! Both are the same Open → Closing → Closed automaton. What differs is the
//! signal vocabulary and the events they answer to, captured by
//! [`RelayKind`]. The closing decision itself belongs to a script: the
//! built-in `Automatic` script closes as soon as it is authorised, `Manual`
//! also needs the driver's closing order.

use bitcode::{Decode, Encode};
use log::debug;
use serde::{Deserialize, Serialize};

use super::super::signals::{CabControl, CabSetting, Outbox, TrainEvent};
use super::super::timer::Timer;
use super::script::{PowerSupplyScript, ScriptTable};
use super::state::{PowerSupplyEvent, RelayState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayKind {
    CircuitBreaker,
    TractionCutOffRelay,
}

/// How the driver commands the relay from the cab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelayDriverControls {
    /// Momentary close and open buttons
    PushButtons,
    /// A latching two-position switch
    #[default]
    Switch,
    /// No cab control; orders are ignored
    Unfitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// `Automatic`, `Manual`, or a registered custom script
    pub script: String,
    pub closing_delay_s: f32,
    pub driver_controls: RelayDriverControls,
    /// The closing authorisation also needs the driver's own authorisation switch
    pub driver_closing_authorization_required: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            script: "Automatic".to_string(),
            closing_delay_s: 0.0,
            driver_controls: RelayDriverControls::Switch,
            driver_closing_authorization_required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct RelayStateSnapshot {
    pub state: RelayState,
    pub driver_closing_order: bool,
    pub driver_opening_order: bool,
    pub driver_closing_authorization: bool,
    pub closing_authorization: bool,
    pub closing_timer: Timer,
}

/// The part of a relay a script reads and drives
#[derive(Debug, Clone)]
pub struct RelayCore {
    kind: RelayKind,
    controls: RelayDriverControls,
    state: RelayState,
    driver_closing_order: bool,
    driver_opening_order: bool,
    driver_closing_authorization: bool,
    closing_authorization: bool,
    closing_timer: Timer,
    outbox: Outbox,
}

impl RelayCore {
    pub fn new(kind: RelayKind, controls: RelayDriverControls, closing_delay_s: f32) -> Self {
        Self {
            kind,
            controls,
            state: RelayState::Open,
            driver_closing_order: false,
            driver_opening_order: false,
            driver_closing_authorization: false,
            closing_authorization: false,
            closing_timer: Timer::new(closing_delay_s),
            outbox: Outbox::new(),
        }
    }

    pub fn kind(&self) -> RelayKind {
        self.kind
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Moves to `state`, signalling the edge
    pub fn set_state(&mut self, state: RelayState) {
        if self.state == state {
            return;
        }
        debug!("{:?}: {:?} -> {:?}", self.kind, self.state, state);
        self.state = state;
        let event = match (self.kind, state) {
            (RelayKind::CircuitBreaker, RelayState::Open) => TrainEvent::CircuitBreakerOpen,
            (RelayKind::CircuitBreaker, RelayState::Closing) => TrainEvent::CircuitBreakerClosing,
            (RelayKind::CircuitBreaker, RelayState::Closed) => TrainEvent::CircuitBreakerClosed,
            (RelayKind::TractionCutOffRelay, RelayState::Open) => TrainEvent::TractionCutOffRelayOpen,
            (RelayKind::TractionCutOffRelay, RelayState::Closing) => {
                TrainEvent::TractionCutOffRelayClosing
            }
            (RelayKind::TractionCutOffRelay, RelayState::Closed) => {
                TrainEvent::TractionCutOffRelayClosed
            }
            (_, RelayState::Unavailable) => return,
        };
        self.outbox.signal(event);
    }

    pub fn closing_authorization(&self) -> bool {
        self.closing_authorization
    }

    pub fn driver_closing_order(&self) -> bool {
        self.driver_closing_order
    }

    pub fn driver_opening_order(&self) -> bool {
        self.driver_opening_order
    }

    pub fn driver_closing_authorization(&self) -> bool {
        self.driver_closing_authorization
    }

    pub fn closing_timer(&mut self) -> &mut Timer {
        &mut self.closing_timer
    }

    pub fn set_driver_closing_order(&mut self, value: bool) {
        if self.driver_closing_order == value {
            return;
        }
        self.driver_closing_order = value;
        match self.kind {
            RelayKind::CircuitBreaker => self.outbox.signal(if value {
                TrainEvent::CircuitBreakerClosingOrderOn
            } else {
                TrainEvent::CircuitBreakerClosingOrderOff
            }),
            RelayKind::TractionCutOffRelay => self.outbox.signal(if value {
                TrainEvent::TractionCutOffRelayClosingOrderOn
            } else {
                TrainEvent::TractionCutOffRelayClosingOrderOff
            }),
        }
    }

    pub fn set_driver_opening_order(&mut self, value: bool) {
        if self.driver_opening_order == value {
            return;
        }
        self.driver_opening_order = value;
        if self.kind == RelayKind::CircuitBreaker {
            self.outbox.signal(if value {
                TrainEvent::CircuitBreakerOpeningOrderOn
            } else {
                TrainEvent::CircuitBreakerOpeningOrderOff
            });
        }
    }

    fn control(&self) -> CabControl {
        match self.kind {
            RelayKind::CircuitBreaker => CabControl::CircuitBreaker,
            RelayKind::TractionCutOffRelay => CabControl::TractionCutOffRelay,
        }
    }

    /// Translates cab events into driver orders
    fn apply_driver_event(&mut self, event: PowerSupplyEvent) {
        use PowerSupplyEvent::*;

        if self.controls == RelayDriverControls::Unfitted {
            return;
        }
        let control = self.control();
        let is_breaker = self.kind == RelayKind::CircuitBreaker;
        match event {
            CloseCircuitBreaker | CloseTractionCutOffRelay
                if is_breaker == (event == CloseCircuitBreaker) =>
            {
                self.set_driver_opening_order(false);
                self.set_driver_closing_order(true);
                self.outbox.confirm(control, CabSetting::On, "close");
            }
            OpenCircuitBreaker | OpenTractionCutOffRelay
                if is_breaker == (event == OpenCircuitBreaker) =>
            {
                self.set_driver_closing_order(false);
                self.set_driver_opening_order(true);
                self.outbox.confirm(control, CabSetting::Off, "open");
            }
            CloseCircuitBreakerButtonPressed | CloseTractionCutOffRelayButtonPressed
                if is_breaker == (event == CloseCircuitBreakerButtonPressed) =>
            {
                self.set_driver_closing_order(true);
                self.outbox.confirm(control, CabSetting::On, "close button pressed");
            }
            CloseCircuitBreakerButtonReleased | CloseTractionCutOffRelayButtonReleased
                if is_breaker == (event == CloseCircuitBreakerButtonReleased) =>
            {
                self.set_driver_closing_order(false);
            }
            OpenCircuitBreakerButtonPressed | OpenTractionCutOffRelayButtonPressed
                if is_breaker == (event == OpenCircuitBreakerButtonPressed) =>
            {
                self.set_driver_opening_order(true);
                self.outbox.confirm(control, CabSetting::Off, "open button pressed");
            }
            OpenCircuitBreakerButtonReleased | OpenTractionCutOffRelayButtonReleased
                if is_breaker == (event == OpenCircuitBreakerButtonReleased) =>
            {
                self.set_driver_opening_order(false);
            }
            GiveCircuitBreakerClosingAuthorization if is_breaker => {
                self.driver_closing_authorization = true;
                self.outbox
                    .confirm(control, CabSetting::On, "closing authorization given");
            }
            RemoveCircuitBreakerClosingAuthorization if is_breaker => {
                self.driver_closing_authorization = false;
                self.outbox
                    .confirm(control, CabSetting::Off, "closing authorization removed");
            }
            _ => {}
        }
    }
}

/// Closes as soon as it is authorised
#[derive(Debug, Default)]
pub struct AutomaticRelayScript;

impl PowerSupplyScript<RelayCore> for AutomaticRelayScript {
    fn name(&self) -> &str {
        "Automatic"
    }

    fn update(&mut self, relay: &mut RelayCore, elapsed_s: f32) {
        match relay.state() {
            RelayState::Open => {
                if relay.closing_authorization() {
                    relay.closing_timer().start();
                    relay.set_state(RelayState::Closing);
                }
            }
            RelayState::Closing => {
                if !relay.closing_authorization() {
                    relay.closing_timer().stop();
                    relay.set_state(RelayState::Open);
                } else {
                    relay.closing_timer().update(elapsed_s);
                    if relay.closing_timer().triggered() {
                        relay.closing_timer().stop();
                        relay.set_state(RelayState::Closed);
                    }
                }
            }
            RelayState::Closed => {
                if !relay.closing_authorization() {
                    relay.set_state(RelayState::Open);
                }
            }
            RelayState::Unavailable => {}
        }
    }
}

/// Needs the driver's closing order on top of the authorisation
#[derive(Debug, Default)]
pub struct ManualRelayScript;

impl PowerSupplyScript<RelayCore> for ManualRelayScript {
    fn name(&self) -> &str {
        "Manual"
    }

    fn update(&mut self, relay: &mut RelayCore, elapsed_s: f32) {
        match relay.state() {
            RelayState::Open => {
                if relay.closing_authorization() && relay.driver_closing_order() {
                    relay.closing_timer().start();
                    relay.set_state(RelayState::Closing);
                }
            }
            RelayState::Closing => {
                if !relay.closing_authorization() || !relay.driver_closing_order() {
                    relay.closing_timer().stop();
                    relay.set_state(RelayState::Open);
                } else {
                    relay.closing_timer().update(elapsed_s);
                    if relay.closing_timer().triggered() {
                        relay.closing_timer().stop();
                        relay.set_state(RelayState::Closed);
                    }
                }
            }
            RelayState::Closed => {
                if !relay.closing_authorization() || relay.driver_opening_order() {
                    relay.set_state(RelayState::Open);
                }
            }
            RelayState::Unavailable => {}
        }
    }
}

/// A scripted relay: the automaton state plus the behaviour that drives it
#[derive(Debug)]
pub struct Relay {
    core: RelayCore,
    script: Box<dyn PowerSupplyScript<RelayCore>>,
    driver_closing_authorization_required: bool,
}

impl Relay {
    /// Builds a relay, resolving its script by name
    pub fn new(kind: RelayKind, config: &RelayConfig, scripts: &ScriptTable<RelayCore>) -> Self {
        let script: Box<dyn PowerSupplyScript<RelayCore>> = match config.script.as_str() {
            "Automatic" | "" => Box::new(AutomaticRelayScript),
            "Manual" => Box::new(ManualRelayScript),
            name => scripts.create_or(name, || Box::new(AutomaticRelayScript)),
        };
        let mut relay = Self {
            core: RelayCore::new(kind, config.driver_controls, config.closing_delay_s),
            script,
            driver_closing_authorization_required: config.driver_closing_authorization_required,
        };
        relay.script.initialize(&mut relay.core);
        relay
    }

    pub fn circuit_breaker(config: &RelayConfig, scripts: &ScriptTable<RelayCore>) -> Self {
        Self::new(RelayKind::CircuitBreaker, config, scripts)
    }

    pub fn traction_cut_off_relay(config: &RelayConfig, scripts: &ScriptTable<RelayCore>) -> Self {
        Self::new(RelayKind::TractionCutOffRelay, config, scripts)
    }

    pub fn state(&self) -> RelayState {
        self.core.state()
    }

    pub fn is_closed(&self) -> bool {
        self.core.state() == RelayState::Closed
    }

    pub fn script_name(&self) -> &str {
        self.script.name()
    }

    pub fn core(&self) -> &RelayCore {
        &self.core
    }

    /// Sets this tick's authorisation from upstream state
    ///
    /// When the relay needs the driver's own authorisation it is folded in
    /// here, so scripts only ever see one boolean.
    pub fn set_closing_authorization(&mut self, upstream: bool) {
        self.core.closing_authorization = upstream
            && (!self.driver_closing_authorization_required
                || self.core.driver_closing_authorization);
    }

    pub fn update(&mut self, elapsed_s: f32) {
        self.script.update(&mut self.core, elapsed_s);
    }

    pub fn handle_event(&mut self, event: PowerSupplyEvent) {
        self.core.apply_driver_event(event);
        self.script.handle_event(&mut self.core, event);
    }

    /// Moves pending notifications into `outbox`
    pub fn drain_outbox(&mut self, outbox: &mut Outbox) {
        outbox.append(&mut self.core.outbox);
    }

    pub fn save(&self) -> RelayStateSnapshot {
        RelayStateSnapshot {
            state: self.core.state,
            driver_closing_order: self.core.driver_closing_order,
            driver_opening_order: self.core.driver_opening_order,
            driver_closing_authorization: self.core.driver_closing_authorization,
            closing_authorization: self.core.closing_authorization,
            closing_timer: self.core.closing_timer,
        }
    }

    pub fn restore(&mut self, snapshot: RelayStateSnapshot) {
        self.core.state = snapshot.state;
        self.core.driver_closing_order = snapshot.driver_closing_order;
        self.core.driver_opening_order = snapshot.driver_opening_order;
        self.core.driver_closing_authorization = snapshot.driver_closing_authorization;
        self.core.closing_authorization = snapshot.closing_authorization;
        self.core.closing_timer = snapshot.closing_timer;
    }
}
