//! Outward notifications: sound/feedback signal events and cab confirmations
//!
//! Automata never call the sinks directly. They record notifications in an
//! [`Outbox`] that the owning vehicle drains into the simulator's sinks once
//! per tick.

use log::{info, warn};

/// Symbolic event sent to the sound/feedback collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainEvent {
    BatterySwitchOn,
    BatterySwitchOff,
    BatterySwitchCommandOn,
    BatterySwitchCommandOff,
    MasterKeyOn,
    MasterKeyOff,
    /// Pantograph number (1-based) reached Up
    PantographUp(usize),
    /// Pantograph number (1-based) reached Down
    PantographDown(usize),
    PantographRaising(usize),
    PantographLowering(usize),
    CircuitBreakerOpen,
    CircuitBreakerClosing,
    CircuitBreakerClosed,
    CircuitBreakerClosingOrderOn,
    CircuitBreakerClosingOrderOff,
    CircuitBreakerOpeningOrderOn,
    CircuitBreakerOpeningOrderOff,
    TractionCutOffRelayOpen,
    TractionCutOffRelayClosing,
    TractionCutOffRelayClosed,
    TractionCutOffRelayClosingOrderOn,
    TractionCutOffRelayClosingOrderOff,
    ElectricTrainSupplyOn,
    ElectricTrainSupplyOff,
    ElectricTrainSupplyCommandOn,
    ElectricTrainSupplyCommandOff,
    /// Diesel engine number (1-based) started turning
    EnginePowerOn(usize),
    /// Diesel engine number (1-based) stopped turning
    EnginePowerOff(usize),
    EngineStarting(usize),
    EngineStopping(usize),
    GearUp,
    GearDown,
    GearPosition(usize),
    ClutchEngaged,
    ClutchDisengaged,
    PowerSupplyMainOn,
    PowerSupplyMainOff,
    PowerSupplyAuxiliaryOn,
    PowerSupplyAuxiliaryOff,
    Couple,
    CoupleImpact,
    Uncouple,
}

/// Receiver for [`TrainEvent`]s (fire and forget)
pub trait SignalSink {
    fn signal(&mut self, event: TrainEvent);
}

impl SignalSink for Vec<TrainEvent> {
    fn signal(&mut self, event: TrainEvent) {
        self.push(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NullSink;

impl SignalSink for NullSink {
    fn signal(&mut self, _event: TrainEvent) {}
}

/// Cab control a confirmation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CabControl {
    BatterySwitch,
    MasterKey,
    Pantograph(usize),
    CircuitBreaker,
    TractionCutOffRelay,
    ElectricTrainSupply,
    DieselEngine,
    GearBox,
    Coupler,
    Activity,
    PlayerTrain,
}

/// Setting reported by a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CabSetting {
    On,
    Off,
    Increase,
    Decrease,
    Warn,
    Neutral,
}

/// A user-facing message produced by the core
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Confirm {
        control: CabControl,
        setting: CabSetting,
        text: String,
    },
    Warning(String),
    Information(String),
}

/// UI collaborator that displays confirmations
pub trait Confirmer {
    fn confirm(&mut self, control: CabControl, setting: CabSetting, text: &str);
    fn warning(&mut self, text: &str);
    fn information(&mut self, text: &str);
}

/// Confirmer that writes everything to the log
#[derive(Debug, Default)]
pub struct LogConfirmer;

impl Confirmer for LogConfirmer {
    fn confirm(&mut self, control: CabControl, setting: CabSetting, text: &str) {
        info!("{:?} {:?}: {}", control, setting, text);
    }

    fn warning(&mut self, text: &str) {
        warn!("{}", text);
    }

    fn information(&mut self, text: &str) {
        info!("{}", text);
    }
}

impl Confirmer for Vec<Message> {
    fn confirm(&mut self, control: CabControl, setting: CabSetting, text: &str) {
        self.push(Message::Confirm {
            control,
            setting,
            text: text.to_string(),
        });
    }

    fn warning(&mut self, text: &str) {
        self.push(Message::Warning(text.to_string()));
    }

    fn information(&mut self, text: &str) {
        self.push(Message::Information(text.to_string()));
    }
}

/// Pending notifications recorded during one update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    pub signals: Vec<TrainEvent>,
    pub messages: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&mut self, event: TrainEvent) {
        self.signals.push(event);
    }

    pub fn confirm(&mut self, control: CabControl, setting: CabSetting, text: impl Into<String>) {
        self.messages.push(Message::Confirm {
            control,
            setting,
            text: text.into(),
        });
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.messages.push(Message::Warning(text.into()));
    }

    pub fn inform(&mut self, text: impl Into<String>) {
        self.messages.push(Message::Information(text.into()));
    }

    /// Moves everything from `other` into this outbox, preserving order
    pub fn append(&mut self, other: &mut Outbox) {
        self.signals.append(&mut other.signals);
        self.messages.append(&mut other.messages);
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.signals.clear();
        self.messages.clear();
    }

    /// Delivers and clears all pending notifications
    pub fn drain_into(&mut self, sink: &mut dyn SignalSink, confirmer: &mut dyn Confirmer) {
        for event in self.signals.drain(..) {
            sink.signal(event);
        }
        for message in self.messages.drain(..) {
            match message {
                Message::Confirm {
                    control,
                    setting,
                    text,
                } => confirmer.confirm(control, setting, &text),
                Message::Warning(text) => confirmer.warning(&text),
                Message::Information(text) => confirmer.information(&text),
            }
        }
    }

    pub fn count(&self, event: TrainEvent) -> usize {
        self.signals.iter().filter(|e| **e == event).count()
    }
}
