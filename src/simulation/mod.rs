//! Train simulation core
//!
//! Track geometry and travellers, vehicle power supplies, the activity
//! event engine and the simulator that drives them. Everything here runs
//! headless and can be exercised from tests or the console binary.

pub mod activity;
mod interpolator;
mod persist;
pub mod power_supply;
mod scenario;
mod signals;
mod simulator;
mod timer;
pub mod track;
mod train;
mod types;

pub use interpolator::{Interpolator, InterpolatorError};
pub use persist::{decode_or_warn, Saveable};
pub use scenario::{Scenario, SuperElevationConfig, TrackConfig};
pub use signals::{
    CabControl, CabSetting, Confirmer, LogConfirmer, Message, NullSink, Outbox, SignalSink,
    TrainEvent,
};
pub use simulator::{
    CancellationToken, Simulator, SimulatorSnapshot, MAX_COUPLING_SPEED_MPS,
    UNCOUPLE_SEPARATION_M,
};
pub use timer::Timer;
pub use train::{
    CarConfig, CarKind, CarSnapshot, Train, TrainCar, TrainConfig, TrainSnapshot, TrainStart,
    TrainType,
};
pub use types::{
    CarId, TrainId, Vec3, WorldLocation, GRAVITY_MPSS, STANDARD_GAUGE_M, STANDSTILL_SPEED_MPS,
    TILE_SIZE,
};
