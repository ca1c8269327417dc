//! Train Simulation Library
//!
//! The core of a railway simulator: track travellers, locomotive power
//! supplies, activities and the simulator loop, runnable headless.

pub mod simulation;
