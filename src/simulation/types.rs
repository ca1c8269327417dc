//! Core types for the train simulation
//!
//! Identifiers, world coordinates and shared physical constants.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Stable identifier of a train, unique within one simulator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct TrainId(pub usize);

/// Stable identifier of a rolling-stock vehicle (the content "car ID")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct CarId(pub String);

impl CarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Size of a world tile in metres
pub const TILE_SIZE: f32 = 2048.0;

/// Standard gravity in m/s²
pub const GRAVITY_MPSS: f32 = 9.81;

/// Standard track gauge in metres
pub const STANDARD_GAUGE_M: f32 = 1.435;

/// Speeds below this are treated as standing still
pub const STANDSTILL_SPEED_MPS: f32 = 0.1;

/// A 3D vector in local tile coordinates (metres)
#[derive(Debug, Clone, Copy, PartialEq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A position in the world: a tile coordinate plus a local offset inside it
///
/// The local offset is kept within half a tile of the tile centre by
/// [`WorldLocation::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct WorldLocation {
    pub tile_x: i32,
    pub tile_z: i32,
    pub location: Vec3,
}

impl WorldLocation {
    pub fn new(tile_x: i32, tile_z: i32, x: f32, y: f32, z: f32) -> Self {
        Self {
            tile_x,
            tile_z,
            location: Vec3::new(x, y, z),
        }
        .normalize()
    }

    /// A location on tile (0, 0)
    pub fn local(x: f32, y: f32, z: f32) -> Self {
        Self::new(0, 0, x, y, z)
    }

    /// Moves whole tiles out of the local offset
    pub fn normalize(mut self) -> Self {
        let half = TILE_SIZE / 2.0;
        while self.location.x > half {
            self.location.x -= TILE_SIZE;
            self.tile_x += 1;
        }
        while self.location.x < -half {
            self.location.x += TILE_SIZE;
            self.tile_x -= 1;
        }
        while self.location.z > half {
            self.location.z -= TILE_SIZE;
            self.tile_z += 1;
        }
        while self.location.z < -half {
            self.location.z += TILE_SIZE;
            self.tile_z -= 1;
        }
        self
    }

    /// Vector from `other` to `self`, in metres
    pub fn delta_from(&self, other: &WorldLocation) -> Vec3 {
        Vec3 {
            x: self.location.x - other.location.x + TILE_SIZE * (self.tile_x - other.tile_x) as f32,
            y: self.location.y - other.location.y,
            z: self.location.z - other.location.z + TILE_SIZE * (self.tile_z - other.tile_z) as f32,
        }
    }

    pub fn distance(&self, other: &WorldLocation) -> f32 {
        self.delta_from(other).length()
    }

    /// Horizontal (x/z plane) distance
    pub fn distance_2d(&self, other: &WorldLocation) -> f32 {
        let d = self.delta_from(other);
        (d.x * d.x + d.z * d.z).sqrt()
    }

    /// Returns this location shifted by a local offset
    pub fn offset(&self, dx: f32, dy: f32, dz: f32) -> Self {
        Self {
            tile_x: self.tile_x,
            tile_z: self.tile_z,
            location: Vec3::new(
                self.location.x + dx,
                self.location.y + dy,
                self.location.z + dz,
            ),
        }
        .normalize()
    }

    /// True when both locations are within `epsilon` metres of each other
    pub fn approx_eq(&self, other: &WorldLocation, epsilon: f32) -> bool {
        self.distance(other) <= epsilon
    }
}
