//! Geometry of a single track vector section
//!
//! Headings are angles about the Y axis: a heading `h` points along
//! `(sin h, cos h)` in the x/z plane. Offsets are in the section's natural
//! unit, metres for straight sections and radians for curves.

use serde::{Deserialize, Serialize};

use super::super::types::WorldLocation;

/// Shape of a track section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SectionShape {
    Straight {
        length_m: f32,
    },
    /// Positive `angle_rad` curves to the right (heading increases)
    Curved {
        radius_m: f32,
        angle_rad: f32,
    },
}

/// Result of projecting a world point onto a section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Offset of the foot point, natural units, clamped to the section
    pub offset: f32,
    /// Horizontal distance from the centre line
    pub lateral_m: f32,
}

/// One straight or curved piece of a vector node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSection {
    pub shape: SectionShape,
    /// Location of the section start
    pub start: WorldLocation,
    /// Heading at the section start, in the node's forward direction
    pub heading_rad: f32,
    /// Grade angle; positive climbs in the forward direction
    #[serde(default)]
    pub pitch_rad: f32,
}

impl VectorSection {
    pub fn straight(start: WorldLocation, heading_rad: f32, length_m: f32) -> Self {
        Self {
            shape: SectionShape::Straight { length_m },
            start,
            heading_rad,
            pitch_rad: 0.0,
        }
    }

    pub fn curved(start: WorldLocation, heading_rad: f32, radius_m: f32, angle_rad: f32) -> Self {
        Self {
            shape: SectionShape::Curved {
                radius_m,
                angle_rad,
            },
            start,
            heading_rad,
            pitch_rad: 0.0,
        }
    }

    pub fn is_curved(&self) -> bool {
        matches!(self.shape, SectionShape::Curved { .. })
    }

    /// Length along the centre line in metres
    pub fn length_m(&self) -> f32 {
        match self.shape {
            SectionShape::Straight { length_m } => length_m,
            SectionShape::Curved {
                radius_m,
                angle_rad,
            } => radius_m * angle_rad.abs(),
        }
    }

    /// Extent in natural units (metres or radians)
    pub fn extent(&self) -> f32 {
        match self.shape {
            SectionShape::Straight { length_m } => length_m,
            SectionShape::Curved { angle_rad, .. } => angle_rad.abs(),
        }
    }

    /// Metres per natural unit
    pub fn scale(&self) -> f32 {
        match self.shape {
            SectionShape::Straight { .. } => 1.0,
            SectionShape::Curved { radius_m, .. } => radius_m,
        }
    }

    /// Centre of a curved section's arc, with the turn sign
    fn arc_centre(&self, radius_m: f32, angle_rad: f32) -> (WorldLocation, f32) {
        let sign = if angle_rad < 0.0 { -1.0 } else { 1.0 };
        let (sin, cos) = self.heading_rad.sin_cos();
        let centre = self
            .start
            .offset(sign * radius_m * cos, 0.0, -sign * radius_m * sin);
        (centre, sign)
    }

    /// Location and forward heading at a natural offset
    pub fn location_at(&self, offset: f32) -> (WorldLocation, f32) {
        let offset = offset.clamp(0.0, self.extent());
        let rise = offset * self.scale() * self.pitch_rad.sin();
        match self.shape {
            SectionShape::Straight { .. } => {
                let (sin, cos) = self.heading_rad.sin_cos();
                (
                    self.start.offset(offset * sin, rise, offset * cos),
                    self.heading_rad,
                )
            }
            SectionShape::Curved {
                radius_m,
                angle_rad,
            } => {
                let (centre, sign) = self.arc_centre(radius_m, angle_rad);
                let heading = self.heading_rad + sign * offset;
                let (sin, cos) = heading.sin_cos();
                let mut location =
                    centre.offset(-sign * radius_m * cos, 0.0, sign * radius_m * sin);
                location.location.y = self.start.location.y + rise;
                (location, heading)
            }
        }
    }

    /// Location at the far end of the section
    pub fn end_location(&self) -> (WorldLocation, f32) {
        self.location_at(self.extent())
    }

    /// Projects `target` onto the section
    ///
    /// Returns `None` when the foot point lies outside the section by more
    /// than `tolerance_m` along the track.
    pub fn project(&self, target: &WorldLocation, tolerance_m: f32) -> Option<Projection> {
        match self.shape {
            SectionShape::Straight { length_m } => {
                let d = target.delta_from(&self.start);
                let (sin, cos) = self.heading_rad.sin_cos();
                let along = d.x * sin + d.z * cos;
                if along < -tolerance_m || along > length_m + tolerance_m {
                    return None;
                }
                let lateral = (d.x * cos - d.z * sin).abs();
                Some(Projection {
                    offset: along.clamp(0.0, length_m),
                    lateral_m: lateral,
                })
            }
            SectionShape::Curved {
                radius_m,
                angle_rad,
            } => {
                let (centre, sign) = self.arc_centre(radius_m, angle_rad);
                let v = target.delta_from(&centre);
                let r = (v.x * v.x + v.z * v.z).sqrt();
                if r < f32::EPSILON {
                    return None;
                }
                // heading h at which the arc passes through the target's radial
                let heading = (sign * v.z / r).atan2(-sign * v.x / r);
                let mut offset = sign * (heading - self.heading_rad);
                offset = normalize_angle(offset);
                let extent = angle_rad.abs();
                let angular_tolerance = tolerance_m / radius_m;
                if offset < -angular_tolerance || offset > extent + angular_tolerance {
                    return None;
                }
                Some(Projection {
                    offset: offset.clamp(0.0, extent),
                    lateral_m: (r - radius_m).abs(),
                })
            }
        }
    }
}

/// Wraps an angle into [-π, π)
pub fn normalize_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut a = (angle + std::f32::consts::PI) % two_pi;
    if a < 0.0 {
        a += two_pi;
    }
    a - std::f32::consts::PI
}
