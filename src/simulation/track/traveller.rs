//! Positioned, directional cursor over the track graph
//!
//! A [`Traveller`] stores its position as (track node, section, offset) and
//! computes its world location and heading lazily. Travellers are cheap to
//! copy; callers that need to persist a position keep a [`TravellerState`]
//! and rebuild the traveller against the track database.

use bitcode::{Decode, Encode};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::f32::consts::PI;
use thiserror::Error;

use super::super::types::WorldLocation;
use super::database::{TrackDb, TrackNode, TrackPin};
use super::section::VectorSection;

/// Maximum lateral distance from the centre line for a location to count as on track
pub const MAX_CENTERLINE_OFFSET_M: f32 = 2.5;

/// Tolerance for matching a location against a junction or end node
pub const JUNCTION_MATCH_EPSILON_M: f32 = 0.1;

/// Moves shorter than this are treated as complete
const MOVE_EPSILON_M: f32 = 1e-4;

/// Along-track slack when matching a location to a section's extent
const SECTION_END_TOLERANCE_M: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TravellerError {
    #[error("location {0:?} is not on any track section")]
    NotOnTrack(WorldLocation),
    #[error("track node {0} does not exist")]
    InvalidTrackNode(usize),
    #[error("track node {node} has no section {section}")]
    InvalidSection { node: usize, section: usize },
}

/// Direction of travel relative to the track node's own direction
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode, Serialize, Deserialize,
)]
pub enum TravellerDirection {
    #[default]
    Forward,
    Backward,
}

impl TravellerDirection {
    pub fn reversed(self) -> Self {
        match self {
            TravellerDirection::Forward => TravellerDirection::Backward,
            TravellerDirection::Backward => TravellerDirection::Forward,
        }
    }

    fn sign(self) -> f32 {
        match self {
            TravellerDirection::Forward => 1.0,
            TravellerDirection::Backward => -1.0,
        }
    }
}

/// Persistable form of a traveller
#[derive(Debug, Clone, Copy, PartialEq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct TravellerState {
    pub track_node_index: usize,
    pub section_index: usize,
    /// Offset in the section's natural units, measured in track direction
    pub offset: f32,
    pub direction: TravellerDirection,
    /// Heading in the node's forward sense, kept while standing on a junction
    pub carried_heading_rad: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pose {
    location: WorldLocation,
    heading_rad: f32,
}

#[derive(Debug, Clone)]
pub struct Traveller<'a> {
    track: &'a TrackDb,
    node: usize,
    section: usize,
    offset: f32,
    direction: TravellerDirection,
    carried_heading_rad: f32,
    pose: Cell<Option<Pose>>,
}

impl<'a> Traveller<'a> {
    /// Places a traveller on the section nearest to `location`
    ///
    /// The traveller faces the forward direction of the chosen node.
    pub fn from_location(
        track: &'a TrackDb,
        location: &WorldLocation,
    ) -> Result<Self, TravellerError> {
        let best = track
            .nodes()
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.as_vector().map(|v| (index, v)))
            .flat_map(|(index, vector)| {
                vector
                    .sections
                    .iter()
                    .enumerate()
                    .filter_map(move |(section_index, section)| {
                        section
                            .project(location, SECTION_END_TOLERANCE_M)
                            .map(|projection| (index, section_index, projection))
                    })
            })
            .filter(|(_, _, projection)| projection.lateral_m <= MAX_CENTERLINE_OFFSET_M)
            .min_by_key(|(_, _, projection)| OrderedFloat(projection.lateral_m));

        match best {
            Some((node, section, projection)) => Ok(Self {
                track,
                node,
                section,
                offset: projection.offset,
                direction: TravellerDirection::Forward,
                carried_heading_rad: 0.0,
                pose: Cell::new(None),
            }),
            None => Err(TravellerError::NotOnTrack(*location)),
        }
    }

    /// Places a traveller `offset_m` metres from the start of a vector node
    pub fn from_node_offset(
        track: &'a TrackDb,
        node: usize,
        offset_m: f32,
        direction: TravellerDirection,
    ) -> Result<Self, TravellerError> {
        let vector = track
            .node(node)
            .and_then(TrackNode::as_vector)
            .ok_or(TravellerError::InvalidTrackNode(node))?;
        if vector.sections.is_empty() {
            return Err(TravellerError::InvalidSection { node, section: 0 });
        }

        let mut remaining = offset_m.max(0.0);
        let last = vector.sections.len() - 1;
        let mut section = 0;
        let mut offset = 0.0;
        for (index, s) in vector.sections.iter().enumerate() {
            let length = s.length_m();
            if remaining <= length || index == last {
                section = index;
                offset = remaining.min(length) / s.scale();
                break;
            }
            remaining -= length;
        }

        Ok(Self {
            track,
            node,
            section,
            offset,
            direction,
            carried_heading_rad: 0.0,
            pose: Cell::new(None),
        })
    }

    /// Rebuilds a traveller from a saved state
    pub fn from_state(track: &'a TrackDb, state: &TravellerState) -> Result<Self, TravellerError> {
        let node = track
            .node(state.track_node_index)
            .ok_or(TravellerError::InvalidTrackNode(state.track_node_index))?;
        let offset = match node {
            TrackNode::Vector(vector) => {
                let section = vector.sections.get(state.section_index).ok_or(
                    TravellerError::InvalidSection {
                        node: state.track_node_index,
                        section: state.section_index,
                    },
                )?;
                state.offset.clamp(0.0, section.extent())
            }
            _ => 0.0,
        };
        Ok(Self {
            track,
            node: state.track_node_index,
            section: state.section_index,
            offset,
            direction: state.direction,
            carried_heading_rad: state.carried_heading_rad,
            pose: Cell::new(None),
        })
    }

    pub fn state(&self) -> TravellerState {
        TravellerState {
            track_node_index: self.node,
            section_index: self.section,
            offset: self.offset,
            direction: self.direction,
            carried_heading_rad: self.carried_heading_rad,
        }
    }

    /// A copy facing the other way
    pub fn reversed(&self) -> Self {
        let mut copy = self.clone();
        copy.reverse_direction();
        copy
    }

    pub fn track(&self) -> &'a TrackDb {
        self.track
    }

    pub fn track_node_index(&self) -> usize {
        self.node
    }

    pub fn section_index(&self) -> usize {
        self.section
    }

    /// Offset in natural units (metres or radians) in track direction
    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn direction(&self) -> TravellerDirection {
        self.direction
    }

    fn track_node(&self) -> &'a TrackNode {
        // indices are validated on construction and only follow existing pins
        &self.track.nodes()[self.node]
    }

    fn vector_section(&self) -> Option<&'a VectorSection> {
        self.track.vector_section(self.node, self.section)
    }

    pub fn is_junction(&self) -> bool {
        matches!(self.track_node(), TrackNode::Junction(_))
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self.track_node(), TrackNode::End(_))
    }

    pub fn is_curved(&self) -> bool {
        self.vector_section().is_some_and(VectorSection::is_curved)
    }

    /// Length of the current section in metres (0 on junctions and ends)
    pub fn section_length_m(&self) -> f32 {
        self.vector_section().map_or(0.0, VectorSection::length_m)
    }

    /// Metres from the start of the current node, in track direction
    pub fn track_node_offset_m(&self) -> f32 {
        match self.track_node() {
            TrackNode::Vector(vector) => {
                let before: f32 = vector.sections[..self.section]
                    .iter()
                    .map(VectorSection::length_m)
                    .sum();
                before + self.vector_section().map_or(0.0, |s| self.offset * s.scale())
            }
            _ => 0.0,
        }
    }

    /// Metres left in the current section in the direction of travel
    pub fn distance_to_section_end_m(&self) -> f32 {
        match self.vector_section() {
            Some(section) => match self.direction {
                TravellerDirection::Forward => (section.extent() - self.offset) * section.scale(),
                TravellerDirection::Backward => self.offset * section.scale(),
            },
            None => 0.0,
        }
    }

    fn invalidate(&mut self) {
        self.pose.set(None);
    }

    fn pose(&self) -> Pose {
        if let Some(pose) = self.pose.get() {
            return pose;
        }
        let pose = match self.track_node() {
            TrackNode::Vector(vector) => {
                let section = &vector.sections[self.section];
                let (location, heading) = section.location_at(self.offset);
                Pose {
                    location,
                    heading_rad: match self.direction {
                        TravellerDirection::Forward => heading,
                        TravellerDirection::Backward => heading + PI,
                    },
                }
            }
            TrackNode::Junction(junction) => Pose {
                location: junction.location,
                heading_rad: self.carried_heading(),
            },
            TrackNode::End(end) => Pose {
                location: end.location,
                heading_rad: self.carried_heading(),
            },
        };
        self.pose.set(Some(pose));
        pose
    }

    fn carried_heading(&self) -> f32 {
        match self.direction {
            TravellerDirection::Forward => self.carried_heading_rad,
            TravellerDirection::Backward => self.carried_heading_rad + PI,
        }
    }

    pub fn location(&self) -> WorldLocation {
        self.pose().location
    }

    /// Heading in the direction of travel, radians about Y
    pub fn heading_rad(&self) -> f32 {
        self.pose().heading_rad
    }

    /// Flips the direction of travel without moving
    pub fn reverse_direction(&mut self) {
        self.direction = self.direction.reversed();
        self.invalidate();
    }

    /// Moves within the current section only
    ///
    /// `distance_m` must be non-negative. Returns the distance that did not
    /// fit in the section.
    pub fn move_in_section(&mut self, distance_m: f32) -> f32 {
        let Some(section) = self.vector_section() else {
            return distance_m;
        };
        let scale = section.scale();
        let extent = section.extent();
        let delta = distance_m / scale;
        let room = match self.direction {
            TravellerDirection::Forward => extent - self.offset,
            TravellerDirection::Backward => self.offset,
        };
        self.invalidate();
        if delta <= room {
            self.offset += self.direction.sign() * delta;
            self.offset = self.offset.clamp(0.0, extent);
            0.0
        } else {
            self.offset = match self.direction {
                TravellerDirection::Forward => extent,
                TravellerDirection::Backward => 0.0,
            };
            (delta - room) * scale
        }
    }

    /// Moves by a signed distance, following pins across nodes
    ///
    /// A negative distance moves backwards without changing the traveller's
    /// direction. Returns the signed distance left over when the track ends.
    pub fn move_by(&mut self, distance_m: f32) -> f32 {
        if distance_m.is_nan() {
            return 0.0;
        }
        let sign = if distance_m < 0.0 { -1.0 } else { 1.0 };
        let mut to_go = distance_m.abs();
        if sign < 0.0 {
            self.reverse_direction();
        }
        loop {
            to_go = self.move_in_section(to_go);
            if to_go < MOVE_EPSILON_M {
                to_go = 0.0;
                break;
            }
            if !self.next_section() {
                break;
            }
        }
        if sign < 0.0 {
            self.reverse_direction();
        }
        sign * to_go
    }

    /// Steps to the next vector section inside the current node
    pub fn next_vector_section(&mut self) -> bool {
        let TrackNode::Vector(vector) = self.track_node() else {
            return false;
        };
        match self.direction {
            TravellerDirection::Forward if self.section + 1 < vector.sections.len() => {
                self.section += 1;
                self.offset = 0.0;
            }
            TravellerDirection::Backward if self.section > 0 => {
                self.section -= 1;
                self.offset = vector.sections[self.section].extent();
            }
            _ => return false,
        }
        self.invalidate();
        true
    }

    /// The pin the traveller leaves its current node through
    fn exit_pin(&self) -> Option<TrackPin> {
        match (self.track_node(), self.direction) {
            (TrackNode::Vector(v), TravellerDirection::Forward) => v.end_pin,
            (TrackNode::Vector(v), TravellerDirection::Backward) => v.start_pin,
            (TrackNode::Junction(j), TravellerDirection::Forward) => {
                j.route_pins.get(j.selected_route).copied()
            }
            (TrackNode::Junction(j), TravellerDirection::Backward) => j.trunk_pin,
            (TrackNode::End(_), TravellerDirection::Forward) => None,
            (TrackNode::End(e), TravellerDirection::Backward) => e.pin,
        }
    }

    /// Moves onto the next track node through the exit pin
    ///
    /// Returns false at a dead end or when the pin links nowhere valid.
    pub fn next_track_node(&mut self) -> bool {
        let Some(pin) = self.exit_pin() else {
            return false;
        };
        let Some(next) = self.track.node(pin.link) else {
            return false;
        };
        let travel_heading = self.heading_rad();

        match next {
            TrackNode::Vector(vector) => {
                if vector.sections.is_empty() {
                    return false;
                }
                if pin.link_pin == 0 {
                    self.direction = TravellerDirection::Forward;
                    self.section = 0;
                    self.offset = 0.0;
                } else {
                    self.direction = TravellerDirection::Backward;
                    self.section = vector.sections.len() - 1;
                    self.offset = vector.sections[self.section].extent();
                }
            }
            TrackNode::Junction(_) | TrackNode::End(_) => {
                self.direction = if pin.link_pin == 0 {
                    TravellerDirection::Forward
                } else {
                    TravellerDirection::Backward
                };
                self.section = 0;
                self.offset = 0.0;
                self.carried_heading_rad = match self.direction {
                    TravellerDirection::Forward => travel_heading,
                    TravellerDirection::Backward => travel_heading - PI,
                };
            }
        }
        self.node = pin.link;
        self.invalidate();
        true
    }

    /// Advances to the next section, crossing into the next node if needed
    pub fn next_section(&mut self) -> bool {
        self.next_vector_section() || self.next_track_node()
    }

    /// Track distance ahead to `target`, searching at most `max_distance_m`
    ///
    /// Locations behind the traveller on its current section are ignored.
    /// Returns `None` when the target is not reached within the bound.
    pub fn distance_to(&self, target: &WorldLocation, max_distance_m: f32) -> Option<f32> {
        let mut traveller = self.clone();
        let mut accumulated = 0.0;
        while accumulated <= max_distance_m {
            match traveller.track_node() {
                TrackNode::Vector(vector) => {
                    let section = &vector.sections[traveller.section];
                    let scale = section.scale();
                    if let Some(projection) = section.project(target, SECTION_END_TOLERANCE_M) {
                        if projection.lateral_m <= MAX_CENTERLINE_OFFSET_M {
                            let ahead = match traveller.direction {
                                TravellerDirection::Forward => projection.offset - traveller.offset,
                                TravellerDirection::Backward => traveller.offset - projection.offset,
                            };
                            if ahead >= 0.0 {
                                let total = accumulated + ahead * scale;
                                return (total <= max_distance_m).then_some(total);
                            }
                        }
                    }
                    accumulated += traveller.distance_to_section_end_m();
                }
                TrackNode::Junction(junction) => {
                    if junction.location.approx_eq(target, JUNCTION_MATCH_EPSILON_M) {
                        return Some(accumulated);
                    }
                }
                TrackNode::End(end) => {
                    if end.location.approx_eq(target, JUNCTION_MATCH_EPSILON_M) {
                        return Some(accumulated);
                    }
                }
            }
            if !traveller.next_section() {
                break;
            }
        }
        None
    }

    /// Cant at the current position; zero off curves
    pub fn super_elevation_m(&self) -> f32 {
        let Some(section) = self.vector_section() else {
            return 0.0;
        };
        if !section.is_curved() {
            return 0.0;
        }
        match self.track.super_elevation(self.node, self.section) {
            Some(profile) => profile.at(self.offset / section.extent()),
            None => 0.0,
        }
    }

    /// Signed separation from `other` along this traveller's heading
    ///
    /// Negative values mean the two positions overlap. Returns 1.0 when the
    /// travellers are too far apart to be touching.
    pub fn overlap_distance_m(&self, other: &Traveller<'_>, rear: bool) -> f32 {
        let d = self.location().delta_from(&other.location());
        if d.x * d.x + d.z * d.z > 10.0 * 10.0 || d.y.abs() > 1.0 {
            return 1.0;
        }
        let (sin, cos) = self.heading_rad().sin_cos();
        let dot = d.x * sin + d.z * cos;
        if rear {
            dot
        } else {
            -dot
        }
    }
}
