//! Static track database
//!
//! Nodes are vector runs of sections, junctions or track ends, linked by
//! pins. The database is built once at load and is read-only afterwards,
//! except for junction route selection.

use anyhow::{Context, Result};
use log::{debug, warn};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::super::types::{WorldLocation, GRAVITY_MPSS, STANDARD_GAUGE_M};
use super::section::{SectionShape, VectorSection};

/// Connection from one node end to another node
///
/// `link_pin` is the pin index on the linked node: for vector nodes 0 is the
/// start and 1 the end; for junctions 0 is the trunk and `1 + n` is route `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPin {
    pub link: usize,
    pub link_pin: usize,
}

impl TrackPin {
    pub fn new(link: usize, link_pin: usize) -> Self {
        Self { link, link_pin }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorNode {
    pub sections: Vec<VectorSection>,
    /// Pin at the start of the first section
    pub start_pin: Option<TrackPin>,
    /// Pin at the end of the last section
    pub end_pin: Option<TrackPin>,
}

impl VectorNode {
    pub fn length_m(&self) -> f32 {
        self.sections.iter().map(VectorSection::length_m).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionNode {
    pub location: WorldLocation,
    pub trunk_pin: Option<TrackPin>,
    pub route_pins: Vec<TrackPin>,
    #[serde(default)]
    pub selected_route: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndNode {
    pub location: WorldLocation,
    pub pin: Option<TrackPin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackNode {
    Vector(VectorNode),
    Junction(JunctionNode),
    End(EndNode),
}

impl TrackNode {
    /// The pin with the given index, if present
    pub fn pin(&self, index: usize) -> Option<TrackPin> {
        match self {
            TrackNode::Vector(v) => match index {
                0 => v.start_pin,
                1 => v.end_pin,
                _ => None,
            },
            TrackNode::Junction(j) => match index {
                0 => j.trunk_pin,
                n => j.route_pins.get(n - 1).copied(),
            },
            TrackNode::End(e) => match index {
                0 => e.pin,
                _ => None,
            },
        }
    }

    fn pins(&self) -> Vec<TrackPin> {
        match self {
            TrackNode::Vector(v) => v.start_pin.into_iter().chain(v.end_pin).collect(),
            TrackNode::Junction(j) => j.trunk_pin.into_iter().chain(j.route_pins.iter().copied()).collect(),
            TrackNode::End(e) => e.pin.into_iter().collect(),
        }
    }

    pub fn as_vector(&self) -> Option<&VectorNode> {
        match self {
            TrackNode::Vector(v) => Some(v),
            _ => None,
        }
    }
}

/// A named stretch of track used by activity location checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Siding {
    pub id: u32,
    pub name: String,
    pub start: WorldLocation,
    pub end: WorldLocation,
}

/// Cant targets across a curved section, in metres of rail height difference
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SuperElevationProfile {
    pub start_m: f32,
    pub max_m: f32,
    pub end_m: f32,
}

impl SuperElevationProfile {
    /// Equilibrium cant for a curve at a design speed, capped at `max_m`
    pub fn for_curve(radius_m: f32, design_speed_mps: f32, max_m: f32) -> Self {
        let cant = if radius_m > 0.0 {
            (design_speed_mps * design_speed_mps * STANDARD_GAUGE_M / (GRAVITY_MPSS * radius_m))
                .min(max_m)
        } else {
            0.0
        };
        Self {
            start_m: 0.0,
            max_m: cant,
            end_m: 0.0,
        }
    }

    /// Value at a fraction `t` ∈ [0, 1] of the curve
    pub fn at(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        if t < 0.5 {
            self.start_m + (self.max_m - self.start_m) * (2.0 * t)
        } else {
            self.max_m + (self.end_m - self.max_m) * (2.0 * t - 1.0)
        }
    }
}

/// The static track graph
#[derive(Debug, Clone, Default)]
pub struct TrackDb {
    nodes: Vec<TrackNode>,
    sidings: HashMap<u32, Siding>,
    super_elevation: HashMap<(usize, usize), SuperElevationProfile>,
    connectivity: UnGraph<usize, ()>,
}

impl TrackDb {
    pub fn new(nodes: Vec<TrackNode>) -> Self {
        let mut connectivity = UnGraph::new_undirected();
        for index in 0..nodes.len() {
            connectivity.add_node(index);
        }
        for (index, node) in nodes.iter().enumerate() {
            for pin in node.pins() {
                // links are listed from both ends; update_edge keeps one edge per pair
                if pin.link < nodes.len() {
                    connectivity.update_edge(NodeIndex::new(index), NodeIndex::new(pin.link), ());
                }
            }
        }
        debug!(
            "Track database: {} nodes, {} links",
            nodes.len(),
            connectivity.edge_count()
        );
        Self {
            nodes,
            sidings: HashMap::new(),
            super_elevation: HashMap::new(),
            connectivity,
        }
    }

    /// Logs pins that do not link back to their origin
    ///
    /// Returns the number of problems found.
    pub fn validate(&self) -> usize {
        let mut problems = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            for pin in node.pins() {
                match self.nodes.get(pin.link) {
                    None => {
                        warn!("Track node {} links to missing node {}", index, pin.link);
                        problems += 1;
                    }
                    Some(linked) => match linked.pin(pin.link_pin) {
                        Some(back) if back.link == index => {}
                        _ => {
                            warn!(
                                "Track node {} pin to node {} is not linked back",
                                index, pin.link
                            );
                            problems += 1;
                        }
                    },
                }
            }
        }
        problems
    }

    pub fn add_siding(&mut self, siding: Siding) {
        self.sidings.insert(siding.id, siding);
    }

    pub fn siding(&self, id: u32) -> Option<&Siding> {
        self.sidings.get(&id)
    }

    pub fn set_super_elevation(
        &mut self,
        node: usize,
        section: usize,
        profile: SuperElevationProfile,
    ) {
        self.super_elevation.insert((node, section), profile);
    }

    /// Assigns a cant profile to every curved section for a design speed
    pub fn compute_super_elevation(&mut self, design_speed_mps: f32, max_m: f32) {
        let mut profiles = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if let TrackNode::Vector(vector) = node {
                for (section_index, section) in vector.sections.iter().enumerate() {
                    if let SectionShape::Curved { radius_m, .. } = section.shape {
                        profiles.push((
                            (index, section_index),
                            SuperElevationProfile::for_curve(radius_m, design_speed_mps, max_m),
                        ));
                    }
                }
            }
        }
        self.super_elevation.extend(profiles);
    }

    pub fn super_elevation(&self, node: usize, section: usize) -> Option<&SuperElevationProfile> {
        self.super_elevation.get(&(node, section))
    }

    pub fn node(&self, index: usize) -> Option<&TrackNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[TrackNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn vector_section(&self, node: usize, section: usize) -> Option<&VectorSection> {
        self.nodes.get(node)?.as_vector()?.sections.get(section)
    }

    /// Changes the route a junction sends facing movements onto
    pub fn set_junction_route(&mut self, node: usize, route: usize) -> Result<()> {
        match self.nodes.get_mut(node).context("Track node not found")? {
            TrackNode::Junction(junction) => {
                if route >= junction.route_pins.len() {
                    anyhow::bail!("Junction {} has no route {}", node, route);
                }
                junction.selected_route = route;
                Ok(())
            }
            _ => anyhow::bail!("Track node {} is not a junction", node),
        }
    }

    /// True when both nodes lie in the same connected part of the network
    pub fn are_connected(&self, a: usize, b: usize) -> bool {
        if a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        a == b
            || has_path_connecting(
                &self.connectivity,
                NodeIndex::new(a),
                NodeIndex::new(b),
                None,
            )
    }
}
