//! Track geometry: the static section database and the traveller cursor

mod database;
mod section;
mod traveller;

pub use database::{
    EndNode, JunctionNode, Siding, SuperElevationProfile, TrackDb, TrackNode, TrackPin, VectorNode,
};
pub use section::{normalize_angle, Projection, SectionShape, VectorSection};
pub use traveller::{
    Traveller, TravellerDirection, TravellerError, TravellerState, JUNCTION_MATCH_EPSILON_M,
    MAX_CENTERLINE_OFFSET_M,
};
