//! Road inputs, sampled edges and junction topology.

mod config;
mod cross_section;
mod road;
mod topology;

pub use config::NetworkConfig;
pub use cross_section::{sample_cross_sections, CrossSection};
pub use road::{EdgeError, EdgeId, RoadClass, RoadEdge, RoadInput};
pub use topology::{
    build_network, Incidence, Junction, JunctionId, JunctionRole, JunctionType, PrimaryRoad,
    UnifiedRoadNetwork,
};
