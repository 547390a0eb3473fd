//! Road elevation passes.
//!
//! Profiles start as terrain samples and are refined in order: grade-limited smoothing,
//! junction harmonization, banking, junction surface constraints and finally the
//! independent bridge/tunnel profiles.

mod banking;
mod config;
mod falloff;
mod harmonize;
mod junction_surface;
mod smoothing;
mod structure;

pub use banking::{apply_banking, bank_edge};
pub use config::{ElevationConfig, StructureConfig};
pub use falloff::BlendFalloff;
pub use harmonize::harmonize_junctions;
pub use junction_surface::apply_junction_surfaces;
pub use smoothing::{grade_violations, smooth_edge};
pub use structure::{
    apply_structures, plan_bridge, plan_tunnel, resolve_endpoint, structure_profile,
    EndpointSource, StructureCurve, StructureElevationProfile, StructureKind,
};
