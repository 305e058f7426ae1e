//! Grayscale heightmap -> voxel terrain.
//!
//! `height_field` samples the image, `voxel` expands columns (sequentially
//! or on the compute pool), `instancing` merges, exports and batches the
//! result, and `terrain` wires it all into a Bevy app.

pub mod config;
pub mod error;
pub mod height_field;
pub mod instancing;
pub mod terrain;
pub mod voxel;

pub use config::{GenerationConfig, RenderPath, SamplingMode};
pub use error::{VoxelError, VoxelResult};
pub use height_field::{HeightField, HeightSource};
pub use terrain::VoxelTerrainPlugin;
