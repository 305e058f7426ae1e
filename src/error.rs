// src/error.rs
//! Error taxonomy shared by sampling, merging, exporting and the render registry.

/// Failures reported by the voxel pipeline. None of these are fatal; every
/// operation that returns one leaves the caller's state as it was.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VoxelError {
    /// Malformed or missing source image / geometry / parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A merge asked for more (or zero) instances than the live set can give.
    #[error("cannot merge {requested} instance(s) out of {available} live")]
    InsufficientInstances { requested: usize, available: usize },
    /// Operation requested on an empty working set.
    #[error("operation requested on an empty instance set")]
    EmptyInput,
    /// Nothing renderable to combine (no mesh, or no usable material).
    #[error("no geometry available to combine")]
    NoGeometry,
    /// The instanced-render backend refused the buffer.
    #[error("render backend registration failed: {0}")]
    RegistrationFailure(String),
}

pub type VoxelResult<T> = Result<T, VoxelError>;
