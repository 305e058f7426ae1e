// src/voxel/buffer.rs
//! Deferred commit buffer for workers, and the finished instance buffer.

use bevy::prelude::*;
use bevy::utils::Parallel;

use super::column::VoxelInstance;

/// Append-only buffer shared by workers. Each thread writes its own local
/// `Vec`; locals are stitched together only when the buffer is consumed,
/// which needs ownership and therefore happens after every worker is done.
pub struct CommitBuffer<T: Send> {
    locals: Parallel<Vec<T>>,
}

impl<T: Send> Default for CommitBuffer<T> {
    fn default() -> Self {
        Self { locals: Parallel::default() }
    }
}

impl<T: Send> CommitBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this thread's local vec. Items pushed inside one call stay contiguous.
    pub fn with_local<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        self.locals.scope(f)
    }

    /// Barrier side: merge all thread locals. Order across threads is unspecified.
    pub fn into_vec(mut self) -> Vec<T> {
        let mut out = Vec::new();
        self.locals.drain_into(&mut out);
        out
    }
}

/// Transforms handed to the renderer. Replaced wholesale on regeneration.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct InstanceBuffer {
    transforms: Vec<Transform>,
}

impl InstanceBuffer {
    pub fn from_instances(instances: impl IntoIterator<Item = VoxelInstance>) -> Self {
        Self { transforms: instances.into_iter().map(Transform::from).collect() }
    }

    pub fn from_transforms(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    #[inline]
    pub fn len(&self) -> usize { self.transforms.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.transforms.is_empty() }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.transforms.iter()
    }

    pub fn into_transforms(self) -> Vec<Transform> {
        self.transforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::tasks::{ComputeTaskPool, TaskPool};

    #[test]
    fn workers_commit_without_losing_items() {
        let pool = ComputeTaskPool::get_or_init(TaskPool::default);
        let buffer = CommitBuffer::<u32>::new();
        pool.scope(|s| {
            for w in 0..8u32 {
                let buffer = &buffer;
                s.spawn(async move {
                    buffer.with_local(|out| out.extend((0..100).map(|i| w * 1000 + i)));
                });
            }
        });
        let mut all = buffer.into_vec();
        all.sort_unstable();
        let expected: Vec<u32> = (0..8).flat_map(|w| (0..100).map(move |i| w * 1000 + i)).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn runs_stay_contiguous_on_one_thread() {
        let buffer = CommitBuffer::<u32>::new();
        buffer.with_local(|out| out.extend([1, 2, 3]));
        buffer.with_local(|out| out.push(4));
        assert_eq!(buffer.into_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn instance_buffer_keeps_position_and_scale() {
        let buf = InstanceBuffer::from_instances([VoxelInstance {
            position: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::splat(0.5),
        }]);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.transforms()[0].translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(buf.transforms()[0].scale, Vec3::splat(0.5));
    }
}
