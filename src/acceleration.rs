mod blas;
mod instance;
mod tlas;

pub use blas::*;
pub use instance::*;

use std::sync::Arc;

use ash::vk;

use crate::config_loader::{AccelerationConfig, MissingBufferPolicy};
use crate::error::AccelerationError;
use crate::scene::LoadedScene;
use crate::scene_uploader::SceneBuffers;
use crate::vulkan::acceleration_structure::AccelerationStructure;
use crate::vulkan::device::GpuDevice;

/// Owns every bottom level structure of a scene and its single top level structure.
pub struct AccelerationBuilder {
    device: Arc<dyn GpuDevice>,
    batch_size_limit: u64,
    /// In input order, TLAS instances point into this by index
    blas: Vec<AccelerationStructure>,
    tlas: Option<AccelerationStructure>,
    /// Updates must keep the instance count of the first build
    tlas_instance_count: usize,
}

impl AccelerationBuilder {
    pub fn new(device: Arc<dyn GpuDevice>, config: &AccelerationConfig) -> Self {
        Self {
            device,
            batch_size_limit: config.batch_size_limit,
            blas: Vec::new(),
            tlas: None,
            tlas_instance_count: 0,
        }
    }

    pub fn blas_count(&self) -> usize {
        self.blas.len()
    }

    pub fn blas(&self, index: usize) -> Result<&AccelerationStructure, AccelerationError> {
        self.blas
            .get(index)
            .ok_or(AccelerationError::BlasIndexOutOfRange {
                index,
                len: self.blas.len(),
            })
    }

    pub fn blas_device_address(&self, index: usize) -> Result<vk::DeviceAddress, AccelerationError> {
        Ok(self.blas(index)?.device_address)
    }

    pub fn tlas(&self) -> Option<&AccelerationStructure> {
        self.tlas.as_ref()
    }

    pub fn tlas_device_address(&self) -> Result<vk::DeviceAddress, AccelerationError> {
        self.tlas
            .as_ref()
            .map(|tlas| tlas.device_address)
            .ok_or(AccelerationError::TlasNotBuilt)
    }
}

pub fn blas_build_flags(config: &AccelerationConfig) -> vk::BuildAccelerationStructureFlagsKHR {
    let mut flags = if config.prefer_fast_trace {
        vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE
    } else {
        vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD
    };
    if config.compact_blas {
        flags |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION;
    }
    flags
}

pub fn tlas_build_flags(config: &AccelerationConfig) -> vk::BuildAccelerationStructureFlagsKHR {
    let mut flags = vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
    if config.allow_tlas_update {
        flags |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
    }
    flags
}

/// BLAS inputs for every primitive mesh of a scene.
///
/// The second list maps each primitive mesh to its BLAS index. With [`MissingBufferPolicy::Skip`]
/// primitives without device buffers map to `None`, otherwise they fail the whole scene.
pub fn scene_blas_inputs(
    scene: &LoadedScene,
    buffers: &SceneBuffers,
    policy: MissingBufferPolicy,
) -> Result<(Vec<BlasInput>, Vec<Option<usize>>), AccelerationError> {
    let mut inputs = Vec::with_capacity(scene.primitive_meshes.len());
    let mut primitive_to_blas = Vec::with_capacity(scene.primitive_meshes.len());

    for (index, primitive) in scene.primitive_meshes.iter().enumerate() {
        match (buffers.primitive(index), policy) {
            (Some(primitive_buffers), _) => {
                primitive_to_blas.push(Some(inputs.len()));
                inputs.push(BlasInput::from_primitive(primitive, primitive_buffers)?);
            }
            (None, MissingBufferPolicy::Skip) => {
                log::warn!(
                    "Primitive mesh {} has no device buffers, leaving it out of the acceleration structures",
                    index
                );
                primitive_to_blas.push(None);
            }
            (None, MissingBufferPolicy::Abort) => {
                log::error!("Primitive mesh {} has no device buffers", index);
                return Err(AccelerationError::MissingPrimitiveBuffers { primitive: index });
            }
        }
    }
    Ok((inputs, primitive_to_blas))
}
