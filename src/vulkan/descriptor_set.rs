use std::sync::Arc;

use ash::vk;

use crate::error::VulkanError;

use super::acceleration_structure::AccelerationStructure;
use super::buffer::Buffer;
use super::device::GpuDevice;
use super::image::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn to_vk(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
            .build()
    }
}

pub struct DescriptorSetLayout {
    pub inner: vk::DescriptorSetLayout,
    pub bindings: Vec<DescriptorBinding>,
    device: Arc<dyn GpuDevice>,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        bindings: Vec<DescriptorBinding>,
    ) -> Result<Self, VulkanError> {
        let inner = device.create_descriptor_set_layout(&bindings)?;
        Ok(Self {
            inner,
            bindings,
            device,
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.inner);
    }
}

pub struct DescriptorPool {
    pub inner: vk::DescriptorPool,
    device: Arc<dyn GpuDevice>,
}

impl DescriptorPool {
    /// A pool with room for exactly `max_sets` sets of `layout`.
    pub fn for_layout(
        device: Arc<dyn GpuDevice>,
        layout: &DescriptorSetLayout,
        max_sets: u32,
    ) -> Result<Self, VulkanError> {
        let inner = device.create_descriptor_pool(&layout.bindings, max_sets)?;
        Ok(Self { inner, device })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.inner);
    }
}

/// Freed together with its pool.
pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
    pub layout: Arc<DescriptorSetLayout>,
    _pool: Arc<DescriptorPool>,
}

impl DescriptorSet {
    /// Allocates a set and writes every binding of `layout`.
    /// A binding without a write, or with the wrong descriptor count, fails before the device is touched.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        pool: Arc<DescriptorPool>,
        layout: Arc<DescriptorSetLayout>,
        write_descriptor_sets: Vec<WriteDescriptorSet>,
    ) -> Result<Self, VulkanError> {
        for binding in &layout.bindings {
            let write = write_descriptor_sets
                .iter()
                .find(|write| write.binding == binding.binding)
                .ok_or(VulkanError::MissingDescriptorWrite {
                    binding: binding.binding,
                })?;

            if write.info.descriptor_count() != binding.count
                || write.info.descriptor_type() != binding.descriptor_type
            {
                return Err(VulkanError::DescriptorCountMismatch {
                    binding: binding.binding,
                    expected: binding.count,
                    expected_type: binding.descriptor_type,
                    actual: write.info.descriptor_count(),
                    actual_type: write.info.descriptor_type(),
                });
            }
        }

        let inner = device.allocate_descriptor_set(pool.inner, layout.inner)?;
        device.update_descriptor_set(inner, &write_descriptor_sets);

        Ok(Self {
            inner,
            layout,
            _pool: pool,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteDescriptorSet {
    pub binding: u32,
    pub info: DescriptorInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorInfo {
    UniformBuffer(vk::Buffer),
    StorageBuffer(vk::Buffer),
    CombinedImageSamplers(Vec<(vk::ImageView, vk::Sampler)>),
    AccelerationStructures(Vec<vk::AccelerationStructureKHR>),
}

impl DescriptorInfo {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorInfo::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorInfo::StorageBuffer(_) => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorInfo::CombinedImageSamplers(_) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorInfo::AccelerationStructures(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }

    pub fn descriptor_count(&self) -> u32 {
        match self {
            DescriptorInfo::UniformBuffer(_) | DescriptorInfo::StorageBuffer(_) => 1,
            DescriptorInfo::CombinedImageSamplers(images) => images.len() as u32,
            DescriptorInfo::AccelerationStructures(structures) => structures.len() as u32,
        }
    }
}

impl WriteDescriptorSet {
    pub fn uniform_buffer<T>(binding: u32, buffer: &Buffer<T>) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::UniformBuffer(buffer.get_vk_buffer()),
        }
    }

    pub fn storage_buffer<T>(binding: u32, buffer: &Buffer<T>) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageBuffer(buffer.get_vk_buffer()),
        }
    }

    pub fn textures(binding: u32, textures: &[Texture]) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::CombinedImageSamplers(
                textures
                    .iter()
                    .map(|texture| (texture.image_view.inner, texture.sampler.inner))
                    .collect(),
            ),
        }
    }

    pub fn acceleration_structure(
        binding: u32,
        acceleration_structure: &AccelerationStructure,
    ) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::AccelerationStructures(vec![acceleration_structure.inner]),
        }
    }
}
