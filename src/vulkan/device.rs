use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::VulkanError;

use super::acceleration_structure::AccelerationGeometry;
use super::command_buffer::Cmd;
use super::descriptor_set::{DescriptorBinding, WriteDescriptorSet};
use super::image::SamplerInfo;

pub struct BufferCreateInfo<'a> {
    pub name: &'a str,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

pub struct ImageCreateInfo<'a> {
    pub name: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

/// Everything the scene core needs from the GPU.
///
/// Components receive this as an `Arc<dyn GpuDevice>` instead of reaching for global entry points,
/// so a recording implementation can stand in for a real device.
pub trait GpuDevice: Send + Sync {
    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer, VulkanError>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Copies `data` into a host visible buffer.
    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<(), VulkanError>;
    fn get_buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress;

    fn get_acceleration_structure_build_sizes(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        flags: vk::BuildAccelerationStructureFlagsKHR,
        geometry: &AccelerationGeometry,
    ) -> Result<vk::AccelerationStructureBuildSizesInfoKHR, VulkanError>;
    fn create_acceleration_structure(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, VulkanError>;
    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR);
    fn get_acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress;
    fn min_acceleration_structure_scratch_offset_alignment(&self) -> u32;

    fn create_query_pool(
        &self,
        query_type: vk::QueryType,
        query_count: u32,
    ) -> Result<vk::QueryPool, VulkanError>;
    fn destroy_query_pool(&self, query_pool: vk::QueryPool);
    /// Blocks until the queries are available.
    fn get_query_pool_results(
        &self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> Result<Vec<u64>, VulkanError>;

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image, VulkanError>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> Result<vk::ImageView, VulkanError>;
    fn destroy_image_view(&self, image_view: vk::ImageView);
    fn create_sampler(&self, info: &SamplerInfo) -> Result<vk::Sampler, VulkanError>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        bindings: &[DescriptorBinding],
        max_sets: u32,
    ) -> Result<vk::DescriptorPool, VulkanError>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[WriteDescriptorSet]);

    /// Records `commands` into a fresh command buffer, submits it and waits for the fence.
    fn submit_and_wait(&self, commands: &[Cmd]) -> Result<(), VulkanError>;
}
