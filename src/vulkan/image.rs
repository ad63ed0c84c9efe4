use std::sync::Arc;

use ash::vk::{self, AccessFlags2, ImageLayout, PipelineStageFlags2};

use crate::error::VulkanError;

use super::buffer::Buffer;
use super::command_buffer::{CmdCopyBufferToImage, CmdPipelineBarrier, CommandBuffer, ImageMemoryBarrier};
use super::device::{GpuDevice, ImageCreateInfo};

pub struct Image {
    pub inner: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<dyn GpuDevice>,
}

impl Image {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Image, VulkanError> {
        let inner = device.create_image(&ImageCreateInfo {
            name,
            extent,
            format,
            usage,
        })?;
        Ok(Self {
            inner,
            format,
            extent,
            device,
        })
    }

    /// Records the upload of `buffer` into the whole image and leaves it ready for sampling.
    pub fn copy_from_buffer_for_texture(&self, command_buffer: &mut CommandBuffer, buffer: &Buffer<u8>) {
        command_buffer.add_cmd(CmdPipelineBarrier::image(ImageMemoryBarrier {
            src_stage_mask: PipelineStageFlags2::NONE,
            src_access_mask: AccessFlags2::NONE,
            dst_stage_mask: PipelineStageFlags2::COPY,
            dst_access_mask: AccessFlags2::TRANSFER_WRITE,
            old_layout: ImageLayout::UNDEFINED,
            new_layout: ImageLayout::TRANSFER_DST_OPTIMAL,
            image: self.inner,
        }));

        command_buffer.add_cmd(CmdCopyBufferToImage {
            src_buffer: buffer.get_vk_buffer(),
            dst_image: self.inner,
            extent: self.extent,
        });

        command_buffer.add_cmd(CmdPipelineBarrier::image(ImageMemoryBarrier {
            src_stage_mask: PipelineStageFlags2::COPY,
            src_access_mask: AccessFlags2::TRANSFER_WRITE,
            dst_stage_mask: PipelineStageFlags2::RAY_TRACING_SHADER_KHR
                | PipelineStageFlags2::FRAGMENT_SHADER
                | PipelineStageFlags2::COMPUTE_SHADER,
            dst_access_mask: AccessFlags2::SHADER_SAMPLED_READ,
            old_layout: ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            image: self.inner,
        }));
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.device.destroy_image(self.inner);
    }
}

pub struct ImageView {
    pub inner: vk::ImageView,
    pub image: Arc<Image>,
    device: Arc<dyn GpuDevice>,
}

impl ImageView {
    pub fn new_default(device: Arc<dyn GpuDevice>, image: Arc<Image>) -> Result<Self, VulkanError> {
        let inner = device.create_image_view(image.inner, image.format)?;
        Ok(Self {
            inner,
            image,
            device,
        })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.inner);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerInfo {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
        }
    }
}

pub struct Sampler {
    pub inner: vk::Sampler,
    pub info: SamplerInfo,
    device: Arc<dyn GpuDevice>,
}

impl Sampler {
    pub fn new(device: Arc<dyn GpuDevice>, info: SamplerInfo) -> Result<Self, VulkanError> {
        let inner = device.create_sampler(&info)?;
        Ok(Self {
            inner,
            info,
            device,
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.inner);
    }
}

/// A sampled image as it ends up in a combined image sampler slot.
#[derive(Clone)]
pub struct Texture {
    pub image_view: Arc<ImageView>,
    pub sampler: Arc<Sampler>,
}
