use ash::vk;

use crate::vulkan::acceleration_structure::AccelerationBuildInfo;
use crate::vulkan::context::Context;

use super::Cmd;

#[derive(Debug, Clone)]
pub struct CmdCopyBuffer {
    pub src_buffer: vk::Buffer,
    pub dst_buffer: vk::Buffer,
    pub regions: Vec<vk::BufferCopy>,
}

impl CmdCopyBuffer {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        unsafe {
            context.device.cmd_copy_buffer(
                command_buffer,
                self.src_buffer,
                self.dst_buffer,
                &self.regions,
            )
        }
    }
}

/// Inline update, limited to 65536 bytes by Vulkan.
#[derive(Debug, Clone)]
pub struct CmdUpdateBuffer {
    pub dst_buffer: vk::Buffer,
    pub dst_offset: vk::DeviceSize,
    pub data: Vec<u8>,
}

impl CmdUpdateBuffer {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        unsafe {
            context.device.cmd_update_buffer(
                command_buffer,
                self.dst_buffer,
                self.dst_offset,
                &self.data,
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmdCopyBufferToImage {
    pub src_buffer: vk::Buffer,
    pub dst_image: vk::Image,
    pub extent: vk::Extent2D,
}

impl CmdCopyBufferToImage {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        let region = vk::BufferImageCopy::builder()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .build();

        unsafe {
            context.device.cmd_copy_buffer_to_image(
                command_buffer,
                self.src_buffer,
                self.dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmdPipelineBarrier {
    pub dependency_flags: vk::DependencyFlags,
    pub memory_barriers: Vec<MemoryBarrier>,
    pub image_memory_barriers: Vec<ImageMemoryBarrier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMemoryBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub image: vk::Image,
}

impl CmdPipelineBarrier {
    pub fn memory(barrier: MemoryBarrier) -> Self {
        Self {
            dependency_flags: vk::DependencyFlags::empty(),
            memory_barriers: vec![barrier],
            image_memory_barriers: vec![],
        }
    }

    pub fn image(barrier: ImageMemoryBarrier) -> Self {
        Self {
            dependency_flags: vk::DependencyFlags::empty(),
            memory_barriers: vec![],
            image_memory_barriers: vec![barrier],
        }
    }

    pub fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        let memory_barriers: Vec<_> = self
            .memory_barriers
            .iter()
            .map(|v| {
                vk::MemoryBarrier2::builder()
                    .src_stage_mask(v.src_stage_mask)
                    .src_access_mask(v.src_access_mask)
                    .dst_stage_mask(v.dst_stage_mask)
                    .dst_access_mask(v.dst_access_mask)
                    .build() // Calling build is legal here
            })
            .collect();

        let image_memory_barriers: Vec<_> = self
            .image_memory_barriers
            .iter()
            .map(|v| {
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(v.src_stage_mask)
                    .src_access_mask(v.src_access_mask)
                    .dst_stage_mask(v.dst_stage_mask)
                    .dst_access_mask(v.dst_access_mask)
                    .old_layout(v.old_layout)
                    .new_layout(v.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(v.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .build()
            })
            .collect();

        unsafe {
            context.synchronisation2_loader.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::builder()
                    .dependency_flags(self.dependency_flags)
                    .memory_barriers(&memory_barriers)
                    .image_memory_barriers(&image_memory_barriers),
            );
        };
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdResetQueryPool {
    pub query_pool: vk::QueryPool,
    pub first_query: u32,
    pub query_count: u32,
}

impl CmdResetQueryPool {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        unsafe {
            context.device.cmd_reset_query_pool(
                command_buffer,
                self.query_pool,
                self.first_query,
                self.query_count,
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmdBuildAccelerationStructure {
    pub info: AccelerationBuildInfo,
}

impl CmdBuildAccelerationStructure {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        let (geometry, range_info) = self.info.geometry.to_vk();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(self.info.ty)
            .flags(self.info.flags)
            .mode(self.info.mode)
            .src_acceleration_structure(self.info.src)
            .dst_acceleration_structure(self.info.dst)
            .geometries(std::slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: self.info.scratch_address,
            })
            .build();

        unsafe {
            context
                .context_raytracing
                .acceleration_structure
                .cmd_build_acceleration_structures(
                    command_buffer,
                    std::slice::from_ref(&build_info),
                    &[std::slice::from_ref(&range_info)],
                )
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdWriteAccelerationStructuresProperties {
    pub acceleration_structure: vk::AccelerationStructureKHR,
    pub query_type: vk::QueryType,
    pub query_pool: vk::QueryPool,
    pub query: u32,
}

impl CmdWriteAccelerationStructuresProperties {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        unsafe {
            context
                .context_raytracing
                .acceleration_structure
                .cmd_write_acceleration_structures_properties(
                    command_buffer,
                    std::slice::from_ref(&self.acceleration_structure),
                    self.query_type,
                    self.query_pool,
                    self.query,
                )
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CmdCopyAccelerationStructure {
    pub src: vk::AccelerationStructureKHR,
    pub dst: vk::AccelerationStructureKHR,
    pub mode: vk::CopyAccelerationStructureModeKHR,
}

impl CmdCopyAccelerationStructure {
    fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        let copy_info = vk::CopyAccelerationStructureInfoKHR::builder()
            .src(self.src)
            .dst(self.dst)
            .mode(self.mode);
        unsafe {
            context
                .context_raytracing
                .acceleration_structure
                .cmd_copy_acceleration_structure(command_buffer, &copy_info)
        }
    }
}

impl Cmd {
    pub(crate) fn execute(&self, command_buffer: vk::CommandBuffer, context: &Context) {
        match self {
            Cmd::CopyBuffer(cmd) => cmd.execute(command_buffer, context),
            Cmd::UpdateBuffer(cmd) => cmd.execute(command_buffer, context),
            Cmd::CopyBufferToImage(cmd) => cmd.execute(command_buffer, context),
            Cmd::PipelineBarrier(cmd) => cmd.execute(command_buffer, context),
            Cmd::ResetQueryPool(cmd) => cmd.execute(command_buffer, context),
            Cmd::BuildAccelerationStructure(cmd) => cmd.execute(command_buffer, context),
            Cmd::WriteAccelerationStructuresProperties(cmd) => {
                cmd.execute(command_buffer, context)
            }
            Cmd::CopyAccelerationStructure(cmd) => cmd.execute(command_buffer, context),
        }
    }
}

macro_rules! impl_into_cmd {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Cmd {
                fn from(cmd: $ty) -> Self {
                    Cmd::$variant(cmd)
                }
            }
        )*
    };
}

impl_into_cmd!(
    CopyBuffer(CmdCopyBuffer),
    UpdateBuffer(CmdUpdateBuffer),
    CopyBufferToImage(CmdCopyBufferToImage),
    PipelineBarrier(CmdPipelineBarrier),
    ResetQueryPool(CmdResetQueryPool),
    BuildAccelerationStructure(CmdBuildAccelerationStructure),
    WriteAccelerationStructuresProperties(CmdWriteAccelerationStructuresProperties),
    CopyAccelerationStructure(CmdCopyAccelerationStructure),
);
