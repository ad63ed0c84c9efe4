use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::VulkanError;

use super::{buffer::Buffer, device::GpuDevice};

/// Geometry an acceleration structure is built over, described by device addresses only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccelerationGeometry {
    Triangles {
        vertex_address: vk::DeviceAddress,
        vertex_stride: vk::DeviceSize,
        vertex_format: vk::Format,
        max_vertex: u32,
        index_address: vk::DeviceAddress,
        index_type: vk::IndexType,
        primitive_count: u32,
        flags: vk::GeometryFlagsKHR,
    },
    Instances {
        data_address: vk::DeviceAddress,
        instance_count: u32,
    },
}

impl AccelerationGeometry {
    pub fn primitive_count(&self) -> u32 {
        match self {
            AccelerationGeometry::Triangles {
                primitive_count, ..
            } => *primitive_count,
            AccelerationGeometry::Instances { instance_count, .. } => *instance_count,
        }
    }

    pub fn to_vk(
        &self,
    ) -> (
        vk::AccelerationStructureGeometryKHR,
        vk::AccelerationStructureBuildRangeInfoKHR,
    ) {
        let geometry = match *self {
            AccelerationGeometry::Triangles {
                vertex_address,
                vertex_stride,
                vertex_format,
                max_vertex,
                index_address,
                index_type,
                flags,
                ..
            } => {
                let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                    .vertex_format(vertex_format)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: vertex_address,
                    })
                    .vertex_stride(vertex_stride)
                    .max_vertex(max_vertex)
                    .index_type(index_type)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: index_address,
                    })
                    .build();

                vk::AccelerationStructureGeometryKHR::builder()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
                    .flags(flags)
                    .build()
            }
            AccelerationGeometry::Instances { data_address, .. } => {
                let instances = vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: data_address,
                    })
                    .build();

                vk::AccelerationStructureGeometryKHR::builder()
                    .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { instances })
                    .build()
            }
        };

        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::builder()
            .primitive_count(self.primitive_count())
            .primitive_offset(0)
            .first_vertex(0)
            .transform_offset(0)
            .build();

        (geometry, range_info)
    }
}

/// One `vkCmdBuildAccelerationStructuresKHR` worth of state.
#[derive(Debug, Clone, Copy)]
pub struct AccelerationBuildInfo {
    pub ty: vk::AccelerationStructureTypeKHR,
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    pub mode: vk::BuildAccelerationStructureModeKHR,
    pub src: vk::AccelerationStructureKHR,
    pub dst: vk::AccelerationStructureKHR,
    pub geometry: AccelerationGeometry,
    pub scratch_address: vk::DeviceAddress,
}

pub struct AccelerationStructure {
    pub inner: vk::AccelerationStructureKHR,
    pub buffer: Buffer<u8>,
    pub device_address: vk::DeviceAddress,
    pub size: vk::DeviceSize,
    pub ty: vk::AccelerationStructureTypeKHR,
    device: Arc<dyn GpuDevice>,
}

impl AccelerationStructure {
    // See https://github.com/SaschaWillems/Vulkan/blob/a467d941599a2cef5bd0eff696999bca8d75ee23/base/VulkanRaytracingSample.cpp#L149
    pub fn new(
        device: Arc<dyn GpuDevice>,
        name: &str,
        ty: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
    ) -> Result<Self, VulkanError> {
        let buffer: Buffer<u8> = Buffer::new(
            device.clone(),
            name,
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
        )?;

        let inner = device.create_acceleration_structure(ty, buffer.get_vk_buffer(), size)?;
        let device_address = device.get_acceleration_structure_device_address(inner);

        Ok(Self {
            inner,
            buffer,
            device_address,
            size,
            ty,
            device,
        })
    }
}

impl std::fmt::Debug for AccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("inner", &self.inner)
            .field("ty", &self.ty)
            .field("size", &self.size)
            .field("device_address", &self.device_address)
            .finish()
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        // The backing buffer is released after this, when the field drops
        self.device.destroy_acceleration_structure(self.inner);
    }
}
