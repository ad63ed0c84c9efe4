use std::sync::Arc;
use std::{marker::PhantomData, ops::Deref};

use ash::{self, vk};
use gpu_allocator::MemoryLocation;

use crate::error::VulkanError;

use super::command_buffer::{CmdCopyBuffer, CommandBuffer};
use super::device::{BufferCreateInfo, GpuDevice};

pub struct UntypedBuffer {
    pub inner: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub size: vk::DeviceSize,
    device: Arc<dyn GpuDevice>,
}

impl UntypedBuffer {
    pub fn get_device_address(&self) -> Result<vk::DeviceAddress, VulkanError> {
        if !self
            .usage
            .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        {
            return Err(VulkanError::MissingDeviceAddressUsage(self.inner));
        }
        Ok(self.device.get_buffer_device_address(self.inner))
    }
}

impl std::fmt::Debug for UntypedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UntypedBuffer")
            .field("inner", &self.inner)
            .field("usage", &self.usage)
            .field("size", &self.size)
            .finish()
    }
}

/*
Design note
Cloning a Buffer<T> shares the UntypedBuffer. The vk::Buffer is destroyed when the last clone drops,
so a buffer that several primitives point at can never be freed twice.
*/

pub struct Buffer<T> {
    inner: Arc<UntypedBuffer>,
    _marker: PhantomData<T>,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> Buffer<T> {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Buffer<T>, VulkanError> {
        let buffer = device.create_buffer(&BufferCreateInfo {
            name,
            size,
            usage,
            location,
        })?;

        let untyped = Arc::new(UntypedBuffer {
            inner: buffer,
            usage,
            location,
            size,
            device,
        });
        Ok(Buffer {
            inner: untyped,
            _marker: PhantomData,
        })
    }

    pub fn get_vk_buffer(&self) -> vk::Buffer {
        self.inner.inner
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.inner.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.inner.usage
    }

    pub fn get_device_address(&self) -> Result<vk::DeviceAddress, VulkanError> {
        self.inner.get_device_address()
    }

    pub fn get_untyped(&self) -> &Arc<UntypedBuffer> {
        &self.inner
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.inner.device
    }
}

impl<T: bytemuck::Pod> Buffer<T> {
    /// Only valid for buffers that live in host visible memory.
    pub fn copy_data(&self, data: &[T]) -> Result<(), VulkanError> {
        if self.inner.location == MemoryLocation::GpuOnly {
            return Err(VulkanError::NotHostVisible(self.inner.inner));
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.inner.size {
            return Err(VulkanError::BufferOverflow {
                offset: 0,
                size: bytes.len() as u64,
                capacity: self.inner.size,
            });
        }
        self.inner.device.write_buffer(self.inner.inner, 0, bytes)
    }

    /// Creates a device local buffer and records a staging copy of `data` into it.
    /// The staging buffer stays alive inside `command_buffer` until it has been submitted.
    pub fn from_host_slice(
        command_buffer: &mut CommandBuffer,
        name: &str,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer<T>, VulkanError> {
        let data_size = std::mem::size_of_val(data) as vk::DeviceSize;
        // Zero sized buffers are invalid, keep at least one element worth of storage
        let buffer_size = data_size.max(std::mem::size_of::<T>().max(4) as vk::DeviceSize);

        let buffer = Buffer::new(
            command_buffer.device().clone(),
            name,
            buffer_size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;
        if data_size == 0 {
            return Ok(buffer);
        }

        let staging_buffer: Buffer<T> = Buffer::new(
            command_buffer.device().clone(),
            "staging",
            data_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging_buffer.copy_data(data)?;

        buffer.copy_from(command_buffer, &staging_buffer, 0..data_size);
        command_buffer.keep_alive(staging_buffer.get_untyped().clone());
        Ok(buffer)
    }

    pub fn copy_from(
        &self,
        command_buffer: &mut CommandBuffer,
        other: &Buffer<T>,
        other_range: std::ops::Range<vk::DeviceSize>,
    ) {
        debug_assert!(other
            .inner
            .usage
            .contains(vk::BufferUsageFlags::TRANSFER_SRC));
        debug_assert!(self
            .inner
            .usage
            .contains(vk::BufferUsageFlags::TRANSFER_DST));

        command_buffer.add_cmd(CmdCopyBuffer {
            src_buffer: other.get_vk_buffer(),
            dst_buffer: self.get_vk_buffer(),
            regions: vec![vk::BufferCopy {
                dst_offset: 0,
                src_offset: other_range.start,
                size: other_range.end - other_range.start,
            }],
        });
    }
}

impl Drop for UntypedBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.inner);
    }
}

impl<T> Deref for Buffer<T> {
    type Target = vk::Buffer;

    fn deref(&self) -> &Self::Target {
        &self.inner.inner
    }
}
