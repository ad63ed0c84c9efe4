//! A `GpuDevice` that records instead of rendering. Buffers get host side memory, so copies
//! and uploads can be inspected after a submission.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use ash::vk::{self, Handle};
use gpu_allocator::MemoryLocation;

use crate::error::VulkanError;

use super::acceleration_structure::AccelerationGeometry;
use super::command_buffer::Cmd;
use super::descriptor_set::{DescriptorBinding, WriteDescriptorSet};
use super::device::{BufferCreateInfo, GpuDevice, ImageCreateInfo};
use super::image::SamplerInfo;

pub const MOCK_SCRATCH_ALIGNMENT: u32 = 128;

#[derive(Debug, Clone)]
pub struct MockBuffer {
    pub name: String,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct MockAccelerationStructure {
    pub ty: vk::AccelerationStructureTypeKHR,
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    live: HashSet<u64>,
    destroyed: Vec<u64>,
    buffers: HashMap<u64, MockBuffer>,
    acceleration_structures: HashMap<u64, MockAccelerationStructure>,
    query_results: HashMap<u64, Vec<u64>>,
    submissions: Vec<Vec<Cmd>>,
    descriptor_writes: Vec<(vk::DescriptorSet, Vec<WriteDescriptorSet>)>,
}

impl MockState {
    fn create(&mut self) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        self.next_handle
    }

    fn destroy(&mut self, raw: u64, what: &str) {
        assert!(
            self.live.remove(&raw),
            "{what} {raw:#x} destroyed twice or never created"
        );
        self.destroyed.push(raw);
    }

    fn buffer_by_address(&self, address: vk::DeviceAddress) -> Option<(u64, &MockBuffer)> {
        let raw = address >> 32;
        self.buffers.get(&raw).map(|buffer| (raw, buffer))
    }
}

pub struct MockDevice {
    state: Mutex<MockState>,
    fail_submissions: AtomicBool,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            fail_submissions: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Every following submission reports a lost device.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Deliberately not aligned to [`MOCK_SCRATCH_ALIGNMENT`].
    pub fn buffer_address(buffer: vk::Buffer) -> vk::DeviceAddress {
        (buffer.as_raw() << 32) | 64
    }

    pub fn acceleration_structure_size(geometry: &AccelerationGeometry) -> vk::DeviceSize {
        match geometry {
            AccelerationGeometry::Triangles {
                primitive_count, ..
            } => 1024 + 64 * *primitive_count as u64,
            AccelerationGeometry::Instances { instance_count, .. } => {
                1024 + 128 * *instance_count as u64
            }
        }
    }

    /// What the compacted size query reports for a structure of `size` bytes.
    pub fn compacted_size(size: vk::DeviceSize) -> vk::DeviceSize {
        (size * 6 / 10 + 255) & !255
    }

    pub fn submissions(&self) -> Vec<Vec<Cmd>> {
        self.state().submissions.clone()
    }

    pub fn live_handle_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.state().live.contains(&raw)
    }

    pub fn destroy_count(&self, raw: u64) -> usize {
        self.state()
            .destroyed
            .iter()
            .filter(|destroyed| **destroyed == raw)
            .count()
    }

    pub fn buffer(&self, buffer: vk::Buffer) -> Option<MockBuffer> {
        self.state().buffers.get(&buffer.as_raw()).cloned()
    }

    pub fn live_buffers(&self) -> Vec<MockBuffer> {
        let state = self.state();
        let mut buffers: Vec<_> = state
            .buffers
            .iter()
            .filter(|(raw, _)| state.live.contains(raw))
            .map(|(_, buffer)| buffer.clone())
            .collect();
        buffers.sort_by(|a, b| a.name.cmp(&b.name));
        buffers
    }

    pub fn acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> Option<MockAccelerationStructure> {
        self.state()
            .acceleration_structures
            .get(&acceleration_structure.as_raw())
            .copied()
    }

    pub fn descriptor_writes(&self) -> Vec<(vk::DescriptorSet, Vec<WriteDescriptorSet>)> {
        self.state().descriptor_writes.clone()
    }

    fn execute(state: &mut MockState, cmd: &Cmd) {
        match cmd {
            Cmd::CopyBuffer(copy) => {
                for region in &copy.regions {
                    let src = state.buffers[&copy.src_buffer.as_raw()].data
                        [region.src_offset as usize..(region.src_offset + region.size) as usize]
                        .to_vec();
                    let dst = state
                        .buffers
                        .get_mut(&copy.dst_buffer.as_raw())
                        .unwrap();
                    let start = region.dst_offset as usize;
                    dst.data[start..start + src.len()].copy_from_slice(&src);
                }
            }
            Cmd::UpdateBuffer(update) => {
                let dst = state
                    .buffers
                    .get_mut(&update.dst_buffer.as_raw())
                    .unwrap();
                let start = update.dst_offset as usize;
                dst.data[start..start + update.data.len()].copy_from_slice(&update.data);
            }
            Cmd::CopyBufferToImage(copy) => {
                assert!(state.live.contains(&copy.dst_image.as_raw()));
            }
            Cmd::PipelineBarrier(_) => {}
            Cmd::ResetQueryPool(reset) => {
                let results = state
                    .query_results
                    .get_mut(&reset.query_pool.as_raw())
                    .unwrap();
                for result in results
                    .iter_mut()
                    .skip(reset.first_query as usize)
                    .take(reset.query_count as usize)
                {
                    *result = 0;
                }
            }
            Cmd::BuildAccelerationStructure(build) => {
                let info = &build.info;
                assert!(state.live.contains(&info.dst.as_raw()));
                if info.mode == vk::BuildAccelerationStructureModeKHR::UPDATE {
                    assert!(state.live.contains(&info.src.as_raw()));
                }
                assert_eq!(
                    info.scratch_address % MOCK_SCRATCH_ALIGNMENT as u64,
                    0,
                    "misaligned scratch address"
                );
                let (_, scratch) = state
                    .buffer_by_address(info.scratch_address)
                    .expect("scratch address does not point into a buffer");
                assert!(scratch
                    .usage
                    .contains(vk::BufferUsageFlags::STORAGE_BUFFER));
            }
            Cmd::WriteAccelerationStructuresProperties(write) => {
                let size = state.acceleration_structures[&write.acceleration_structure.as_raw()]
                    .size;
                let results = state
                    .query_results
                    .get_mut(&write.query_pool.as_raw())
                    .unwrap();
                results[write.query as usize] = Self::compacted_size(size);
            }
            Cmd::CopyAccelerationStructure(copy) => {
                assert!(state.live.contains(&copy.src.as_raw()));
                assert!(state.live.contains(&copy.dst.as_raw()));
            }
        }
    }
}

impl GpuDevice for MockDevice {
    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer, VulkanError> {
        let mut state = self.state();
        let raw = state.create();
        state.buffers.insert(
            raw,
            MockBuffer {
                name: info.name.to_string(),
                size: info.size,
                usage: info.usage,
                location: info.location,
                data: vec![0; info.size as usize],
            },
        );
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state().destroy(buffer.as_raw(), "buffer");
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<(), VulkanError> {
        let mut state = self.state();
        let mock = state.buffers.get_mut(&buffer.as_raw()).unwrap();
        if mock.location == MemoryLocation::GpuOnly {
            return Err(VulkanError::NotHostVisible(buffer));
        }
        let start = offset as usize;
        mock.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn get_buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        Self::buffer_address(buffer)
    }

    fn get_acceleration_structure_build_sizes(
        &self,
        _ty: vk::AccelerationStructureTypeKHR,
        _flags: vk::BuildAccelerationStructureFlagsKHR,
        geometry: &AccelerationGeometry,
    ) -> Result<vk::AccelerationStructureBuildSizesInfoKHR, VulkanError> {
        let count = geometry.primitive_count() as u64;
        Ok(vk::AccelerationStructureBuildSizesInfoKHR {
            acceleration_structure_size: Self::acceleration_structure_size(geometry),
            build_scratch_size: 512 + 32 * count,
            update_scratch_size: 256 + 16 * count,
            ..Default::default()
        })
    }

    fn create_acceleration_structure(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, VulkanError> {
        let mut state = self.state();
        assert!(state.buffers[&buffer.as_raw()].size >= size);
        let raw = state.create();
        state
            .acceleration_structures
            .insert(raw, MockAccelerationStructure { ty, buffer, size });
        Ok(vk::AccelerationStructureKHR::from_raw(raw))
    }

    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR) {
        self.state()
            .destroy(acceleration_structure.as_raw(), "acceleration structure");
    }

    fn get_acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress {
        0x8000_0000_0000_0000 | acceleration_structure.as_raw()
    }

    fn min_acceleration_structure_scratch_offset_alignment(&self) -> u32 {
        MOCK_SCRATCH_ALIGNMENT
    }

    fn create_query_pool(
        &self,
        _query_type: vk::QueryType,
        query_count: u32,
    ) -> Result<vk::QueryPool, VulkanError> {
        let mut state = self.state();
        let raw = state.create();
        state.query_results.insert(raw, vec![0; query_count as usize]);
        Ok(vk::QueryPool::from_raw(raw))
    }

    fn destroy_query_pool(&self, query_pool: vk::QueryPool) {
        self.state().destroy(query_pool.as_raw(), "query pool");
    }

    fn get_query_pool_results(
        &self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> Result<Vec<u64>, VulkanError> {
        let state = self.state();
        let results = &state.query_results[&query_pool.as_raw()];
        Ok(results[first_query as usize..(first_query + query_count) as usize].to_vec())
    }

    fn create_image(&self, _info: &ImageCreateInfo) -> Result<vk::Image, VulkanError> {
        Ok(vk::Image::from_raw(self.state().create()))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state().destroy(image.as_raw(), "image");
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _format: vk::Format,
    ) -> Result<vk::ImageView, VulkanError> {
        let mut state = self.state();
        assert!(state.live.contains(&image.as_raw()));
        Ok(vk::ImageView::from_raw(state.create()))
    }

    fn destroy_image_view(&self, image_view: vk::ImageView) {
        self.state().destroy(image_view.as_raw(), "image view");
    }

    fn create_sampler(&self, _info: &SamplerInfo) -> Result<vk::Sampler, VulkanError> {
        Ok(vk::Sampler::from_raw(self.state().create()))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy(sampler.as_raw(), "sampler");
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        Ok(vk::DescriptorSetLayout::from_raw(self.state().create()))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().destroy(layout.as_raw(), "descriptor set layout");
    }

    fn create_descriptor_pool(
        &self,
        _bindings: &[DescriptorBinding],
        _max_sets: u32,
    ) -> Result<vk::DescriptorPool, VulkanError> {
        Ok(vk::DescriptorPool::from_raw(self.state().create()))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().destroy(pool.as_raw(), "descriptor pool");
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let mut state = self.state();
        assert!(state.live.contains(&pool.as_raw()));
        assert!(state.live.contains(&layout.as_raw()));
        state.next_handle += 1;
        Ok(vk::DescriptorSet::from_raw(state.next_handle))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[WriteDescriptorSet]) {
        self.state().descriptor_writes.push((set, writes.to_vec()));
    }

    fn submit_and_wait(&self, commands: &[Cmd]) -> Result<(), VulkanError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(VulkanError::Vk(vk::Result::ERROR_DEVICE_LOST));
        }
        let mut state = self.state();
        for cmd in commands {
            Self::execute(&mut state, cmd);
        }
        state.submissions.push(commands.to_vec());
        Ok(())
    }
}
