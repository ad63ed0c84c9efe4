use std::ops::Range;
use std::sync::Arc;

use ash::vk::{self, AccessFlags2, PipelineStageFlags2};
use gpu_allocator::MemoryLocation;

use crate::error::{AccelerationError, VulkanError};
use crate::render::shader_types::CompressedVertex;
use crate::scene::PrimitiveMesh;
use crate::scene_uploader::PrimitiveBuffers;
use crate::utility::aligned_size;
use crate::vulkan::acceleration_structure::{
    AccelerationBuildInfo, AccelerationGeometry, AccelerationStructure,
};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_buffer::{
    CmdBuildAccelerationStructure, CmdCopyAccelerationStructure, CmdPipelineBarrier,
    CmdResetQueryPool, CmdWriteAccelerationStructuresProperties, CommandBuffer, MemoryBarrier,
};
use crate::vulkan::device::GpuDevice;
use crate::vulkan::query_pool::QueryPool;

use super::AccelerationBuilder;

/// Geometry of one bottom level structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlasInput {
    pub geometry: AccelerationGeometry,
    /// Combined with the flags passed to the build
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
}

impl BlasInput {
    /// One triangle geometry over the compressed vertices, positions sit at offset 0.
    ///
    /// Opacity is left to the instance flags so any-hit shaders still see blended materials.
    pub fn from_primitive(
        primitive: &PrimitiveMesh,
        buffers: &PrimitiveBuffers,
    ) -> Result<Self, VulkanError> {
        Ok(Self {
            geometry: AccelerationGeometry::Triangles {
                vertex_address: buffers.vertices.get_device_address()?,
                vertex_stride: std::mem::size_of::<CompressedVertex>() as vk::DeviceSize,
                vertex_format: vk::Format::R32G32B32_SFLOAT,
                max_vertex: primitive.vertex_count.saturating_sub(1),
                index_address: buffers.indices.get_device_address()?,
                index_type: vk::IndexType::UINT32,
                primitive_count: primitive.triangle_count(),
                flags: vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION,
            },
            flags: vk::BuildAccelerationStructureFlagsKHR::empty(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlasState {
    Unbuilt,
    Building,
    Built,
    CompactionRequested,
    Compacting,
    Compacted,
}

fn transition(index: usize, state: &mut BlasState, next: BlasState) {
    log::trace!("BLAS {}: {:?} -> {:?}", index, state, next);
    *state = next;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlasBuildReport {
    pub batches: usize,
    /// Summed structure size before compaction
    pub total_size: vk::DeviceSize,
    /// Equal to `total_size` when nothing was compacted
    pub compacted_size: vk::DeviceSize,
}

/// Splits inputs into consecutive batches. A batch is closed as soon as its summed size reaches
/// `limit`, so a single oversized input still gets a batch of its own.
pub fn partition_batches(sizes: &[vk::DeviceSize], limit: vk::DeviceSize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut batch_size = 0;
    for (index, size) in sizes.iter().enumerate() {
        batch_size += size;
        if batch_size >= limit || index == sizes.len() - 1 {
            batches.push(start..index + 1);
            start = index + 1;
            batch_size = 0;
        }
    }
    batches
}

/// A scratch buffer with an address aligned to what acceleration structure builds require.
pub(crate) struct ScratchBuffer {
    _buffer: Buffer<u8>,
    pub address: vk::DeviceAddress,
}

impl ScratchBuffer {
    pub fn new(device: Arc<dyn GpuDevice>, size: vk::DeviceSize) -> Result<Self, VulkanError> {
        let alignment = device.min_acceleration_structure_scratch_offset_alignment() as u64;
        let buffer: Buffer<u8> = Buffer::new(
            device,
            "scratch",
            size + alignment,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
        )?;
        let address = aligned_size(buffer.get_device_address()?, alignment);
        Ok(Self {
            _buffer: buffer,
            address,
        })
    }
}

/// Builds may reuse the scratch memory and read the structure right after.
fn build_barrier() -> CmdPipelineBarrier {
    CmdPipelineBarrier::memory(MemoryBarrier {
        src_stage_mask: PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        src_access_mask: AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        dst_stage_mask: PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        dst_access_mask: AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
            | AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
    })
}

impl AccelerationBuilder {
    /// Builds one bottom level structure per input and appends them, in input order.
    ///
    /// Either every input asks for `ALLOW_COMPACTION` or none does. Batches are submitted one
    /// after the other and each submission is waited for.
    pub fn build_blas(
        &mut self,
        inputs: &[BlasInput],
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<BlasBuildReport, AccelerationError> {
        if inputs.is_empty() {
            return Err(AccelerationError::EmptyInput);
        }

        let input_flags: Vec<_> = inputs.iter().map(|input| input.flags | flags).collect();
        let compaction_requests = input_flags
            .iter()
            .filter(|flags| flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION))
            .count();
        if compaction_requests != 0 && compaction_requests != inputs.len() {
            log::error!(
                "{} of {} BLAS inputs request compaction",
                compaction_requests,
                inputs.len()
            );
            return Err(AccelerationError::MixedCompaction {
                requested: compaction_requests,
                total: inputs.len(),
            });
        }
        let compact = compaction_requests != 0;

        let mut total_size = 0;
        let mut max_scratch_size = 0;
        let mut build_sizes = Vec::with_capacity(inputs.len());
        for (input, flags) in inputs.iter().zip(&input_flags) {
            let sizes = self.device.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                *flags,
                &input.geometry,
            )?;
            total_size += sizes.acceleration_structure_size;
            max_scratch_size = max_scratch_size.max(sizes.build_scratch_size);
            build_sizes.push(sizes);
        }

        let scratch = ScratchBuffer::new(self.device.clone(), max_scratch_size)?;
        let query_pool = if compact {
            Some(QueryPool::new(
                self.device.clone(),
                vk::QueryType::ACCELERATION_STRUCTURE_COMPACTED_SIZE_KHR,
                inputs.len() as u32,
            )?)
        } else {
            None
        };

        let structure_sizes: Vec<_> = build_sizes
            .iter()
            .map(|sizes| sizes.acceleration_structure_size)
            .collect();
        let batches = partition_batches(&structure_sizes, self.batch_size_limit);
        log::debug!(
            "Building {} BLAS in {} batches, {} bytes, {} bytes of scratch",
            inputs.len(),
            batches.len(),
            total_size,
            max_scratch_size
        );

        let mut states = vec![BlasState::Unbuilt; inputs.len()];
        let mut built = Vec::with_capacity(inputs.len());
        let mut compacted_size = 0;

        for batch in &batches {
            let mut command_buffer = CommandBuffer::new(self.device.clone());
            if let Some(query_pool) = &query_pool {
                command_buffer.add_cmd(CmdResetQueryPool {
                    query_pool: **query_pool,
                    first_query: 0,
                    query_count: batch.len() as u32,
                });
            }

            let mut batch_structures = Vec::with_capacity(batch.len());
            for (query, index) in batch.clone().enumerate() {
                transition(index, &mut states[index], BlasState::Building);
                let structure = AccelerationStructure::new(
                    self.device.clone(),
                    &format!("blas {}", index),
                    vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                    build_sizes[index].acceleration_structure_size,
                )?;

                command_buffer.add_cmd(CmdBuildAccelerationStructure {
                    info: AccelerationBuildInfo {
                        ty: vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                        flags: input_flags[index],
                        mode: vk::BuildAccelerationStructureModeKHR::BUILD,
                        src: vk::AccelerationStructureKHR::null(),
                        dst: structure.inner,
                        geometry: inputs[index].geometry,
                        scratch_address: scratch.address,
                    },
                });
                command_buffer.add_cmd(build_barrier());

                if let Some(query_pool) = &query_pool {
                    command_buffer.add_cmd(CmdWriteAccelerationStructuresProperties {
                        acceleration_structure: structure.inner,
                        query_type: query_pool.query_type(),
                        query_pool: **query_pool,
                        query: query as u32,
                    });
                }
                batch_structures.push(structure);
            }
            command_buffer.submit_and_wait()?;
            for index in batch.clone() {
                transition(index, &mut states[index], BlasState::Built);
            }

            if let Some(query_pool) = &query_pool {
                let sizes = query_pool.get_results(batch.len() as u32)?;
                let mut command_buffer = CommandBuffer::new(self.device.clone());
                let mut compacted = Vec::with_capacity(batch.len());
                for ((index, original), size) in batch.clone().zip(&batch_structures).zip(sizes) {
                    transition(index, &mut states[index], BlasState::CompactionRequested);
                    let structure = AccelerationStructure::new(
                        self.device.clone(),
                        &format!("blas {} compacted", index),
                        vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                        size,
                    )?;
                    command_buffer.add_cmd(CmdCopyAccelerationStructure {
                        src: original.inner,
                        dst: structure.inner,
                        mode: vk::CopyAccelerationStructureModeKHR::COMPACT,
                    });
                    transition(index, &mut states[index], BlasState::Compacting);
                    compacted_size += size;
                    compacted.push(structure);
                }
                command_buffer.submit_and_wait()?;
                for index in batch.clone() {
                    transition(index, &mut states[index], BlasState::Compacted);
                }
                // the originals are destroyed here
                batch_structures = compacted;
            }

            built.extend(batch_structures);
        }

        if compact {
            let reduction = total_size.saturating_sub(compacted_size);
            log::info!(
                "BLAS compaction: {} -> {} bytes, {} bytes ({:.2}%) smaller",
                total_size,
                compacted_size,
                reduction,
                reduction as f64 / total_size.max(1) as f64 * 100.0
            );
        } else {
            compacted_size = total_size;
        }

        self.blas.extend(built);
        Ok(BlasBuildReport {
            batches: batches.len(),
            total_size,
            compacted_size,
        })
    }

    /// Refits one bottom level structure in place, it has to be built with `ALLOW_UPDATE`.
    pub fn update_blas(
        &mut self,
        index: usize,
        input: &BlasInput,
        flags: vk::BuildAccelerationStructureFlagsKHR,
    ) -> Result<(), AccelerationError> {
        let flags = input.flags | flags;
        if !flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE) {
            return Err(AccelerationError::UpdateWithoutAllowUpdate);
        }
        let blas = self.blas(index)?.inner;

        let sizes = self.device.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            flags,
            &input.geometry,
        )?;
        let scratch = ScratchBuffer::new(self.device.clone(), sizes.update_scratch_size)?;

        let mut command_buffer = CommandBuffer::new(self.device.clone());
        command_buffer.add_cmd(CmdBuildAccelerationStructure {
            info: AccelerationBuildInfo {
                ty: vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                flags,
                mode: vk::BuildAccelerationStructureModeKHR::UPDATE,
                src: blas,
                dst: blas,
                geometry: input.geometry,
                scratch_address: scratch.address,
            },
        });
        command_buffer.add_cmd(build_barrier());
        command_buffer.submit_and_wait()?;
        log::trace!("BLAS {} updated", index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_loader::AccelerationConfig;
    use crate::vulkan::command_buffer::Cmd;
    use crate::vulkan::mock_device::MockDevice;
    use ash::vk::Handle;

    fn input(primitive_count: u32) -> BlasInput {
        BlasInput {
            geometry: AccelerationGeometry::Triangles {
                vertex_address: 0x1000,
                vertex_stride: 32,
                vertex_format: vk::Format::R32G32B32_SFLOAT,
                max_vertex: primitive_count * 3 - 1,
                index_address: 0x2000,
                index_type: vk::IndexType::UINT32,
                primitive_count,
                flags: vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION,
            },
            flags: vk::BuildAccelerationStructureFlagsKHR::empty(),
        }
    }

    fn mock_size(primitive_count: u32) -> vk::DeviceSize {
        MockDevice::acceleration_structure_size(&input(primitive_count).geometry)
    }

    fn builder(device: &Arc<MockDevice>, batch_size_limit: u64) -> AccelerationBuilder {
        AccelerationBuilder::new(
            device.clone(),
            &AccelerationConfig {
                batch_size_limit,
                ..Default::default()
            },
        )
    }

    const FAST_TRACE: vk::BuildAccelerationStructureFlagsKHR =
        vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
    const COMPACT: vk::BuildAccelerationStructureFlagsKHR =
        vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION;

    #[test]
    fn batches_close_once_the_limit_is_reached() {
        assert_eq!(partition_batches(&[100, 100, 100], 150), vec![0..2, 2..3]);
        assert_eq!(partition_batches(&[100, 100, 100], 0), vec![0..1, 1..2, 2..3]);
        assert_eq!(partition_batches(&[100, 100, 100], u64::MAX), vec![0..3]);
        assert_eq!(partition_batches(&[500, 1, 1], 100), vec![0..1, 1..3]);
        assert!(partition_batches(&[], 100).is_empty());
    }

    #[test]
    fn oversized_scenes_are_built_in_several_batches_in_order() {
        let device = Arc::new(MockDevice::new());
        let counts = [16, 4, 16, 8];
        let inputs: Vec<_> = counts.iter().map(|&c| input(c)).collect();
        assert_eq!(mock_size(16), 2048);
        let mut builder = builder(&device, 3000);

        let report = builder.build_blas(&inputs, FAST_TRACE).unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(device.submissions().len(), 2);
        assert_eq!(report.total_size, report.compacted_size);

        assert_eq!(builder.blas_count(), counts.len());
        for (index, &count) in counts.iter().enumerate() {
            let blas = builder.blas(index).unwrap();
            let mock = device.acceleration_structure(blas.inner).unwrap();
            assert_eq!(mock.size, mock_size(count));
            assert_eq!(mock.ty, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
        }

        // only the structures and their buffers are left
        assert_eq!(device.live_handle_count(), 2 * counts.len());
    }

    #[test]
    fn every_build_is_followed_by_a_barrier() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device, u64::MAX);
        builder
            .build_blas(&[input(1), input(2)], FAST_TRACE | COMPACT)
            .unwrap();

        let submissions = device.submissions();
        let build = &submissions[0];
        assert!(matches!(build[0], Cmd::ResetQueryPool(_)));
        for chunk in build[1..].chunks(3) {
            assert!(matches!(chunk[0], Cmd::BuildAccelerationStructure(_)));
            assert!(matches!(chunk[1], Cmd::PipelineBarrier(_)));
            assert!(matches!(chunk[2], Cmd::WriteAccelerationStructuresProperties(_)));
        }
        assert_eq!(build.len(), 7);

        // every build shares the one scratch buffer
        let scratch: Vec<_> = build
            .iter()
            .filter_map(|cmd| match cmd {
                Cmd::BuildAccelerationStructure(build) => Some(build.info.scratch_address),
                _ => None,
            })
            .collect();
        assert_eq!(scratch[0], scratch[1]);
    }

    #[test]
    fn compaction_shrinks_and_releases_the_originals() {
        let device = Arc::new(MockDevice::new());
        let counts = [16, 4, 32];
        let inputs: Vec<_> = counts.iter().map(|&c| input(c)).collect();
        let mut builder = builder(&device, mock_size(16) + 1);

        let report = builder.build_blas(&inputs, FAST_TRACE | COMPACT).unwrap();
        assert_eq!(report.batches, 2);
        // a build and a compaction submission per batch
        assert_eq!(device.submissions().len(), 4);
        assert!(report.compacted_size <= report.total_size);
        assert_eq!(
            report.compacted_size,
            counts
                .iter()
                .map(|&c| MockDevice::compacted_size(mock_size(c)))
                .sum::<u64>()
        );

        for (index, &count) in counts.iter().enumerate() {
            let mock = device
                .acceleration_structure(builder.blas(index).unwrap().inner)
                .unwrap();
            assert!(mock.size <= mock_size(count));
            assert_eq!(mock.size, MockDevice::compacted_size(mock_size(count)));
        }
        assert_eq!(device.live_handle_count(), 2 * counts.len());
    }

    #[test]
    fn mixed_compaction_fails_before_any_gpu_work() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device, u64::MAX);
        let mut compacted = input(1);
        compacted.flags = COMPACT;

        let result = builder.build_blas(&[input(1), compacted, input(2)], FAST_TRACE);
        assert!(matches!(
            result,
            Err(AccelerationError::MixedCompaction {
                requested: 1,
                total: 3
            })
        ));
        assert!(device.submissions().is_empty());
        assert_eq!(device.live_handle_count(), 0);
        assert_eq!(builder.blas_count(), 0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device, u64::MAX);
        assert!(matches!(
            builder.build_blas(&[], FAST_TRACE),
            Err(AccelerationError::EmptyInput)
        ));
    }

    #[test]
    fn failed_submissions_leave_nothing_behind() {
        let device = Arc::new(MockDevice::new());
        device.fail_submissions(true);
        let mut builder = builder(&device, u64::MAX);

        let result = builder.build_blas(&[input(1), input(2)], FAST_TRACE | COMPACT);
        assert!(matches!(
            result,
            Err(AccelerationError::Vulkan(VulkanError::Vk(
                vk::Result::ERROR_DEVICE_LOST
            )))
        ));
        assert_eq!(builder.blas_count(), 0);
        assert_eq!(device.live_handle_count(), 0);
    }

    #[test]
    fn blas_updates_happen_in_place() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device, u64::MAX);
        let allow_update = vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
        builder
            .build_blas(&[input(1), input(2)], FAST_TRACE | allow_update)
            .unwrap();
        let handle = builder.blas(1).unwrap().inner;

        builder
            .update_blas(1, &input(2), FAST_TRACE | allow_update)
            .unwrap();
        let submission = device.submissions().pop().unwrap();
        let Cmd::BuildAccelerationStructure(build) = &submission[0] else {
            panic!("expected a build, got {:?}", submission[0]);
        };
        assert_eq!(build.info.mode, vk::BuildAccelerationStructureModeKHR::UPDATE);
        assert_eq!(build.info.src, handle);
        assert_eq!(build.info.dst, handle);
        assert!(device.is_live(handle.as_raw()));

        assert!(matches!(
            builder.update_blas(1, &input(2), FAST_TRACE),
            Err(AccelerationError::UpdateWithoutAllowUpdate)
        ));
        assert!(matches!(
            builder.update_blas(2, &input(2), allow_update),
            Err(AccelerationError::BlasIndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            builder.blas_device_address(5),
            Err(AccelerationError::BlasIndexOutOfRange { index: 5, len: 2 })
        ));
    }
}
