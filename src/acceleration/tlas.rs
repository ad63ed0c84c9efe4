use ash::vk::{self, AccessFlags2, PipelineStageFlags2};

use crate::error::AccelerationError;
use crate::vulkan::acceleration_structure::{
    AccelerationBuildInfo, AccelerationGeometry, AccelerationStructure,
};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_buffer::{
    CmdBuildAccelerationStructure, CmdPipelineBarrier, CommandBuffer, MemoryBarrier,
};

use super::blas::ScratchBuffer;
use super::{AccelerationBuilder, GpuInstance};

impl AccelerationBuilder {
    /// Builds the top level structure over `instances`, or refits it when `update` is set.
    ///
    /// A second build without `update` is refused, and updates must pass as many instances as
    /// the first build did.
    pub fn build_tlas(
        &mut self,
        instances: &[GpuInstance],
        flags: vk::BuildAccelerationStructureFlagsKHR,
        update: bool,
    ) -> Result<(), AccelerationError> {
        match (&self.tlas, update) {
            (Some(_), false) => return Err(AccelerationError::TlasAlreadyBuilt),
            (_, true) if !flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE) => {
                return Err(AccelerationError::UpdateWithoutAllowUpdate)
            }
            (None, true) => return Err(AccelerationError::TlasNotBuilt),
            (Some(_), true) if instances.len() != self.tlas_instance_count => {
                return Err(AccelerationError::InstanceCountMismatch {
                    expected: self.tlas_instance_count,
                    actual: instances.len(),
                })
            }
            _ => {}
        }

        let mut command_buffer = CommandBuffer::new(self.device.clone());
        let instance_buffer = Buffer::from_host_slice(
            &mut command_buffer,
            "tlas instances",
            instances,
            vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
        )?;
        // the build reads what the copy wrote
        command_buffer.add_cmd(CmdPipelineBarrier::memory(MemoryBarrier {
            src_stage_mask: PipelineStageFlags2::ALL_TRANSFER,
            src_access_mask: AccessFlags2::TRANSFER_WRITE,
            dst_stage_mask: PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            dst_access_mask: AccessFlags2::SHADER_READ
                | AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                | AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        }));

        let geometry = AccelerationGeometry::Instances {
            data_address: instance_buffer.get_device_address()?,
            instance_count: instances.len() as u32,
        };
        let sizes = self.device.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            flags,
            &geometry,
        )?;

        let new_tlas = match &self.tlas {
            Some(_) => None,
            None => Some(AccelerationStructure::new(
                self.device.clone(),
                "tlas",
                vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                sizes.acceleration_structure_size,
            )?),
        };
        let (src, dst) = match (&self.tlas, &new_tlas) {
            (Some(tlas), _) => (tlas.inner, tlas.inner),
            (None, Some(tlas)) => (vk::AccelerationStructureKHR::null(), tlas.inner),
            (None, None) => return Err(AccelerationError::TlasNotBuilt),
        };

        let scratch = ScratchBuffer::new(
            self.device.clone(),
            if update {
                sizes.update_scratch_size
            } else {
                sizes.build_scratch_size
            },
        )?;

        command_buffer.add_cmd(CmdBuildAccelerationStructure {
            info: AccelerationBuildInfo {
                ty: vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                flags,
                mode: if update {
                    vk::BuildAccelerationStructureModeKHR::UPDATE
                } else {
                    vk::BuildAccelerationStructureModeKHR::BUILD
                },
                src,
                dst,
                geometry,
                scratch_address: scratch.address,
            },
        });
        command_buffer.submit_and_wait()?;
        log::debug!(
            "TLAS {} with {} instances",
            if update { "updated" } else { "built" },
            instances.len()
        );

        if new_tlas.is_some() {
            self.tlas = new_tlas;
            self.tlas_instance_count = instances.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ash::vk::Handle;
    use ultraviolet::Mat4;

    use super::*;
    use crate::config_loader::AccelerationConfig;
    use crate::error::VulkanError;
    use crate::vulkan::command_buffer::Cmd;
    use crate::vulkan::mock_device::MockDevice;

    const ALLOW_UPDATE: vk::BuildAccelerationStructureFlagsKHR =
        vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;

    fn instances(count: usize) -> Vec<GpuInstance> {
        (0..count)
            .map(|i| {
                GpuInstance::new(
                    &Mat4::identity(),
                    i as u32,
                    0xFF,
                    0,
                    vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE,
                    0x1000,
                )
            })
            .collect()
    }

    fn builder(device: &Arc<MockDevice>) -> AccelerationBuilder {
        AccelerationBuilder::new(device.clone(), &AccelerationConfig::default())
    }

    #[test]
    fn tlas_is_built_once() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device);
        assert!(matches!(
            builder.tlas_device_address(),
            Err(AccelerationError::TlasNotBuilt)
        ));

        builder.build_tlas(&instances(3), ALLOW_UPDATE, false).unwrap();
        let tlas = builder.tlas().unwrap();
        let mock = device.acceleration_structure(tlas.inner).unwrap();
        assert_eq!(mock.ty, vk::AccelerationStructureTypeKHR::TOP_LEVEL);
        assert_eq!(builder.tlas_device_address().unwrap(), tlas.device_address);

        // the instances arrive on the device in order
        let submissions = device.submissions();
        let submission = &submissions[0];
        let Cmd::CopyBuffer(copy) = &submission[0] else {
            panic!("expected the instance upload, got {:?}", submission[0]);
        };
        let uploaded = device.buffer(copy.dst_buffer).unwrap();
        assert_eq!(uploaded.data, bytemuck::cast_slice::<GpuInstance, u8>(&instances(3)));
        assert!(matches!(submission[1], Cmd::PipelineBarrier(_)));
        assert!(matches!(submission[2], Cmd::BuildAccelerationStructure(_)));

        assert!(matches!(
            builder.build_tlas(&instances(3), ALLOW_UPDATE, false),
            Err(AccelerationError::TlasAlreadyBuilt)
        ));
        // the tlas and its buffer
        assert_eq!(device.live_handle_count(), 2);
    }

    #[test]
    fn updates_keep_the_structure() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device);
        builder.build_tlas(&instances(2), ALLOW_UPDATE, false).unwrap();
        let handle = builder.tlas().unwrap().inner;

        builder.build_tlas(&instances(2), ALLOW_UPDATE, true).unwrap();
        assert_eq!(builder.tlas().unwrap().inner, handle);
        assert!(device.is_live(handle.as_raw()));

        let submission = device.submissions().pop().unwrap();
        let build = submission
            .iter()
            .find_map(|cmd| match cmd {
                Cmd::BuildAccelerationStructure(build) => Some(build.info),
                _ => None,
            })
            .unwrap();
        assert_eq!(build.mode, vk::BuildAccelerationStructureModeKHR::UPDATE);
        assert_eq!(build.src, handle);
        assert_eq!(build.dst, handle);
        assert_eq!(device.live_handle_count(), 2);
    }

    #[test]
    fn updates_keep_the_instance_count() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device);
        builder.build_tlas(&instances(1), ALLOW_UPDATE, false).unwrap();

        for count in [0, 5] {
            assert!(matches!(
                builder.build_tlas(&instances(count), ALLOW_UPDATE, true),
                Err(AccelerationError::InstanceCountMismatch {
                    expected: 1,
                    actual
                }) if actual == count
            ));
        }
        assert_eq!(device.submissions().len(), 1);
        builder.build_tlas(&instances(1), ALLOW_UPDATE, true).unwrap();
    }

    #[test]
    fn instance_upload_is_visible_to_the_build() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device);
        builder.build_tlas(&instances(2), ALLOW_UPDATE, false).unwrap();

        let submissions = device.submissions();
        let Cmd::PipelineBarrier(barrier) = &submissions[0][1] else {
            panic!("expected a barrier, got {:?}", submissions[0][1]);
        };
        let memory = barrier.memory_barriers[0];
        assert_eq!(memory.src_access_mask, AccessFlags2::TRANSFER_WRITE);
        assert_eq!(
            memory.dst_stage_mask,
            PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
        );
        assert!(memory.dst_access_mask.contains(AccessFlags2::SHADER_READ));
    }

    #[test]
    fn updates_need_a_tlas_and_the_flag() {
        let device = Arc::new(MockDevice::new());
        let mut builder = builder(&device);
        assert!(matches!(
            builder.build_tlas(&instances(1), ALLOW_UPDATE, true),
            Err(AccelerationError::TlasNotBuilt)
        ));

        builder
            .build_tlas(
                &instances(1),
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
                false,
            )
            .unwrap();
        assert!(matches!(
            builder.build_tlas(
                &instances(1),
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
                true
            ),
            Err(AccelerationError::UpdateWithoutAllowUpdate)
        ));
        assert!(device
            .submissions()
            .iter()
            .all(|submission| submission.len() == 3));
    }

    #[test]
    fn failed_first_build_keeps_nothing() {
        let device = Arc::new(MockDevice::new());
        device.fail_submissions(true);
        let mut builder = builder(&device);

        assert!(matches!(
            builder.build_tlas(&instances(2), ALLOW_UPDATE, false),
            Err(AccelerationError::Vulkan(VulkanError::Vk(
                vk::Result::ERROR_DEVICE_LOST
            )))
        ));
        assert!(builder.tlas().is_none());
        assert_eq!(device.live_handle_count(), 0);
    }
}
