use std::sync::Arc;

use ash::vk;

use crate::error::VulkanError;
use crate::scene_uploader::SceneBuffers;
use crate::vulkan::acceleration_structure::AccelerationStructure;
use crate::vulkan::descriptor_set::{
    DescriptorBinding, DescriptorPool, DescriptorSet, DescriptorSetLayout, WriteDescriptorSet,
};
use crate::vulkan::device::GpuDevice;

pub const CAMERA_BINDING: u32 = 0;
pub const MATERIALS_BINDING: u32 = 1;
pub const INSTANCE_DATA_BINDING: u32 = 2;
pub const LIGHTS_BINDING: u32 = 3;
pub const TEXTURES_BINDING: u32 = 4;

pub const TLAS_BINDING: u32 = 0;

pub fn scene_shader_stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::RAYGEN_KHR
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        | vk::ShaderStageFlags::ANY_HIT_KHR
        | vk::ShaderStageFlags::COMPUTE
        | vk::ShaderStageFlags::FRAGMENT
}

/// Layout of the scene set. The texture array is sized to exactly `texture_count` descriptors.
pub fn scene_bindings(texture_count: u32) -> Vec<DescriptorBinding> {
    let stages = scene_shader_stages();
    let binding = |binding, descriptor_type, count| DescriptorBinding {
        binding,
        descriptor_type,
        count,
        stages,
    };
    vec![
        binding(CAMERA_BINDING, vk::DescriptorType::UNIFORM_BUFFER, 1),
        binding(MATERIALS_BINDING, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(INSTANCE_DATA_BINDING, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(LIGHTS_BINDING, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(
            TEXTURES_BINDING,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            texture_count,
        ),
    ]
}

pub fn tlas_bindings() -> Vec<DescriptorBinding> {
    vec![DescriptorBinding {
        binding: TLAS_BINDING,
        descriptor_type: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        count: 1,
        stages: scene_shader_stages(),
    }]
}

/// Writes for every binding of the scene set.
pub fn scene_writes(buffers: &SceneBuffers) -> Vec<WriteDescriptorSet> {
    vec![
        WriteDescriptorSet::uniform_buffer(CAMERA_BINDING, &buffers.camera),
        WriteDescriptorSet::storage_buffer(MATERIALS_BINDING, &buffers.materials),
        WriteDescriptorSet::storage_buffer(INSTANCE_DATA_BINDING, &buffers.instance_data),
        WriteDescriptorSet::storage_buffer(LIGHTS_BINDING, &buffers.lights),
        WriteDescriptorSet::textures(TEXTURES_BINDING, &buffers.textures),
    ]
}

/// Descriptor sets handed to the pipelines: the scene resources and the TLAS.
pub struct DescriptorBinder {
    pub scene_set: DescriptorSet,
    pub tlas_set: DescriptorSet,
}

impl DescriptorBinder {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        buffers: &SceneBuffers,
        tlas: &AccelerationStructure,
    ) -> Result<Self, VulkanError> {
        let scene_set = create_set(
            device.clone(),
            scene_bindings(buffers.textures.len() as u32),
            scene_writes(buffers),
        )?;
        let tlas_set = create_set(
            device,
            tlas_bindings(),
            vec![WriteDescriptorSet::acceleration_structure(TLAS_BINDING, tlas)],
        )?;
        log::debug!(
            "Bound scene set with {} textures and the TLAS set",
            buffers.textures.len()
        );

        Ok(Self {
            scene_set,
            tlas_set,
        })
    }

    pub fn scene_layout(&self) -> vk::DescriptorSetLayout {
        self.scene_set.layout.inner
    }

    pub fn tlas_layout(&self) -> vk::DescriptorSetLayout {
        self.tlas_set.layout.inner
    }
}

fn create_set(
    device: Arc<dyn GpuDevice>,
    bindings: Vec<DescriptorBinding>,
    writes: Vec<WriteDescriptorSet>,
) -> Result<DescriptorSet, VulkanError> {
    let layout = Arc::new(DescriptorSetLayout::new(device.clone(), bindings)?);
    let pool = Arc::new(DescriptorPool::for_layout(device.clone(), &layout, 1)?);
    DescriptorSet::new(device, pool, layout, writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{cube_index_bytes, cube_vertices, load_raw};
    use crate::scene_uploader::SceneUploader;
    use crate::vulkan::descriptor_set::DescriptorInfo;
    use crate::vulkan::mock_device::MockDevice;

    fn cube_buffers(device: &Arc<MockDevice>) -> SceneBuffers {
        let scene = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();
        SceneUploader::new(device.clone()).upload(&scene).unwrap()
    }

    fn tlas(device: &Arc<MockDevice>) -> AccelerationStructure {
        AccelerationStructure::new(
            device.clone(),
            "tlas",
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            1024,
        )
        .unwrap()
    }

    #[test]
    fn every_binding_is_written() {
        let device = Arc::new(MockDevice::new());
        let buffers = cube_buffers(&device);
        let tlas = tlas(&device);

        let binder = DescriptorBinder::new(device.clone(), &buffers, &tlas).unwrap();

        let writes = device.descriptor_writes();
        assert_eq!(writes.len(), 2);
        let (scene_set, scene_writes) = &writes[0];
        assert_eq!(*scene_set, binder.scene_set.inner);
        assert_eq!(scene_writes.len(), 5);
        assert_eq!(
            scene_writes[0].info,
            DescriptorInfo::UniformBuffer(buffers.camera.get_vk_buffer())
        );
        // the dummy texture of a scene without textures
        assert_eq!(scene_writes[4].info.descriptor_count(), 1);

        let (tlas_set, tlas_writes) = &writes[1];
        assert_eq!(*tlas_set, binder.tlas_set.inner);
        assert_eq!(
            tlas_writes[0].info,
            DescriptorInfo::AccelerationStructures(vec![tlas.inner])
        );
        assert_ne!(binder.scene_layout(), binder.tlas_layout());

        drop(binder);
        drop(tlas);
        drop(buffers);
        assert_eq!(device.live_handle_count(), 0);
    }

    #[test]
    fn texture_undercount_fails_before_the_update() {
        let device = Arc::new(MockDevice::new());
        let buffers = cube_buffers(&device);

        let mut writes = scene_writes(&buffers);
        writes[4] = WriteDescriptorSet::textures(TEXTURES_BINDING, &[]);
        let result = create_set(device.clone(), scene_bindings(1), writes);
        assert!(matches!(
            result,
            Err(VulkanError::DescriptorCountMismatch {
                binding: TEXTURES_BINDING,
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(device.descriptor_writes().is_empty());
    }

    #[test]
    fn missing_bindings_fail() {
        let device = Arc::new(MockDevice::new());
        let buffers = cube_buffers(&device);

        let mut writes = scene_writes(&buffers);
        writes.remove(3);
        assert!(matches!(
            create_set(device.clone(), scene_bindings(1), writes),
            Err(VulkanError::MissingDescriptorWrite {
                binding: LIGHTS_BINDING
            })
        ));
    }

    #[test]
    fn scene_layout_matches_the_shaders() {
        let bindings = scene_bindings(7);
        let types: Vec<_> = bindings.iter().map(|b| b.descriptor_type).collect();
        assert_eq!(
            types,
            vec![
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ]
        );
        assert_eq!(bindings[4].count, 7);
        assert!(bindings
            .iter()
            .all(|b| b.stages.contains(vk::ShaderStageFlags::ANY_HIT_KHR)));
    }
}
