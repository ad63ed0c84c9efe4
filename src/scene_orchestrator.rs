use std::path::Path;
use std::sync::Arc;

use ash::vk;
use ultraviolet::{Mat4, Vec3};

use crate::acceleration::{
    blas_build_flags, instances_from_nodes, scene_blas_inputs, tlas_build_flags,
    AccelerationBuilder, GpuInstance,
};
use crate::config_loader::Config;
use crate::descriptor_binder::DescriptorBinder;
use crate::error::{AccelerationError, SceneError};
use crate::loader::{self, PosNormalTangentTexcoordVertexRaw};
use crate::render::shader_types;
use crate::scene::{LoadedScene, SceneDimensions};
use crate::scene_uploader::{PrimitiveBuffers, SceneBuffers, SceneUploader};
use crate::vulkan::device::GpuDevice;

/// A scene that is ready to be ray traced: uploaded, with BLAS, TLAS and descriptor sets.
// Rust will drop these fields in the order they are declared
pub struct RayTracingScene {
    descriptors: DescriptorBinder,
    acceleration: AccelerationBuilder,
    buffers: SceneBuffers,

    /// Primitive mesh to BLAS index, `None` for skipped primitives
    primitive_to_blas: Vec<Option<usize>>,
    scene: LoadedScene,
    config: Config,
    device: Arc<dyn GpuDevice>,
}

impl RayTracingScene {
    pub fn load_gltf(
        device: Arc<dyn GpuDevice>,
        path: impl AsRef<Path>,
        config: &Config,
    ) -> Result<Self, SceneError> {
        let scene = loader::load_gltf(path)?;
        Self::from_loaded(device, scene, config)
    }

    pub fn load_raw(
        device: Arc<dyn GpuDevice>,
        vertices: &[PosNormalTangentTexcoordVertexRaw],
        index_bytes: &[u8],
        index_width: usize,
        config: &Config,
    ) -> Result<Self, SceneError> {
        let scene = loader::load_raw(vertices, index_bytes, index_width)?;
        Self::from_loaded(device, scene, config)
    }

    pub fn from_loaded(
        device: Arc<dyn GpuDevice>,
        scene: LoadedScene,
        config: &Config,
    ) -> Result<Self, SceneError> {
        scene.validate()?;
        let buffers = SceneUploader::new(device.clone()).upload(&scene)?;

        let (inputs, primitive_to_blas) =
            scene_blas_inputs(&scene, &buffers, config.missing_buffer_policy)?;
        let mut acceleration = AccelerationBuilder::new(device.clone(), &config.acceleration);
        let report = acceleration.build_blas(&inputs, blas_build_flags(&config.acceleration))?;

        let instances = scene_instances(&scene, &acceleration, &primitive_to_blas)?;
        acceleration.build_tlas(&instances, tlas_build_flags(&config.acceleration), false)?;
        let tlas = acceleration.tlas().ok_or(AccelerationError::TlasNotBuilt)?;

        let descriptors = DescriptorBinder::new(device.clone(), &buffers, tlas)?;

        log::info!(
            "Scene ready: {} primitive meshes, {} BLAS in {} batches ({} bytes), {} instances",
            scene.primitive_meshes.len(),
            acceleration.blas_count(),
            report.batches,
            report.compacted_size,
            instances.len()
        );

        Ok(Self {
            descriptors,
            acceleration,
            buffers,
            primitive_to_blas,
            scene,
            config: config.clone(),
            device,
        })
    }

    /// Writes the camera uniform, the shaders get the inverse matrices.
    pub fn update_camera(&self, view: Mat4, projection: Mat4) -> Result<(), SceneError> {
        let camera = shader_types::Camera {
            view_inverse: view.inversed(),
            proj_inverse: projection.inversed(),
            focal_dist: self.config.camera.focal_distance,
            aperture: self.config.camera.aperture,
            nb_lights: self.scene.lights.len() as i32,
        };
        self.buffers.update_camera(&camera)?;
        Ok(())
    }

    /// Points the camera at the whole scene from the front, with the configured projection.
    pub fn look_at_scene(&self, aspect_ratio: f32) -> Result<(), SceneError> {
        let dimensions = &self.scene.dimensions;
        let eye = dimensions.center + Vec3::new(0.0, 0.0, dimensions.radius * 2.0 + 1.0);
        let view = Mat4::look_at(eye, dimensions.center, Vec3::unit_y());
        self.update_camera(view, self.config.camera.projection_matrix(aspect_ratio))
    }

    /// Moves the nodes and refits the TLAS. There has to be one matrix per node.
    pub fn update_node_transforms(&mut self, world_matrices: &[Mat4]) -> Result<(), SceneError> {
        if world_matrices.len() != self.scene.nodes.len() {
            return Err(SceneError::NodeCountMismatch {
                expected: self.scene.nodes.len(),
                actual: world_matrices.len(),
            });
        }
        if !self.config.acceleration.allow_tlas_update {
            return Err(AccelerationError::UpdateWithoutAllowUpdate.into());
        }

        let previous: Vec<Mat4> = self.scene.nodes.iter().map(|n| n.world_matrix).collect();
        for (node, world_matrix) in self.scene.nodes.iter_mut().zip(world_matrices) {
            node.world_matrix = *world_matrix;
        }

        let result = scene_instances(&self.scene, &self.acceleration, &self.primitive_to_blas)
            .and_then(|instances| {
                self.acceleration.build_tlas(
                    &instances,
                    tlas_build_flags(&self.config.acceleration),
                    true,
                )
            });
        if let Err(err) = result {
            for (node, world_matrix) in self.scene.nodes.iter_mut().zip(previous) {
                node.world_matrix = world_matrix;
            }
            return Err(err.into());
        }
        Ok(())
    }

    pub fn scene(&self) -> &LoadedScene {
        &self.scene
    }

    pub fn dimensions(&self) -> &SceneDimensions {
        &self.scene.dimensions
    }

    pub fn buffers(&self) -> &SceneBuffers {
        &self.buffers
    }

    pub fn primitive_buffers(&self, primitive: usize) -> Option<&PrimitiveBuffers> {
        self.buffers.primitive(primitive)
    }

    pub fn primitive_to_blas(&self) -> &[Option<usize>] {
        &self.primitive_to_blas
    }

    pub fn blas_count(&self) -> usize {
        self.acceleration.blas_count()
    }

    pub fn blas_device_address(&self, index: usize) -> Result<vk::DeviceAddress, SceneError> {
        Ok(self.acceleration.blas_device_address(index)?)
    }

    pub fn tlas(&self) -> Option<vk::AccelerationStructureKHR> {
        self.acceleration.tlas().map(|tlas| tlas.inner)
    }

    pub fn tlas_device_address(&self) -> Result<vk::DeviceAddress, SceneError> {
        Ok(self.acceleration.tlas_device_address()?)
    }

    pub fn scene_descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptors.scene_set.inner
    }

    pub fn scene_descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptors.scene_layout()
    }

    pub fn tlas_descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptors.tlas_set.inner
    }

    pub fn tlas_descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptors.tlas_layout()
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }
}

fn scene_instances(
    scene: &LoadedScene,
    acceleration: &AccelerationBuilder,
    primitive_to_blas: &[Option<usize>],
) -> Result<Vec<GpuInstance>, AccelerationError> {
    let addresses = primitive_to_blas
        .iter()
        .map(|blas| {
            blas.map(|index| acceleration.blas_device_address(index))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(instances_from_nodes(scene, &addresses))
}
