use std::{collections::HashMap, sync::Arc};

use ash::vk::{self, AccessFlags2, PipelineStageFlags2};
use bytemuck::Zeroable;
use crevice::std140::AsStd140;
use gpu_allocator::MemoryLocation;
use ultraviolet::Mat4;

use crate::error::VulkanError;
use crate::render::shader_types::{self, CompressedVertex, InstanceData, ShadeMaterial};
use crate::scene::{LoadedImage, LoadedScene, Material, PrimitiveMesh};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command_buffer::{
    CmdPipelineBarrier, CmdUpdateBuffer, CommandBuffer, MemoryBarrier,
};
use crate::vulkan::device::GpuDevice;
use crate::vulkan::image::{Image, ImageView, Sampler, SamplerInfo, Texture};

/// Vertex and index buffers are read by the shaders through their addresses and by BLAS builds.
pub fn geometry_buffer_usage() -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::STORAGE_BUFFER
        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
        | vk::BufferUsageFlags::TRANSFER_DST
}

const SHADER_STAGES: PipelineStageFlags2 = PipelineStageFlags2::from_raw(
    PipelineStageFlags2::RAY_TRACING_SHADER_KHR.as_raw()
        | PipelineStageFlags2::COMPUTE_SHADER.as_raw()
        | PipelineStageFlags2::FRAGMENT_SHADER.as_raw(),
);

#[derive(Clone)]
pub struct PrimitiveBuffers {
    /// Shared between primitives that use the same vertex range
    pub vertices: Buffer<CompressedVertex>,
    pub indices: Buffer<u32>,
}

/// Everything of a scene that lives on the GPU, except for the acceleration structures.
pub struct SceneBuffers {
    /// Indexed by primitive mesh, `None` when the primitive had nothing to upload
    pub primitives: Vec<Option<PrimitiveBuffers>>,
    pub materials: Buffer<ShadeMaterial>,
    pub instance_data: Buffer<InstanceData>,
    pub lights: Buffer<shader_types::Light>,
    pub camera: Buffer<u8>,
    /// One slot per scene texture, or the single dummy texture
    pub textures: Vec<Texture>,
}

impl SceneBuffers {
    pub fn primitive(&self, index: usize) -> Option<&PrimitiveBuffers> {
        self.primitives.get(index).and_then(Option::as_ref)
    }

    /// Records an inline update of the camera uniform, fenced against shader reads on both sides.
    pub fn record_camera_update(
        &self,
        command_buffer: &mut CommandBuffer,
        camera: &shader_types::Camera,
    ) {
        command_buffer.add_cmd(CmdPipelineBarrier::memory(MemoryBarrier {
            src_stage_mask: SHADER_STAGES,
            src_access_mask: AccessFlags2::SHADER_READ,
            dst_stage_mask: PipelineStageFlags2::ALL_TRANSFER,
            dst_access_mask: AccessFlags2::TRANSFER_WRITE,
        }));
        command_buffer.add_cmd(CmdUpdateBuffer {
            dst_buffer: self.camera.get_vk_buffer(),
            dst_offset: 0,
            data: bytemuck::bytes_of(&camera.as_std140()).to_vec(),
        });
        command_buffer.add_cmd(CmdPipelineBarrier::memory(MemoryBarrier {
            src_stage_mask: PipelineStageFlags2::ALL_TRANSFER,
            src_access_mask: AccessFlags2::TRANSFER_WRITE,
            dst_stage_mask: SHADER_STAGES,
            dst_access_mask: AccessFlags2::SHADER_READ,
        }));
    }

    /// Blocking camera update.
    pub fn update_camera(&self, camera: &shader_types::Camera) -> Result<(), VulkanError> {
        let mut command_buffer = CommandBuffer::new(self.camera.device().clone());
        self.record_camera_update(&mut command_buffer, camera);
        command_buffer.submit_and_wait()
    }
}

/// Uploads a loaded scene. Everything is recorded into one command buffer and submitted once.
pub struct SceneUploader {
    device: Arc<dyn GpuDevice>,
    vertex_buffers: HashMap<(u32, u32), Buffer<CompressedVertex>>,
    image_views: HashMap<usize, Arc<ImageView>>,
    samplers: HashMap<SamplerInfo, Arc<Sampler>>,
    dummy_image_view: Option<Arc<ImageView>>,
}

impl SceneUploader {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            vertex_buffers: HashMap::new(),
            image_views: HashMap::new(),
            samplers: HashMap::new(),
            dummy_image_view: None,
        }
    }

    pub fn upload(mut self, scene: &LoadedScene) -> Result<SceneBuffers, VulkanError> {
        let mut command_buffer = CommandBuffer::new(self.device.clone());

        let primitives = scene
            .primitive_meshes
            .iter()
            .enumerate()
            .map(|(index, primitive)| {
                self.upload_primitive(&mut command_buffer, scene, index, primitive)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let instance_data = primitives
            .iter()
            .zip(&scene.primitive_meshes)
            .map(|(buffers, primitive)| instance_data(buffers.as_ref(), primitive))
            .collect::<Result<Vec<_>, _>>()?;
        let instance_data = Buffer::from_host_slice(
            &mut command_buffer,
            "instance data",
            &instance_data,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )?;

        let materials = Buffer::from_host_slice(
            &mut command_buffer,
            "materials",
            &shade_materials(&scene.materials, scene.textures.len()),
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )?;

        let mut lights: Vec<shader_types::Light> = scene.lights.iter().map(Into::into).collect();
        if lights.is_empty() {
            lights.push(shader_types::Light::zeroed());
        }
        let lights = Buffer::from_host_slice(
            &mut command_buffer,
            "lights",
            &lights,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        )?;

        let camera = Buffer::new(
            self.device.clone(),
            "camera",
            shader_types::Camera::std140_size_static() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        let textures = self.upload_textures(&mut command_buffer, scene)?;

        command_buffer.add_cmd(CmdPipelineBarrier::memory(MemoryBarrier {
            src_stage_mask: PipelineStageFlags2::ALL_TRANSFER,
            src_access_mask: AccessFlags2::TRANSFER_WRITE,
            dst_stage_mask: SHADER_STAGES | PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            dst_access_mask: AccessFlags2::SHADER_READ,
        }));

        let buffers = SceneBuffers {
            primitives,
            materials,
            instance_data,
            lights,
            camera,
            textures,
        };
        buffers.record_camera_update(
            &mut command_buffer,
            &shader_types::Camera {
                view_inverse: Mat4::identity(),
                proj_inverse: Mat4::identity(),
                focal_dist: 10.0,
                aperture: 0.0,
                nb_lights: scene.lights.len() as i32,
            },
        );

        command_buffer.submit_and_wait()?;
        log::info!(
            "Uploaded {} primitive meshes with {} distinct vertex buffers, {} textures, {} images",
            buffers.primitives.len(),
            self.vertex_buffers.len(),
            buffers.textures.len(),
            self.image_views.len()
        );
        Ok(buffers)
    }

    fn upload_primitive(
        &mut self,
        command_buffer: &mut CommandBuffer,
        scene: &LoadedScene,
        index: usize,
        primitive: &PrimitiveMesh,
    ) -> Result<Option<PrimitiveBuffers>, VulkanError> {
        if primitive.vertex_count == 0 || primitive.index_count == 0 {
            log::warn!(
                "Primitive mesh {} has {} vertices and {} indices, not uploading it",
                index,
                primitive.vertex_count,
                primitive.index_count
            );
            return Ok(None);
        }

        let key = (primitive.vertex_offset, primitive.vertex_count);
        let vertices = match self.vertex_buffers.get(&key) {
            Some(vertices) => vertices.clone(),
            None => {
                let vertices = Buffer::from_host_slice(
                    command_buffer,
                    &format!("vertices {}", index),
                    &compress_vertices(scene, primitive),
                    geometry_buffer_usage(),
                )?;
                self.vertex_buffers.insert(key, vertices.clone());
                vertices
            }
        };

        let indices = Buffer::from_host_slice(
            command_buffer,
            &format!("indices {}", index),
            scene.primitive_indices(primitive),
            geometry_buffer_usage(),
        )?;

        Ok(Some(PrimitiveBuffers { vertices, indices }))
    }

    fn upload_textures(
        &mut self,
        command_buffer: &mut CommandBuffer,
        scene: &LoadedScene,
    ) -> Result<Vec<Texture>, VulkanError> {
        if scene.textures.is_empty() {
            return Ok(vec![Texture {
                image_view: self.dummy_image_view(command_buffer)?,
                sampler: self.sampler(SamplerInfo::default())?,
            }]);
        }

        let mut textures = Vec::with_capacity(scene.textures.len());
        for (slot, texture) in scene.textures.iter().enumerate() {
            let image = texture
                .image
                .and_then(|image| Some((image, scene.images.get(image)?.as_ref()?)));

            let image_view = match image {
                Some((image_index, image)) => match self.image_views.get(&image_index) {
                    Some(image_view) => image_view.clone(),
                    None => {
                        let image_view = self.upload_image(
                            command_buffer,
                            &format!("image {}", image_index),
                            image,
                        )?;
                        self.image_views.insert(image_index, image_view.clone());
                        image_view
                    }
                },
                None => {
                    log::warn!(
                        "Texture {} has no usable image ({:?}), using the white texture",
                        slot,
                        texture.image
                    );
                    self.dummy_image_view(command_buffer)?
                }
            };

            textures.push(Texture {
                image_view,
                sampler: self.sampler(texture.sampler)?,
            });
        }
        Ok(textures)
    }

    fn dummy_image_view(
        &mut self,
        command_buffer: &mut CommandBuffer,
    ) -> Result<Arc<ImageView>, VulkanError> {
        if let Some(image_view) = &self.dummy_image_view {
            return Ok(image_view.clone());
        }
        let image_view = self.upload_image(command_buffer, "dummy", &LoadedImage::white())?;
        self.dummy_image_view = Some(image_view.clone());
        Ok(image_view)
    }

    fn upload_image(
        &self,
        command_buffer: &mut CommandBuffer,
        name: &str,
        loaded_image: &LoadedImage,
    ) -> Result<Arc<ImageView>, VulkanError> {
        let image = Image::new(
            self.device.clone(),
            name,
            vk::Extent2D {
                width: loaded_image.width,
                height: loaded_image.height,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )?;

        let image_data_buffer: Buffer<u8> = Buffer::new(
            self.device.clone(),
            "image staging",
            loaded_image.pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        image_data_buffer.copy_data(&loaded_image.pixels)?;
        image.copy_from_buffer_for_texture(command_buffer, &image_data_buffer);
        command_buffer.keep_alive(image_data_buffer.get_untyped().clone());

        Ok(Arc::new(ImageView::new_default(
            self.device.clone(),
            Arc::new(image),
        )?))
    }

    fn sampler(&mut self, info: SamplerInfo) -> Result<Arc<Sampler>, VulkanError> {
        if let Some(sampler) = self.samplers.get(&info) {
            return Ok(sampler.clone());
        }
        let sampler = Arc::new(Sampler::new(self.device.clone(), info)?);
        self.samplers.insert(info, sampler.clone());
        Ok(sampler)
    }
}

fn compress_vertices(scene: &LoadedScene, primitive: &PrimitiveMesh) -> Vec<CompressedVertex> {
    primitive
        .vertex_range()
        .map(|i| {
            CompressedVertex::new(
                scene.positions[i],
                scene.normals[i],
                scene.texcoords0[i],
                scene.tangents[i],
                scene.colors0[i],
            )
        })
        .collect()
}

fn instance_data(
    buffers: Option<&PrimitiveBuffers>,
    primitive: &PrimitiveMesh,
) -> Result<InstanceData, VulkanError> {
    let (index_address, vertex_address) = match buffers {
        Some(buffers) => (
            buffers.indices.get_device_address()?,
            buffers.vertices.get_device_address()?,
        ),
        None => (0, 0),
    };
    Ok(InstanceData {
        index_address,
        vertex_address,
        material_index: primitive.material_index as i32,
        _pad: 0,
    })
}

/// Converts materials for the shaders, texture indices outside of `[0, texture_count)` become -1.
pub fn shade_materials(materials: &[Material], texture_count: usize) -> Vec<ShadeMaterial> {
    materials
        .iter()
        .enumerate()
        .map(|(index, material)| {
            let mut material = material.clone();
            for texture in material.texture_indices_mut() {
                if *texture >= texture_count as i32 || *texture < -1 {
                    log::warn!(
                        "Material {} refers to texture {} but there are only {}",
                        index,
                        texture,
                        texture_count
                    );
                    *texture = -1;
                }
            }
            ShadeMaterial::from(&material)
        })
        .collect()
}
