use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::{
    extensions::khr::{AccelerationStructure, BufferDeviceAddress, Synchronization2},
    vk::{self, ApplicationInfo, DeviceCreateInfo, DeviceQueueCreateInfo, Handle, InstanceCreateInfo},
};
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;

use crate::error::VulkanError;

use super::acceleration_structure::AccelerationGeometry;
use super::command_buffer::Cmd;
use super::descriptor_set::{DescriptorBinding, DescriptorInfo, WriteDescriptorSet};
use super::device::{BufferCreateInfo, GpuDevice, ImageCreateInfo};
use super::image::SamplerInfo;

pub struct ContextDesc {
    pub application_name: String,
    pub enable_validation: bool,
}

impl Default for ContextDesc {
    fn default() -> Self {
        Self {
            application_name: "round-cat-rt".to_string(),
            enable_validation: false,
        }
    }
}

/// Headless Vulkan device with everything hardware ray tracing needs.
pub struct Context {
    _entry: ash::Entry,
    pub instance: ash::Instance,

    pub context_raytracing: ContextRaytracing,
    pub synchronisation2_loader: Synchronization2,

    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,

    pub device: ash::Device,
    pub queue: vk::Queue,

    pub buffer_device_address: BufferDeviceAddress,

    allocator: ManuallyDrop<Mutex<Allocator>>,
    // keyed by the raw buffer or image handle
    allocations: Mutex<HashMap<u64, Allocation>>,
    command_pool: Mutex<vk::CommandPool>,
    owns_device: bool,
}

pub struct ContextRaytracing {
    pub acceleration_structure: AccelerationStructure,
    pub physical_device_acceleration_structure_properties_khr:
        vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
}

// SAFETY: the properties struct is only read; its `p_next` is null after `get_properties`.
unsafe impl Send for ContextRaytracing {}
unsafe impl Sync for ContextRaytracing {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Context {
    pub fn new(desc: &ContextDesc) -> Result<Self, VulkanError> {
        let entry = unsafe { ash::Entry::load() }?;

        let instance = {
            let application_name =
                CString::new(desc.application_name.as_str()).unwrap_or_default();
            let app_info = ApplicationInfo::builder()
                .application_name(&application_name)
                .api_version(vk::API_VERSION_1_3);

            let validation_layer = unsafe {
                CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0")
            };
            let layers = if desc.enable_validation {
                vec![validation_layer.as_ptr()]
            } else {
                vec![]
            };

            let create_info = InstanceCreateInfo::builder()
                .application_info(&app_info)
                .enabled_layer_names(&layers);
            unsafe { entry.create_instance(&create_info, None) }?
        };

        let (physical_device, queue_family_index) = match find_physical_device(&instance) {
            Ok(found) => found,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(err);
            }
        };

        let device = match create_logical_device(&instance, physical_device, queue_family_index)
        {
            Ok(device) => device,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(err);
            }
        };

        Self::create(entry, instance, physical_device, device, queue_family_index, true)
    }

    /// Wraps a device created by the surrounding application. The device and instance stay owned by the caller,
    /// they must have the ray tracing extensions and features enabled.
    pub fn from_raw_handles(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
    ) -> Result<Self, VulkanError> {
        Self::create(entry, instance, physical_device, device, queue_family_index, false)
    }

    fn create(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        owns_device: bool,
    ) -> Result<Self, VulkanError> {
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let synchronisation2_loader = Synchronization2::new(&instance, &device);

        let acceleration_structure = AccelerationStructure::new(&instance, &device);
        let physical_device_acceleration_structure_properties_khr =
            unsafe { AccelerationStructure::get_properties(&instance, physical_device) };

        let buffer_device_address = BufferDeviceAddress::new(&instance, &device);

        let context_raytracing = ContextRaytracing {
            acceleration_structure,
            physical_device_acceleration_structure_properties_khr,
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        let command_pool = {
            let create_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(queue_family_index)
                .flags(
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                        | vk::CommandPoolCreateFlags::TRANSIENT,
                );
            unsafe { device.create_command_pool(&create_info, None) }?
        };

        Ok(Self {
            _entry: entry,
            instance,

            context_raytracing,
            synchronisation2_loader,

            physical_device,
            queue_family_index,

            device,
            queue,
            buffer_device_address,

            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            allocations: Mutex::new(HashMap::new()),
            command_pool: Mutex::new(command_pool),
            owns_device,
        })
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, VulkanError> {
        let allocation = lock(&*self.allocator).allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    fn free(&self, handle: u64) {
        if let Some(allocation) = lock(&self.allocations).remove(&handle) {
            if let Err(err) = lock(&*self.allocator).free(allocation) {
                log::error!("Could not free allocation: {}", err);
            }
        }
    }
}

impl GpuDevice for Context {
    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer, VulkanError> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(info.size)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&create_info, None) }?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(info.name, requirements, info.location, true) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        lock(&self.allocations).insert(buffer.as_raw(), allocation);
        if let Err(err) = bound {
            self.destroy_buffer(buffer);
            return Err(err.into());
        }

        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
        self.free(buffer.as_raw());
    }

    fn write_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<(), VulkanError> {
        let mut allocations = lock(&self.allocations);
        let mapped = allocations
            .get_mut(&buffer.as_raw())
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or(VulkanError::NotHostVisible(buffer))?;

        let start = offset as usize;
        let end = start + data.len();
        if end > mapped.len() {
            return Err(VulkanError::BufferOverflow {
                offset,
                size: data.len() as u64,
                capacity: mapped.len() as u64,
            });
        }
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    fn get_buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
        unsafe { self.buffer_device_address.get_buffer_device_address(&info) }
    }

    fn get_acceleration_structure_build_sizes(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        flags: vk::BuildAccelerationStructureFlagsKHR,
        geometry: &AccelerationGeometry,
    ) -> Result<vk::AccelerationStructureBuildSizesInfoKHR, VulkanError> {
        let (vk_geometry, _) = geometry.to_vk();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(ty)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&vk_geometry));

        let sizes = unsafe {
            self.context_raytracing
                .acceleration_structure
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &[geometry.primitive_count()],
                )
        };
        Ok(sizes)
    }

    fn create_acceleration_structure(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<vk::AccelerationStructureKHR, VulkanError> {
        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(buffer)
            .size(size)
            .ty(ty);

        let acceleration_structure = unsafe {
            self.context_raytracing
                .acceleration_structure
                .create_acceleration_structure(&create_info, None)
        }?;
        Ok(acceleration_structure)
    }

    fn destroy_acceleration_structure(&self, acceleration_structure: vk::AccelerationStructureKHR) {
        unsafe {
            self.context_raytracing
                .acceleration_structure
                .destroy_acceleration_structure(acceleration_structure, None)
        }
    }

    fn get_acceleration_structure_device_address(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> vk::DeviceAddress {
        let info = vk::AccelerationStructureDeviceAddressInfoKHR::builder()
            .acceleration_structure(acceleration_structure);
        unsafe {
            self.context_raytracing
                .acceleration_structure
                .get_acceleration_structure_device_address(&info)
        }
    }

    fn min_acceleration_structure_scratch_offset_alignment(&self) -> u32 {
        self.context_raytracing
            .physical_device_acceleration_structure_properties_khr
            .min_acceleration_structure_scratch_offset_alignment
    }

    fn create_query_pool(
        &self,
        query_type: vk::QueryType,
        query_count: u32,
    ) -> Result<vk::QueryPool, VulkanError> {
        let create_info = vk::QueryPoolCreateInfo::builder()
            .query_type(query_type)
            .query_count(query_count);
        Ok(unsafe { self.device.create_query_pool(&create_info, None) }?)
    }

    fn destroy_query_pool(&self, query_pool: vk::QueryPool) {
        unsafe { self.device.destroy_query_pool(query_pool, None) }
    }

    fn get_query_pool_results(
        &self,
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) -> Result<Vec<u64>, VulkanError> {
        let mut results = vec![0u64; query_count as usize];
        unsafe {
            self.device.get_query_pool_results(
                query_pool,
                first_query,
                query_count,
                &mut results,
                vk::QueryResultFlags::WAIT | vk::QueryResultFlags::TYPE_64,
            )
        }?;
        Ok(results)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image, VulkanError> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(info.name, requirements, MemoryLocation::GpuOnly, false)
        {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        lock(&self.allocations).insert(image.as_raw(), allocation);
        if let Err(err) = bound {
            self.destroy_image(image);
            return Err(err.into());
        }

        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
        self.free(image.as_raw());
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> Result<vk::ImageView, VulkanError> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image(image);

        Ok(unsafe { self.device.create_image_view(&create_info, None) }?)
    }

    fn destroy_image_view(&self, image_view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(image_view, None) }
    }

    fn create_sampler(&self, info: &SamplerInfo) -> Result<vk::Sampler, VulkanError> {
        let create_info = vk::SamplerCreateInfo::builder()
            .min_filter(info.min_filter)
            .mag_filter(info.mag_filter)
            .mipmap_mode(info.mipmap_mode)
            .address_mode_u(info.address_mode_u)
            .address_mode_v(info.address_mode_v)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);

        Ok(unsafe { self.device.create_sampler(&create_info, None) }?)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        let bindings: Vec<_> = bindings.iter().map(DescriptorBinding::to_vk).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        Ok(unsafe { self.device.create_descriptor_set_layout(&create_info, None) }?)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        bindings: &[DescriptorBinding],
        max_sets: u32,
    ) -> Result<vk::DescriptorPool, VulkanError> {
        let mut counts: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for binding in bindings {
            *counts.entry(binding.descriptor_type).or_default() += binding.count * max_sets;
        }
        let pool_sizes: Vec<_> = counts
            .into_iter()
            .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count,
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);

        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None) }?)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));

        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }?;
        sets.into_iter()
            .next()
            .ok_or(VulkanError::Vk(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[WriteDescriptorSet]) {
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
            .iter()
            .map(|write| match &write.info {
                DescriptorInfo::UniformBuffer(buffer) | DescriptorInfo::StorageBuffer(buffer) => {
                    vk::DescriptorBufferInfo {
                        buffer: *buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    }
                }
                _ => vk::DescriptorBufferInfo::default(),
            })
            .collect();

        let image_infos: Vec<Vec<vk::DescriptorImageInfo>> = writes
            .iter()
            .map(|write| match &write.info {
                DescriptorInfo::CombinedImageSamplers(images) => images
                    .iter()
                    .map(|(image_view, sampler)| vk::DescriptorImageInfo {
                        sampler: *sampler,
                        image_view: *image_view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    })
                    .collect(),
                _ => vec![],
            })
            .collect();

        let mut acceleration_structure_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> =
            writes
                .iter()
                .map(|write| match &write.info {
                    DescriptorInfo::AccelerationStructures(structures) => {
                        vk::WriteDescriptorSetAccelerationStructureKHR::builder()
                            .acceleration_structures(structures)
                            .build()
                    }
                    _ => vk::WriteDescriptorSetAccelerationStructureKHR::default(),
                })
                .collect();

        let write_descriptor_sets: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(acceleration_structure_infos.iter_mut())
            .enumerate()
            .map(|(index, (write, acceleration_structure_info))| {
                let mut vk_write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.info.descriptor_type());

                match &write.info {
                    DescriptorInfo::UniformBuffer(_) | DescriptorInfo::StorageBuffer(_) => {
                        vk_write = vk_write.buffer_info(std::slice::from_ref(&buffer_infos[index]))
                    }
                    DescriptorInfo::CombinedImageSamplers(_) => {
                        vk_write = vk_write.image_info(&image_infos[index])
                    }
                    DescriptorInfo::AccelerationStructures(structures) => {
                        vk_write = vk_write.push_next(acceleration_structure_info);
                        vk_write.descriptor_count = structures.len() as u32;
                    }
                }
                vk_write.build()
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&write_descriptor_sets, &[]) };
    }

    fn submit_and_wait(&self, commands: &[Cmd]) -> Result<(), VulkanError> {
        let command_pool = lock(&self.command_pool);

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(1)
            .command_pool(*command_pool)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&allocate_info) }?
            .into_iter()
            .next()
            .ok_or(VulkanError::Vk(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))?;

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }?;
            for command in commands {
                command.execute(command_buffer, self);
            }
            unsafe { self.device.end_command_buffer(command_buffer) }?;

            let fence = unsafe {
                self.device
                    .create_fence(&vk::FenceCreateInfo::builder(), None)
            }?;
            let submit_info = vk::SubmitInfo::builder()
                .command_buffers(std::slice::from_ref(&command_buffer));
            let submitted = unsafe {
                self.device
                    .queue_submit(self.queue, std::slice::from_ref(&submit_info), fence)
            }
            // A hung GPU never signals, there is no recovery from that
            .and_then(|_| unsafe {
                self.device
                    .wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)
            });
            unsafe { self.device.destroy_fence(fence, None) };
            submitted.map_err(VulkanError::from)
        })();

        unsafe {
            self.device
                .free_command_buffers(*command_pool, std::slice::from_ref(&command_buffer))
        };
        result
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device
                .destroy_command_pool(*lock(&self.command_pool), None);
        }

        let leaked: Vec<_> = lock(&self.allocations).drain().collect();
        if !leaked.is_empty() {
            log::warn!("{} allocations were still alive at shutdown", leaked.len());
        }
        for (_, allocation) in leaked {
            let _ = lock(&*self.allocator).free(allocation);
        }
        // The allocator has to go before the device
        unsafe { ManuallyDrop::drop(&mut self.allocator) };

        if self.owns_device {
            unsafe { self.device.destroy_device(None) };
            unsafe { self.instance.destroy_instance(None) };
        }
    }
}

fn required_device_extensions() -> [&'static CStr; 5] {
    [
        ash::extensions::khr::Synchronization2::name(),
        ash::extensions::khr::AccelerationStructure::name(),
        ash::extensions::khr::RayTracingPipeline::name(),
        ash::extensions::khr::DeferredHostOperations::name(),
        ash::extensions::khr::BufferDeviceAddress::name(),
    ]
}

fn find_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32), VulkanError> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }?;

    physical_devices
        .into_iter()
        .filter(|pd| {
            let Ok(extension_properties) =
                (unsafe { instance.enumerate_device_extension_properties(*pd) })
            else {
                return false;
            };
            let supported_extensions: Vec<_> = extension_properties
                .iter()
                .map(|property| unsafe { CStr::from_ptr(property.extension_name.as_ptr()) })
                .collect();

            required_device_extensions()
                .iter()
                .all(|required| supported_extensions.contains(required))
        })
        .filter_map(|pd| {
            unsafe { instance.get_physical_device_queue_family_properties(pd) }
                .iter()
                .position(|info| {
                    info.queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                })
                .map(|i| (pd, i as u32))
        })
        .min_by_key(|(pd, _)| {
            let device_type = unsafe { instance.get_physical_device_properties(*pd) }.device_type;

            match device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 3,
                vk::PhysicalDeviceType::OTHER => 4,
                _ => 5,
            }
        })
        .ok_or(VulkanError::NoSuitableDevice)
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
) -> Result<ash::Device, VulkanError> {
    let device_extensions = required_device_extensions().map(|name| name.as_ptr());

    let queue_priorities = [1.0];
    let queue_create_info = DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities);

    let mut physical_device_vulkan13_features = vk::PhysicalDeviceVulkan13Features {
        synchronization2: vk::TRUE,
        ..vk::PhysicalDeviceVulkan13Features::default()
    };

    let mut enabled_buffer_device_address_features =
        vk::PhysicalDeviceBufferDeviceAddressFeatures {
            buffer_device_address: vk::TRUE,
            ..vk::PhysicalDeviceBufferDeviceAddressFeatures::default()
        };

    let mut enabled_ray_tracing_pipeline_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR {
            ray_tracing_pipeline: vk::TRUE,
            ..vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
        };

    let mut enabled_acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
            acceleration_structure: vk::TRUE,
            ..vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
        };

    let create_info = DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&device_extensions)
        .push_next(&mut physical_device_vulkan13_features)
        .push_next(&mut enabled_buffer_device_address_features)
        .push_next(&mut enabled_ray_tracing_pipeline_features)
        .push_next(&mut enabled_acceleration_structure_features);

    Ok(unsafe { instance.create_device(physical_device, &create_info, None) }?)
}
