use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VulkanError {
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
    #[error("could not load the vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),
    #[error("no physical device supports ray tracing")]
    NoSuitableDevice,
    #[error("buffer {0:?} was created without SHADER_DEVICE_ADDRESS usage")]
    MissingDeviceAddressUsage(vk::Buffer),
    #[error("buffer {0:?} is not host visible")]
    NotHostVisible(vk::Buffer),
    #[error("write of {size} bytes at offset {offset} overflows buffer of {capacity} bytes")]
    BufferOverflow {
        offset: u64,
        size: u64,
        capacity: u64,
    },
    #[error("descriptor binding {binding} has no write")]
    MissingDescriptorWrite { binding: u32 },
    #[error("descriptor binding {binding} expects {expected} descriptors of type {expected_type:?}, got {actual} of type {actual_type:?}")]
    DescriptorCountMismatch {
        binding: u32,
        expected: u32,
        expected_type: vk::DescriptorType,
        actual: u32,
        actual_type: vk::DescriptorType,
    },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("gltf import failed: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("unsupported index width of {0} bytes")]
    UnsupportedIndexWidth(usize),
    #[error("the file contains no scene")]
    NoScene,
    #[error("primitive has no POSITION attribute")]
    MissingPositions,
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("malformed raw geometry: {0}")]
    InvalidRawData(String),
    #[error("{attribute} has {actual} entries, expected one per position ({expected})")]
    AttributeCountMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("primitive mesh {primitive} reaches past the scene arrays")]
    PrimitiveOutOfRange { primitive: usize },
    #[error("node {node} refers to primitive mesh {primitive_mesh}, which does not exist")]
    NodeOutOfRange { node: usize, primitive_mesh: usize },
}

#[derive(Error, Debug)]
pub enum AccelerationError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error("{requested} of {total} inputs request compaction, mixing is not allowed")]
    MixedCompaction { requested: usize, total: usize },
    #[error("top level structure already exists, only updates are allowed")]
    TlasAlreadyBuilt,
    #[error("update requested without ALLOW_UPDATE in the build flags")]
    UpdateWithoutAllowUpdate,
    #[error("top level structure has not been built")]
    TlasNotBuilt,
    #[error("update with {actual} instances, the top level structure was built with {expected}")]
    InstanceCountMismatch { expected: usize, actual: usize },
    #[error("bottom level structure {index} is out of range ({len} built)")]
    BlasIndexOutOfRange { index: usize, len: usize },
    #[error("primitive mesh {primitive} has no device buffers")]
    MissingPrimitiveBuffers { primitive: usize },
    #[error("nothing to build")]
    EmptyInput,
}

#[derive(Error, Debug)]
pub enum SceneError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error(transparent)]
    Acceleration(#[from] AccelerationError),
    #[error("node transform count {actual} does not match node count {expected}")]
    NodeCountMismatch { expected: usize, actual: usize },
    #[error("config io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}
