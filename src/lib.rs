pub mod acceleration;
pub mod config_loader;
pub mod descriptor_binder;
pub mod error;
pub mod loader;
pub mod render;
pub mod scene;
pub mod scene_orchestrator;
pub mod scene_uploader;
pub mod utility;
pub mod vulkan;

pub use scene_orchestrator::RayTracingScene;
