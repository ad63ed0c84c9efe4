use std::sync::Arc;

use env_logger::Env;
use round_cat_rt::config_loader::ConfigFileLoader;
use round_cat_rt::loader::{cube_index_bytes, cube_vertices};
use round_cat_rt::vulkan::context::{Context, ContextDesc};
use round_cat_rt::RayTracingScene;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let mut config_loader = ConfigFileLoader::new(config_path);
    let config = config_loader.load_config()?.clone();

    let context = Arc::new(Context::new(&ContextDesc {
        enable_validation: cfg!(debug_assertions),
        ..Default::default()
    })?);

    let scene = if config.scene_path.is_empty() {
        log::info!("No scene configured, using the built-in cube");
        RayTracingScene::load_raw(context, &cube_vertices(), &cube_index_bytes(), 2, &config)?
    } else {
        RayTracingScene::load_gltf(context, &config.scene_path, &config)?
    };
    scene.look_at_scene(16.0 / 9.0)?;

    log::info!(
        "{} primitive meshes, {} nodes, {} lights, {} textures, {} BLAS, TLAS at {:#x}",
        scene.scene().primitive_meshes.len(),
        scene.scene().nodes.len(),
        scene.scene().lights.len(),
        scene.buffers().textures.len(),
        scene.blas_count(),
        scene.tlas_device_address()?
    );
    Ok(())
}
