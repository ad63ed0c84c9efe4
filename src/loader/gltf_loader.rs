use std::{collections::HashMap, path::Path};

use ash::vk;
use gltf::{khr_lights_punctual, texture::Sampler, Document, Gltf, Semantic};
use serde_json::Value;
use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use crate::error::IngestError;
use crate::scene::{
    AlphaMode, Anisotropy, Clearcoat, LightType, LoadedImage, LoadedScene, LoadedTexture,
    Material, SceneLight, ShadingModel, Sheen, SpecularGlossiness, TextureTransform,
    Transmission, Volume,
};
use crate::vulkan::image::SamplerInfo;

use super::{gltf_index_width, PrimitiveKey, SceneBuilder, VertexAttributes};

struct SceneLoadingData {
    builder: SceneBuilder,
    buffers: Vec<gltf::buffer::Data>,
    /// glTF mesh index to the primitive meshes it turned into
    mesh_primitives: HashMap<usize, Vec<usize>>,
}

impl SceneLoadingData {
    fn new(buffers: Vec<gltf::buffer::Data>) -> Self {
        Self {
            builder: SceneBuilder::new(),
            buffers,
            mesh_primitives: HashMap::new(),
        }
    }
}

/// Extensions the importer understands, either through the gltf crate or from the raw JSON.
const HANDLED_EXTENSIONS: &[&str] = &[
    "KHR_lights_punctual",
    "KHR_materials_emissive_strength",
    "KHR_materials_pbrSpecularGlossiness",
    "KHR_materials_transmission",
    "KHR_materials_ior",
    "KHR_materials_volume",
    "KHR_materials_unlit",
    "KHR_texture_transform",
    "KHR_materials_clearcoat",
    "KHR_materials_sheen",
    "KHR_materials_anisotropy",
];

/// Parses the file and validates it, except for `extensionsRequired`.
///
/// Required extensions the importer does not handle are reported and the features they carry
/// are ignored, the rest of the file still loads.
fn open_document(path: &Path) -> Result<(Document, Option<Vec<u8>>), gltf::Error> {
    let bytes = std::fs::read(path).map_err(gltf::Error::Io)?;
    let Gltf { document, blob } = Gltf::from_slice_without_validation(&bytes)?;

    let mut json = document.into_json();
    for extension in &json.extensions_required {
        if !HANDLED_EXTENSIONS.contains(&extension.as_str()) {
            log::warn!(
                "{} requires the unsupported extension {}, its features are skipped",
                path.display(),
                extension
            );
        }
    }
    json.extensions_required.clear();

    Ok((Document::from_json(json)?, blob))
}

/// Imports a `.gltf` or `.glb` file into a flat [`LoadedScene`].
pub fn load_gltf(path: impl AsRef<Path>) -> Result<LoadedScene, IngestError> {
    let path = path.as_ref();
    let base = path.parent();

    let (document, blob) = open_document(path).map_err(|e| {
        log::error!("Could not open {}: {}", path.display(), e);
        e
    })?;
    let buffers = gltf::import_buffers(&document, base, blob).map_err(|e| {
        log::error!("Could not load the buffers of {}: {}", path.display(), e);
        e
    })?;
    let images = match gltf::import_images(&document, base, &buffers) {
        Ok(images) => images.iter().map(to_rgba8).collect(),
        Err(e) => {
            log::warn!(
                "Could not load the images of {}, every texture falls back to white: {}",
                path.display(),
                e
            );
            vec![None; document.images().len()]
        }
    };

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| {
            log::error!("{} contains no scene", path.display());
            IngestError::NoScene
        })?;

    let mut loading_data = SceneLoadingData::new(buffers);

    let scene_data = loading_data.builder.scene_mut();
    scene_data.materials = document.materials().map(|m| load_material(&m)).collect();
    if scene_data.materials.is_empty() {
        scene_data.materials.push(Material::default());
    }
    scene_data.textures = document.textures().map(|t| load_texture(&t)).collect();
    scene_data.images = images;

    for node in scene.nodes() {
        load_node(&mut loading_data, &node, Mat4::identity());
    }

    let scene = loading_data.builder.finish();
    log::info!(
        "Loaded {}: {} nodes, {} primitive meshes, {} vertices, {} indices, {} materials, {} textures, {} lights",
        path.display(),
        scene.nodes.len(),
        scene.primitive_meshes.len(),
        scene.positions.len(),
        scene.indices.len(),
        scene.materials.len(),
        scene.textures.len(),
        scene.lights.len()
    );
    Ok(scene)
}

fn load_node(loading_data: &mut SceneLoadingData, node: &gltf::Node<'_>, parent_matrix: Mat4) {
    let [c0, c1, c2, c3] = node.transform().matrix();
    let local_matrix = Mat4::new(c0.into(), c1.into(), c2.into(), c3.into());
    let world_matrix = parent_matrix * local_matrix;

    if let Some(mesh) = node.mesh() {
        let primitives = load_mesh(loading_data, &mesh);
        for primitive in primitives {
            loading_data.builder.push_node(world_matrix, primitive);
        }
    }

    if let Some(light) = node.light() {
        let light = load_light(&light, world_matrix);
        loading_data.builder.scene_mut().lights.push(light);
    }

    for child in node.children() {
        load_node(loading_data, &child, world_matrix);
    }
}

/// The primitive meshes of a glTF mesh, created the first time a node references it.
fn load_mesh(loading_data: &mut SceneLoadingData, mesh: &gltf::Mesh<'_>) -> Vec<usize> {
    if let Some(primitives) = loading_data.mesh_primitives.get(&mesh.index()) {
        return primitives.clone();
    }

    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping primitive {} of mesh {:?}, mode {:?} is not triangles",
                primitive.index(),
                mesh.name(),
                primitive.mode()
            );
            continue;
        }
        match load_primitive(loading_data, &primitive) {
            Ok(index) => primitives.push(index),
            Err(e) => log::warn!(
                "Skipping primitive {} of mesh {:?}: {}",
                primitive.index(),
                mesh.name(),
                e
            ),
        }
    }

    loading_data
        .mesh_primitives
        .insert(mesh.index(), primitives.clone());
    primitives
}

fn load_primitive(
    loading_data: &mut SceneLoadingData,
    primitive: &gltf::Primitive<'_>,
) -> Result<usize, IngestError> {
    let positions_accessor = primitive
        .get(&Semantic::Positions)
        .ok_or(IngestError::MissingPositions)?;

    let key = PrimitiveKey {
        positions: positions_accessor.index(),
        normals: primitive.get(&Semantic::Normals).map(|a| a.index()),
        tangents: primitive.get(&Semantic::Tangents).map(|a| a.index()),
        texcoords0: primitive.get(&Semantic::TexCoords(0)).map(|a| a.index()),
        colors0: primitive.get(&Semantic::Colors(0)).map(|a| a.index()),
    };

    let buffers = &loading_data.buffers;
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|v| &v.0[..]));

    let indices: Vec<u32> = match primitive.indices() {
        Some(accessor) => {
            gltf_index_width(&accessor)?;
            reader
                .read_indices()
                .map(|indices| indices.into_u32().collect())
                .unwrap_or_default()
        }
        None => (0..positions_accessor.count() as u32).collect(),
    };

    let vertices = match loading_data.builder.cached_vertices(&key) {
        Some(vertices) => {
            super::validate_indices(&indices, vertices.count as usize)?;
            vertices
        }
        None => {
            let attributes = VertexAttributes {
                positions: reader
                    .read_positions()
                    .map(|p| p.map(Vec3::from).collect())
                    .unwrap_or_default(),
                normals: reader
                    .read_normals()
                    .map(|n| n.map(Vec3::from).collect()),
                tangents: reader
                    .read_tangents()
                    .map(|t| t.map(Vec4::from).collect()),
                texcoords0: reader
                    .read_tex_coords(0)
                    .map(|t| t.into_f32().map(Vec2::from).collect()),
                colors0: reader
                    .read_colors(0)
                    .map(|c| c.into_rgba_f32().map(Vec4::from).collect()),
                bounds: accessor_bounds(&positions_accessor),
            };
            loading_data
                .builder
                .append_vertices(Some(key), attributes, &indices)?
        }
    };

    let material_index = primitive.material().index().unwrap_or(0) as u32;
    Ok(loading_data
        .builder
        .push_primitive(vertices, &indices, material_index))
}

fn accessor_bounds(accessor: &gltf::Accessor<'_>) -> Option<(Vec3, Vec3)> {
    let min: [f32; 3] = serde_json::from_value(accessor.min()?).ok()?;
    let max: [f32; 3] = serde_json::from_value(accessor.max()?).ok()?;
    Some((min.into(), max.into()))
}

fn load_light(light: &khr_lights_punctual::Light<'_>, world_matrix: Mat4) -> SceneLight {
    let (light_type, inner_cone_angle, outer_cone_angle) = match light.kind() {
        khr_lights_punctual::Kind::Directional => {
            (LightType::Directional, 0.0, std::f32::consts::FRAC_PI_4)
        }
        khr_lights_punctual::Kind::Point => (LightType::Point, 0.0, std::f32::consts::FRAC_PI_4),
        khr_lights_punctual::Kind::Spot {
            inner_cone_angle,
            outer_cone_angle,
        } => (LightType::Spot, inner_cone_angle, outer_cone_angle),
    };

    SceneLight {
        light_type,
        world_matrix,
        color: light.color().into(),
        intensity: light.intensity(),
        range: light.range().unwrap_or(0.0),
        inner_cone_angle,
        outer_cone_angle,
    }
}

fn texture_index(info: Option<gltf::texture::Info<'_>>) -> i32 {
    info.map_or(-1, |info| info.texture().index() as i32)
}

fn load_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let emissive_strength = material.emissive_strength().unwrap_or(1.0);

    let mut loaded = Material {
        name: material.name().map(str::to_string),
        base_color_factor: pbr.base_color_factor().into(),
        base_color_texture: texture_index(pbr.base_color_texture()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: texture_index(pbr.metallic_roughness_texture()),
        emissive_factor: Vec3::from(material.emissive_factor()) * emissive_strength,
        emissive_texture: texture_index(material.emissive_texture()),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        double_sided: material.double_sided(),
        ior: material.ior().unwrap_or(1.5),
        unlit: material.unlit(),
        ..Material::default()
    };

    if let Some(normal) = material.normal_texture() {
        loaded.normal_texture = normal.texture().index() as i32;
        loaded.normal_texture_scale = normal.scale();
    }
    if let Some(occlusion) = material.occlusion_texture() {
        loaded.occlusion_texture = occlusion.texture().index() as i32;
        loaded.occlusion_texture_strength = occlusion.strength();
    }

    if let Some(transform) = pbr
        .base_color_texture()
        .and_then(|info| info.texture_transform())
    {
        loaded.texture_transform = TextureTransform {
            offset: transform.offset().into(),
            rotation: transform.rotation(),
            scale: transform.scale().into(),
        };
    }

    if let Some(specular) = material.pbr_specular_glossiness() {
        loaded.shading_model = ShadingModel::SpecularGlossiness;
        loaded.specular_glossiness = SpecularGlossiness {
            diffuse_factor: specular.diffuse_factor().into(),
            specular_factor: specular.specular_factor().into(),
            glossiness_factor: specular.glossiness_factor(),
            diffuse_texture: texture_index(specular.diffuse_texture()),
            specular_glossiness_texture: texture_index(specular.specular_glossiness_texture()),
        };
    }

    if let Some(transmission) = material.transmission() {
        loaded.transmission = Transmission {
            factor: transmission.transmission_factor(),
            texture: texture_index(transmission.transmission_texture()),
        };
    }

    if let Some(volume) = material.volume() {
        loaded.volume = Volume {
            thickness_factor: volume.thickness_factor(),
            thickness_texture: texture_index(volume.thickness_texture()),
            attenuation_distance: volume.attenuation_distance(),
            attenuation_color: volume.attenuation_color().into(),
        };
    }

    if let Some(extensions) = material.extensions() {
        if let Some(clearcoat) = extensions.get("KHR_materials_clearcoat") {
            loaded.clearcoat = parse_clearcoat(clearcoat);
        }
        if let Some(sheen) = extensions.get("KHR_materials_sheen") {
            loaded.sheen = parse_sheen(sheen);
        }
        if let Some(anisotropy) = extensions.get("KHR_materials_anisotropy") {
            loaded.anisotropy = parse_anisotropy(anisotropy);
        }
    }

    loaded
}

fn json_f32(value: &Value, key: &str) -> Option<f32> {
    value.get(key)?.as_f64().map(|v| v as f32)
}

fn json_vec3(value: &Value, key: &str) -> Option<Vec3> {
    let array: [f32; 3] = serde_json::from_value(value.get(key)?.clone()).ok()?;
    Some(array.into())
}

fn json_texture(value: &Value, key: &str) -> i32 {
    value
        .get(key)
        .and_then(|texture| texture.get("index"))
        .and_then(Value::as_i64)
        .map_or(-1, |index| index as i32)
}

fn parse_clearcoat(value: &Value) -> Clearcoat {
    let default = Clearcoat::default();
    Clearcoat {
        factor: json_f32(value, "clearcoatFactor").unwrap_or(default.factor),
        texture: json_texture(value, "clearcoatTexture"),
        roughness_factor: json_f32(value, "clearcoatRoughnessFactor")
            .unwrap_or(default.roughness_factor),
        roughness_texture: json_texture(value, "clearcoatRoughnessTexture"),
    }
}

fn parse_sheen(value: &Value) -> Sheen {
    let default = Sheen::default();
    Sheen {
        color_factor: json_vec3(value, "sheenColorFactor").unwrap_or(default.color_factor),
        roughness_factor: json_f32(value, "sheenRoughnessFactor")
            .unwrap_or(default.roughness_factor),
    }
}

/// Accepts the ratified `anisotropyStrength`/`anisotropyRotation` form and the older
/// `anisotropy`/`anisotropyDirection` form.
fn parse_anisotropy(value: &Value) -> Anisotropy {
    let default = Anisotropy::default();
    if let Some(strength) = json_f32(value, "anisotropyStrength") {
        let rotation = json_f32(value, "anisotropyRotation").unwrap_or(0.0);
        let (sin, cos) = rotation.sin_cos();
        return Anisotropy {
            strength,
            direction: Vec3::new(cos, sin, 0.0),
        };
    }
    Anisotropy {
        strength: json_f32(value, "anisotropy").unwrap_or(default.strength),
        direction: json_vec3(value, "anisotropyDirection").unwrap_or(default.direction),
    }
}

fn load_texture(texture: &gltf::Texture<'_>) -> LoadedTexture {
    LoadedTexture {
        image: Some(texture.source().index()),
        sampler: load_sampler(&texture.sampler()),
    }
}

fn load_sampler(sampler: &Sampler<'_>) -> SamplerInfo {
    let (min_filter, mipmap_mode) =
        from_gltf_min_filter(sampler.min_filter().unwrap_or(gltf::texture::MinFilter::Linear));
    let mag_filter =
        from_gltf_filter(sampler.mag_filter().unwrap_or(gltf::texture::MagFilter::Linear));

    SamplerInfo {
        min_filter,
        mag_filter,
        mipmap_mode,
        address_mode_u: from_gltf_address_mode(sampler.wrap_s()),
        address_mode_v: from_gltf_address_mode(sampler.wrap_t()),
    }
}

fn from_gltf_address_mode(wrapping_mode: gltf::texture::WrappingMode) -> vk::SamplerAddressMode {
    match wrapping_mode {
        gltf::texture::WrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        gltf::texture::WrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        gltf::texture::WrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
    }
}

fn from_gltf_filter(linear: gltf::texture::MagFilter) -> vk::Filter {
    match linear {
        gltf::texture::MagFilter::Nearest => vk::Filter::NEAREST,
        gltf::texture::MagFilter::Linear => vk::Filter::LINEAR,
    }
}

fn from_gltf_min_filter(
    min_filter: gltf::texture::MinFilter,
) -> (vk::Filter, vk::SamplerMipmapMode) {
    use gltf::texture::MinFilter;
    match min_filter {
        MinFilter::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        MinFilter::Linear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        MinFilter::NearestMipmapNearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        MinFilter::LinearMipmapNearest => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        MinFilter::NearestMipmapLinear => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        MinFilter::LinearMipmapLinear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
    }
}

/// Widens or narrows decoded glTF pixels to RGBA8.
pub(crate) fn to_rgba8(image: &gltf::image::Data) -> Option<LoadedImage> {
    use gltf::image::Format;

    let pixels: Vec<u8> = match image.format {
        Format::R8 => image.pixels.iter().flat_map(|&r| [r, 0, 0, 255]).collect(),
        Format::R8G8 => image
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        Format::R8G8B8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8B8A8 => image.pixels.clone(),
        // 16 bit channels are little endian, keep the high byte
        Format::R16 => image
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[1], 0, 0, 255])
            .collect(),
        Format::R16G16 => image
            .pixels
            .chunks_exact(4)
            .flat_map(|p| [p[1], p[3], 0, 255])
            .collect(),
        Format::R16G16B16 => image
            .pixels
            .chunks_exact(6)
            .flat_map(|p| [p[1], p[3], p[5], 255])
            .collect(),
        Format::R16G16B16A16 => image
            .pixels
            .chunks_exact(8)
            .flat_map(|p| [p[1], p[3], p[5], p[7]])
            .collect(),
        other => {
            log::warn!(
                "Image format {:?} is not supported, using the white texture instead",
                other
            );
            return None;
        }
    };

    if pixels.len() != (image.width * image.height * 4) as usize {
        log::warn!(
            "Image of {}x{} has {} bytes after conversion, using the white texture instead",
            image.width,
            image.height,
            pixels.len()
        );
        return None;
    }

    Some(LoadedImage {
        width: image.width,
        height: image.height,
        pixels,
    })
}
