use bytemuck::{Pod, Zeroable};
use crevice::std140::AsStd140;
use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use crate::scene::{Material, SceneLight};

use super::compress::{compress_unit_vec, encode_handedness, pack_unorm4x8};

/// Per vertex data as the hit shaders read it, 32 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CompressedVertex {
    pub position: [f32; 3],
    pub normal: u32,
    /// The lowest bit of `texcoord[1]` is the tangent handedness
    pub texcoord: [f32; 2],
    pub tangent: u32,
    pub color: u32,
}

impl CompressedVertex {
    pub fn new(position: Vec3, normal: Vec3, texcoord: Vec2, tangent: Vec4, color: Vec4) -> Self {
        Self {
            position: position.into(),
            normal: compress_unit_vec(normal),
            texcoord: [texcoord.x, encode_handedness(texcoord.y, tangent.w)],
            tangent: compress_unit_vec(tangent.xyz()),
            color: pack_unorm4x8(color),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ShadeMaterial {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: i32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: i32,

    pub khr_diffuse_factor: [f32; 4],
    pub khr_specular_factor: [f32; 3],
    pub khr_diffuse_texture: i32,
    pub shading_model: i32,
    pub khr_glossiness_factor: f32,
    pub khr_specular_glossiness_texture: i32,
    pub emissive_texture: i32,
    pub emissive_factor: [f32; 3],
    pub alpha_mode: i32,
    pub alpha_cutoff: f32,
    pub double_sided: i32,
    pub normal_texture: i32,
    pub normal_texture_scale: f32,
    pub uv_transform: [[f32; 4]; 4],
    pub unlit: i32,

    pub transmission_factor: f32,
    pub transmission_texture: i32,
    pub ior: f32,

    pub anisotropy_direction: [f32; 3],
    pub anisotropy: f32,

    pub attenuation_color: [f32; 3],
    pub thickness_factor: f32,
    pub thickness_texture: i32,
    pub attenuation_distance: f32,

    pub clearcoat_factor: f32,
    pub clearcoat_roughness: f32,
    pub clearcoat_texture: i32,
    pub clearcoat_roughness_texture: i32,
    /// packUnorm4x8(sheen color, sheen roughness)
    pub sheen: u32,
    pub _pad: i32,
}

impl From<&Material> for ShadeMaterial {
    fn from(material: &Material) -> Self {
        let sheen = &material.sheen;
        Self {
            base_color_factor: material.base_color_factor.into(),
            base_color_texture: material.base_color_texture,
            metallic_factor: material.metallic_factor,
            roughness_factor: material.roughness_factor,
            metallic_roughness_texture: material.metallic_roughness_texture,

            khr_diffuse_factor: material.specular_glossiness.diffuse_factor.into(),
            khr_specular_factor: material.specular_glossiness.specular_factor.into(),
            khr_diffuse_texture: material.specular_glossiness.diffuse_texture,
            shading_model: material.shading_model as i32,
            khr_glossiness_factor: material.specular_glossiness.glossiness_factor,
            khr_specular_glossiness_texture: material
                .specular_glossiness
                .specular_glossiness_texture,
            emissive_texture: material.emissive_texture,
            emissive_factor: material.emissive_factor.into(),
            alpha_mode: material.alpha_mode as i32,
            alpha_cutoff: material.alpha_cutoff,
            double_sided: material.double_sided as i32,
            normal_texture: material.normal_texture,
            normal_texture_scale: material.normal_texture_scale,
            uv_transform: mat4_to_array(material.texture_transform.matrix()),
            unlit: material.unlit as i32,

            transmission_factor: material.transmission.factor,
            transmission_texture: material.transmission.texture,
            ior: material.ior,

            anisotropy_direction: material.anisotropy.direction.into(),
            anisotropy: material.anisotropy.strength,

            attenuation_color: material.volume.attenuation_color.into(),
            thickness_factor: material.volume.thickness_factor,
            thickness_texture: material.volume.thickness_texture,
            attenuation_distance: material.volume.attenuation_distance,

            clearcoat_factor: material.clearcoat.factor,
            clearcoat_roughness: material.clearcoat.roughness_factor,
            clearcoat_texture: material.clearcoat.texture,
            clearcoat_roughness_texture: material.clearcoat.roughness_texture,
            sheen: pack_unorm4x8(Vec4::new(
                sheen.color_factor.x,
                sheen.color_factor.y,
                sheen.color_factor.z,
                sheen.roughness_factor,
            )),
            _pad: 0,
        }
    }
}

fn mat4_to_array(matrix: Mat4) -> [[f32; 4]; 4] {
    matrix.cols.map(|col| col.into())
}

/// Where the shaders find the geometry of one primitive mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceData {
    pub index_address: u64,
    pub vertex_address: u64,
    pub material_index: i32,
    pub _pad: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Light {
    pub direction: [f32; 3],
    pub range: f32,
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: [f32; 3],
    pub inner_cone_cos: f32,
    pub outer_cone_cos: f32,
    pub light_type: i32,
    pub _pad: [i32; 2],
}

impl From<&SceneLight> for Light {
    fn from(light: &SceneLight) -> Self {
        Self {
            direction: light.direction().into(),
            range: light.range,
            color: light.color.into(),
            intensity: light.intensity,
            position: light.position().into(),
            inner_cone_cos: light.inner_cone_angle.cos(),
            outer_cone_cos: light.outer_cone_angle.cos(),
            light_type: light.light_type as i32,
            _pad: [0; 2],
        }
    }
}

#[derive(AsStd140)]
pub struct Camera {
    pub view_inverse: Mat4,
    pub proj_inverse: Mat4,
    pub focal_dist: f32,
    pub aperture: f32,
    pub nb_lights: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::compress::{decode_handedness, decompress_unit_vec};

    #[test]
    fn record_sizes_match_the_shaders() {
        assert_eq!(std::mem::size_of::<CompressedVertex>(), 32);
        assert_eq!(std::mem::size_of::<ShadeMaterial>(), 256);
        assert_eq!(std::mem::size_of::<InstanceData>(), 24);
        assert_eq!(std::mem::size_of::<Light>(), 64);
    }

    #[test]
    fn compressed_vertex_keeps_handedness_and_directions() {
        let vertex = CompressedVertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::unit_y(),
            Vec2::new(0.25, 0.75),
            Vec4::new(1.0, 0.0, 0.0, -1.0),
            Vec4::one(),
        );
        assert_eq!(vertex.position, [1.0, 2.0, 3.0]);
        assert_eq!(decode_handedness(vertex.texcoord[1]), -1.0);
        assert!((decompress_unit_vec(vertex.normal).unwrap() - Vec3::unit_y()).mag() < 1e-3);
        assert!((decompress_unit_vec(vertex.tangent).unwrap() - Vec3::unit_x()).mag() < 1e-3);
        assert_eq!(vertex.color, 0xFFFF_FFFF);
    }

    #[test]
    fn shade_material_packs_sheen() {
        let mut material = Material::default();
        material.sheen.color_factor = Vec3::new(1.0, 0.0, 0.0);
        material.sheen.roughness_factor = 1.0;
        let shade = ShadeMaterial::from(&material);
        assert_eq!(shade.sheen, 0xFF00_00FF);
        assert_eq!(shade.base_color_texture, -1);
        assert_eq!(shade.uv_transform, mat4_to_array(Mat4::identity()));
    }
}
