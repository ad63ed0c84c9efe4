use ultraviolet::{Mat3, Mat4, Vec2, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum AlphaMode {
    #[default]
    Opaque = 0,
    Mask = 1,
    Blend = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ShadingModel {
    #[default]
    MetallicRoughness = 0,
    SpecularGlossiness = 1,
}

/// KHR_materials_pbrSpecularGlossiness
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecularGlossiness {
    pub diffuse_factor: Vec4,
    pub specular_factor: Vec3,
    pub glossiness_factor: f32,
    pub diffuse_texture: i32,
    pub specular_glossiness_texture: i32,
}

impl Default for SpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse_factor: Vec4::one(),
            specular_factor: Vec3::one(),
            glossiness_factor: 1.0,
            diffuse_texture: -1,
            specular_glossiness_texture: -1,
        }
    }
}

/// KHR_texture_transform, taken from the base color texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::zero(),
            rotation: 0.0,
            scale: Vec2::one(),
        }
    }
}

impl TextureTransform {
    /// translation * rotation * scale, embedded in a 4x4 matrix.
    pub fn matrix(&self) -> Mat4 {
        let translation = Mat3::new(
            Vec3::unit_x(),
            Vec3::unit_y(),
            Vec3::new(self.offset.x, self.offset.y, 1.0),
        );
        let (s, c) = self.rotation.sin_cos();
        // rows are (c, s) and (-s, c)
        let rotation = Mat3::new(
            Vec3::new(c, -s, 0.0),
            Vec3::new(s, c, 0.0),
            Vec3::unit_z(),
        );
        let scale = Mat3::new(
            Vec3::new(self.scale.x, 0.0, 0.0),
            Vec3::new(0.0, self.scale.y, 0.0),
            Vec3::unit_z(),
        );

        (translation * rotation * scale).into_homogeneous()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub factor: f32,
    pub texture: i32,
}

impl Default for Transmission {
    fn default() -> Self {
        Self {
            factor: 0.0,
            texture: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    pub thickness_factor: f32,
    pub thickness_texture: i32,
    pub attenuation_distance: f32,
    pub attenuation_color: Vec3,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            thickness_factor: 0.0,
            thickness_texture: -1,
            attenuation_distance: f32::MAX,
            attenuation_color: Vec3::one(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clearcoat {
    pub factor: f32,
    pub texture: i32,
    pub roughness_factor: f32,
    pub roughness_texture: i32,
}

impl Default for Clearcoat {
    fn default() -> Self {
        Self {
            factor: 0.0,
            texture: -1,
            roughness_factor: 0.0,
            roughness_texture: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sheen {
    pub color_factor: Vec3,
    pub roughness_factor: f32,
}

impl Default for Sheen {
    fn default() -> Self {
        Self {
            color_factor: Vec3::zero(),
            roughness_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anisotropy {
    pub strength: f32,
    pub direction: Vec3,
}

impl Default for Anisotropy {
    fn default() -> Self {
        Self {
            strength: 0.0,
            direction: Vec3::unit_x(),
        }
    }
}

/// Texture fields hold glTF texture indices, -1 means no texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,

    pub base_color_factor: Vec4,
    pub base_color_texture: i32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: i32,

    pub emissive_factor: Vec3,
    pub emissive_texture: i32,
    pub normal_texture: i32,
    pub normal_texture_scale: f32,
    pub occlusion_texture: i32,
    pub occlusion_texture_strength: f32,

    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,

    pub shading_model: ShadingModel,
    pub specular_glossiness: SpecularGlossiness,
    pub texture_transform: TextureTransform,
    pub transmission: Transmission,
    pub ior: f32,
    pub volume: Volume,
    pub clearcoat: Clearcoat,
    pub sheen: Sheen,
    pub anisotropy: Anisotropy,
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: Vec4::one(),
            base_color_texture: -1,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: -1,
            emissive_factor: Vec3::zero(),
            emissive_texture: -1,
            normal_texture: -1,
            normal_texture_scale: 1.0,
            occlusion_texture: -1,
            occlusion_texture_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            shading_model: ShadingModel::MetallicRoughness,
            specular_glossiness: SpecularGlossiness::default(),
            texture_transform: TextureTransform::default(),
            transmission: Transmission::default(),
            ior: 1.5,
            volume: Volume::default(),
            clearcoat: Clearcoat::default(),
            sheen: Sheen::default(),
            anisotropy: Anisotropy::default(),
            unlit: false,
        }
    }
}

impl Material {
    /// The single material of raw geometry.
    pub fn raw_default() -> Self {
        Self {
            name: Some("raw".to_string()),
            metallic_factor: 0.0,
            roughness_factor: 0.5,
            emissive_factor: Vec3::one(),
            double_sided: true,
            ..Self::default()
        }
    }

    /// Opaque surfaces skip the any-hit shader.
    pub fn is_opaque(&self) -> bool {
        self.alpha_mode == AlphaMode::Opaque
            || (self.base_color_factor.w == 1.0 && self.base_color_texture == -1)
    }

    /// Every texture index this material refers to, -1 included.
    pub fn texture_indices_mut(&mut self) -> [&mut i32; 11] {
        [
            &mut self.base_color_texture,
            &mut self.metallic_roughness_texture,
            &mut self.emissive_texture,
            &mut self.normal_texture,
            &mut self.occlusion_texture,
            &mut self.specular_glossiness.diffuse_texture,
            &mut self.specular_glossiness.specular_glossiness_texture,
            &mut self.transmission.texture,
            &mut self.volume.thickness_texture,
            &mut self.clearcoat.texture,
            &mut self.clearcoat.roughness_texture,
        ]
    }
}
