use ultraviolet::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

/// A punctual light placed by a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLight {
    pub light_type: LightType,
    pub world_matrix: Mat4,
    pub color: Vec3,
    pub intensity: f32,
    /// 0 means infinite
    pub range: f32,
    /// Radians
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
}

impl SceneLight {
    pub fn position(&self) -> Vec3 {
        self.world_matrix.transform_point3(Vec3::zero())
    }

    pub fn direction(&self) -> Vec3 {
        self.world_matrix.transform_vec3(-Vec3::unit_z())
    }
}
