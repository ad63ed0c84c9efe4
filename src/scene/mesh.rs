use ultraviolet::{Mat4, Vec3};

/// One drawable triangle range with a single material.
///
/// `vertex_offset` and `first_index` index into the contiguous arrays of the owning scene.
/// Indices are local to the primitive, so index 0 is the vertex at `vertex_offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveMesh {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    pub index_count: u32,
    pub material_index: u32,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

impl PrimitiveMesh {
    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.vertex_offset as usize..(self.vertex_offset + self.vertex_count) as usize
    }

    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.first_index as usize..(self.first_index + self.index_count) as usize
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneNode {
    pub world_matrix: Mat4,
    pub primitive_mesh: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneDimensions {
    pub min: Vec3,
    pub max: Vec3,
    pub size: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl SceneDimensions {
    pub fn from_bounds(min: Vec3, max: Vec3) -> Self {
        let size = max - min;
        Self {
            min,
            max,
            size,
            center: (min + max) * 0.5,
            radius: size.mag() * 0.5,
        }
    }

    pub fn unit() -> Self {
        Self::from_bounds(Vec3::broadcast(-1.0), Vec3::broadcast(1.0))
    }

    pub fn is_degenerate(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0 || self.size.z <= 0.0
    }
}

impl Default for SceneDimensions {
    fn default() -> Self {
        Self::unit()
    }
}
