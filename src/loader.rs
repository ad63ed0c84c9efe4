mod attributes;
mod gltf_loader;
mod indices;
mod raw;

pub use attributes::*;
pub use gltf_loader::load_gltf;
pub use indices::*;
pub use raw::*;

use std::collections::HashMap;

use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use crate::error::IngestError;
use crate::scene::{LoadedScene, PrimitiveMesh, SceneDimensions, SceneNode};

/// Identifies the vertex data of a primitive by the accessors it is read from.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub struct PrimitiveKey {
    pub positions: usize,
    pub normals: Option<usize>,
    pub tangents: Option<usize>,
    pub texcoords0: Option<usize>,
    pub colors0: Option<usize>,
}

/// Where the vertices of a primitive ended up in the scene arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexRange {
    pub offset: u32,
    pub count: u32,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

/// Vertex data of one primitive as it was read, anything may be missing except positions.
#[derive(Debug, Clone, Default)]
pub struct VertexAttributes {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec4>>,
    pub texcoords0: Option<Vec<Vec2>>,
    pub colors0: Option<Vec<Vec4>>,
    /// Usually the accessor min and max
    pub bounds: Option<(Vec3, Vec3)>,
}

/// Accumulates primitives, nodes and everything else into a [`LoadedScene`].
#[derive(Default)]
pub struct SceneBuilder {
    scene: LoadedScene,
    primitive_cache: HashMap<PrimitiveKey, VertexRange>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self) -> &LoadedScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut LoadedScene {
        &mut self.scene
    }

    pub fn cached_vertices(&self, key: &PrimitiveKey) -> Option<VertexRange> {
        self.primitive_cache.get(key).copied()
    }

    /// Appends the vertices of a primitive, computing whatever attributes are missing.
    /// `indices` are local to the primitive and only used to derive normals and tangents.
    pub fn append_vertices(
        &mut self,
        key: Option<PrimitiveKey>,
        attributes: VertexAttributes,
        indices: &[u32],
    ) -> Result<VertexRange, IngestError> {
        let VertexAttributes {
            positions,
            normals,
            tangents,
            texcoords0,
            colors0,
            bounds,
        } = attributes;

        if positions.is_empty() {
            return Err(IngestError::MissingPositions);
        }
        let count = positions.len();
        validate_indices(indices, count)?;

        let with_len = |name: &str, len: usize| {
            if len != count {
                log::warn!(
                    "Ignoring {} with {} entries for {} positions",
                    name,
                    len,
                    count
                );
                false
            } else {
                true
            }
        };

        let normals = normals
            .filter(|n| with_len("normals", n.len()))
            .unwrap_or_else(|| compute_normals(&positions, indices));
        let texcoords0 = texcoords0
            .filter(|t| with_len("texture coordinates", t.len()))
            .unwrap_or_else(|| cube_projection_uvs(&positions));
        let tangents = tangents
            .filter(|t| with_len("tangents", t.len()))
            .unwrap_or_else(|| compute_tangents(&positions, &normals, &texcoords0, indices));
        let colors0 = colors0
            .filter(|c| with_len("colors", c.len()))
            .unwrap_or_else(|| vec![Vec4::one(); count]);

        let (bbox_min, bbox_max) = bounds.unwrap_or_else(|| attributes::bounds(&positions));

        let range = VertexRange {
            offset: self.scene.positions.len() as u32,
            count: count as u32,
            bbox_min,
            bbox_max,
        };

        self.scene.positions.extend(positions);
        self.scene.normals.extend(normals);
        self.scene.texcoords0.extend(texcoords0);
        self.scene.tangents.extend(tangents);
        self.scene.colors0.extend(colors0);

        if let Some(key) = key {
            self.primitive_cache.insert(key, range);
        }
        Ok(range)
    }

    /// Adds a primitive mesh over already appended vertices. Indices are never shared.
    pub fn push_primitive(
        &mut self,
        vertices: VertexRange,
        indices: &[u32],
        material_index: u32,
    ) -> usize {
        let primitive = PrimitiveMesh {
            vertex_offset: vertices.offset,
            vertex_count: vertices.count,
            first_index: self.scene.indices.len() as u32,
            index_count: indices.len() as u32,
            material_index,
            bbox_min: vertices.bbox_min,
            bbox_max: vertices.bbox_max,
        };
        self.scene.indices.extend_from_slice(indices);
        self.scene.primitive_meshes.push(primitive);
        self.scene.primitive_meshes.len() - 1
    }

    pub fn push_node(&mut self, world_matrix: Mat4, primitive_mesh: usize) {
        self.scene.nodes.push(SceneNode {
            world_matrix,
            primitive_mesh,
        });
    }

    pub fn finish(mut self) -> LoadedScene {
        self.scene.dimensions = compute_scene_dimensions(&self.scene);
        self.scene
    }
}

/// Union of the transformed primitive boxes of all nodes.
pub fn compute_scene_dimensions(scene: &LoadedScene) -> SceneDimensions {
    let mut min = Vec3::broadcast(f32::MAX);
    let mut max = Vec3::broadcast(f32::MIN);

    for node in &scene.nodes {
        let Some(primitive) = scene.primitive_meshes.get(node.primitive_mesh) else {
            continue;
        };
        let (lo, hi) = (primitive.bbox_min, primitive.bbox_max);
        for corner in 0..8 {
            let point = Vec3::new(
                if corner & 1 == 0 { lo.x } else { hi.x },
                if corner & 2 == 0 { lo.y } else { hi.y },
                if corner & 4 == 0 { lo.z } else { hi.z },
            );
            let transformed = node.world_matrix.transform_point3(point);
            min = min.min_by_component(transformed);
            max = max.max_by_component(transformed);
        }
    }

    let dimensions = SceneDimensions::from_bounds(min, max);
    if dimensions.is_degenerate() {
        log::warn!(
            "Scene bounding box {:?} - {:?} is invalid, using [-1, 1] instead",
            min,
            max
        );
        return SceneDimensions::unit();
    }
    dimensions
}
