mod light;
mod material;
mod mesh;
mod texture;

pub use light::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;

use ultraviolet::{Vec2, Vec3, Vec4};

use crate::error::IngestError;
use crate::loader::validate_indices;

/// A scene flattened into contiguous arrays, ready for upload.
#[derive(Debug, Clone, Default)]
pub struct LoadedScene {
    pub materials: Vec<Material>,
    pub nodes: Vec<SceneNode>,
    pub primitive_meshes: Vec<PrimitiveMesh>,
    pub lights: Vec<SceneLight>,
    pub textures: Vec<LoadedTexture>,
    /// `None` for images that could not be decoded
    pub images: Vec<Option<LoadedImage>>,

    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// xyz tangent, w handedness
    pub tangents: Vec<Vec4>,
    pub texcoords0: Vec<Vec2>,
    pub colors0: Vec<Vec4>,
    pub indices: Vec<u32>,

    pub dimensions: SceneDimensions,
}

impl LoadedScene {
    pub fn primitive_indices(&self, primitive: &PrimitiveMesh) -> &[u32] {
        &self.indices[primitive.index_range()]
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Checks that every primitive and node stays inside the scene arrays, so uploads can slice
    /// them freely. Loaders produce valid scenes, hand built ones go through this first.
    pub fn validate(&self) -> Result<(), IngestError> {
        let expected = self.positions.len();
        for (attribute, actual) in [
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
            ("texcoords0", self.texcoords0.len()),
            ("colors0", self.colors0.len()),
        ] {
            if actual != expected {
                return Err(IngestError::AttributeCountMismatch {
                    attribute,
                    expected,
                    actual,
                });
            }
        }

        for (index, primitive) in self.primitive_meshes.iter().enumerate() {
            let vertex_end = primitive.vertex_offset as u64 + primitive.vertex_count as u64;
            let index_end = primitive.first_index as u64 + primitive.index_count as u64;
            if vertex_end > expected as u64 || index_end > self.indices.len() as u64 {
                return Err(IngestError::PrimitiveOutOfRange { primitive: index });
            }
            validate_indices(
                self.primitive_indices(primitive),
                primitive.vertex_count as usize,
            )?;
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.primitive_mesh >= self.primitive_meshes.len() {
                return Err(IngestError::NodeOutOfRange {
                    node: index,
                    primitive_mesh: node.primitive_mesh,
                });
            }
        }
        Ok(())
    }
}
