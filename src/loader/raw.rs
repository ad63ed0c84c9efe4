use bytemuck::{Pod, Zeroable};
use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use crate::error::IngestError;
use crate::scene::{LoadedScene, Material};

use super::{decode_indices, SceneBuilder, VertexAttributes};

/// Vertex layout of raw geometry handed over by the host application.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PosNormalTangentTexcoordVertexRaw {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub nx: f32,
    pub ny: f32,
    pub nz: f32,
    pub tx: f32,
    pub ty: f32,
    pub tz: f32,
    /// snorm16
    pub u: i16,
    pub v: i16,
}

impl PosNormalTangentTexcoordVertexRaw {
    fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    fn normal(&self) -> Vec3 {
        Vec3::new(self.nx, self.ny, self.nz)
    }

    fn tangent(&self) -> Vec3 {
        Vec3::new(self.tx, self.ty, self.tz)
    }

    fn texcoord(&self) -> Vec2 {
        Vec2::new(self.u as f32 / 32767.0, self.v as f32 / 32767.0)
    }
}

fn all_usable(vectors: &[Vec3]) -> bool {
    vectors
        .iter()
        .all(|v| v.x.is_finite() && v.y.is_finite() && v.z.is_finite() && v.mag_sq() > 0.0)
}

/// Builds a one primitive, one node scene out of raw vertex and index memory.
///
/// Normals are kept when every vertex has a usable one, tangents are always derived.
pub fn load_raw(
    vertices: &[PosNormalTangentTexcoordVertexRaw],
    index_bytes: &[u8],
    index_width: usize,
) -> Result<LoadedScene, IngestError> {
    let indices = decode_indices(index_bytes, index_width)?;
    if indices.len() % 3 != 0 {
        return Err(IngestError::InvalidRawData(format!(
            "{} indices do not form triangles",
            indices.len()
        )));
    }

    let positions: Vec<Vec3> = vertices.iter().map(|v| v.position()).collect();
    let normals: Vec<Vec3> = vertices.iter().map(|v| v.normal()).collect();
    let supplied_tangents = vertices.iter().filter(|v| v.tangent().mag_sq() > 0.0).count();

    let attributes = VertexAttributes {
        positions,
        normals: all_usable(&normals).then_some(normals),
        // Raw tangents carry no handedness
        tangents: None,
        texcoords0: Some(vertices.iter().map(|v| v.texcoord()).collect()),
        colors0: Some(vec![Vec4::one(); vertices.len()]),
        bounds: None,
    };
    if supplied_tangents > 0 {
        log::debug!(
            "Replacing {} raw tangents with generated ones",
            supplied_tangents
        );
    }

    let mut builder = SceneBuilder::new();
    builder.scene_mut().materials.push(Material::raw_default());

    let range = builder.append_vertices(None, attributes, &indices)?;
    let primitive = builder.push_primitive(range, &indices, 0);
    builder.push_node(Mat4::identity(), primitive);

    let scene = builder.finish();
    log::info!(
        "Loaded raw geometry with {} vertices and {} indices",
        scene.positions.len(),
        scene.indices.len()
    );
    Ok(scene)
}

/// The 24 vertex cube the deferred shading sample draws, one quad per face.
pub fn cube_vertices() -> [PosNormalTangentTexcoordVertexRaw; 24] {
    const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [0.0, 0.0, 1.0],
            [[-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0]],
        ),
        (
            [0.0, 0.0, -1.0],
            [[-1.0, 1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0]],
        ),
        (
            [0.0, 1.0, 0.0],
            [[-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, -1.0], [1.0, 1.0, -1.0]],
        ),
        (
            [0.0, -1.0, 0.0],
            [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0]],
        ),
        (
            [1.0, 0.0, 0.0],
            [[1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0]],
        ),
        (
            [-1.0, 0.0, 0.0],
            [[-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0]],
        ),
    ];
    const UVS: [(i16, i16); 4] = [(0, 0), (0x7fff, 0), (0, 0x7fff), (0x7fff, 0x7fff)];

    let mut vertices = [PosNormalTangentTexcoordVertexRaw::zeroed(); 24];
    for (face, (normal, corners)) in FACES.iter().enumerate() {
        for (corner, position) in corners.iter().enumerate() {
            let (u, v) = UVS[corner];
            vertices[face * 4 + corner] = PosNormalTangentTexcoordVertexRaw {
                x: position[0],
                y: position[1],
                z: position[2],
                nx: normal[0],
                ny: normal[1],
                nz: normal[2],
                tx: 0.0,
                ty: 0.0,
                tz: 0.0,
                u,
                v,
            };
        }
    }
    vertices
}

pub const CUBE_INDICES: [u16; 36] = [
    0, 2, 1, 1, 2, 3, 4, 5, 6, 5, 7, 6, //
    8, 10, 9, 9, 10, 11, 12, 13, 14, 13, 15, 14, //
    16, 18, 17, 17, 18, 19, 20, 21, 22, 21, 23, 22,
];

pub fn cube_index_bytes() -> Vec<u8> {
    CUBE_INDICES.iter().flat_map(|i| i.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::AlphaMode;

    #[test]
    fn raw_cube_is_one_primitive_and_one_node() {
        let scene = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();

        assert_eq!(scene.primitive_meshes.len(), 1);
        let primitive = scene.primitive_meshes[0];
        assert_eq!(primitive.vertex_count, 24);
        assert_eq!(primitive.index_count, 36);
        assert_eq!(primitive.material_index, 0);

        assert_eq!(scene.nodes.len(), 1);
        assert_eq!(scene.nodes[0].world_matrix, Mat4::identity());
        assert_eq!(scene.nodes[0].primitive_mesh, 0);

        assert_eq!(scene.materials.len(), 1);
        let material = &scene.materials[0];
        assert_eq!(material.alpha_mode, AlphaMode::Opaque);
        assert!(material.double_sided);
        assert_eq!(material.roughness_factor, 0.5);

        assert_eq!(scene.dimensions.min, Vec3::broadcast(-1.0));
        assert_eq!(scene.dimensions.max, Vec3::broadcast(1.0));
    }

    #[test]
    fn raw_cube_keeps_normals_and_decodes_texcoords() {
        let vertices = cube_vertices();
        let scene = load_raw(&vertices, &cube_index_bytes(), 2).unwrap();

        for (vertex, normal) in vertices.iter().zip(&scene.normals) {
            assert_eq!(vertex.normal(), *normal);
        }
        assert_eq!(scene.texcoords0[0], Vec2::zero());
        assert_eq!(scene.texcoords0[3], Vec2::one());
        for (tangent, normal) in scene.tangents.iter().zip(&scene.normals) {
            assert!((tangent.xyz().mag() - 1.0).abs() < 1e-5);
            assert!(tangent.xyz().dot(*normal).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_normals_are_recomputed_facing_outwards() {
        let mut vertices = cube_vertices();
        let expected: Vec<Vec3> = vertices.iter().map(|v| v.normal()).collect();
        for vertex in &mut vertices {
            vertex.nx = 0.0;
            vertex.ny = 0.0;
            vertex.nz = 0.0;
        }

        let scene = load_raw(&vertices, &cube_index_bytes(), 2).unwrap();
        for (normal, expected) in scene.normals.iter().zip(expected) {
            assert!((*normal - expected).mag() < 1e-5, "{normal:?} != {expected:?}");
        }
    }

    #[test]
    fn index_width_does_not_change_the_result() {
        let bytes32: Vec<u8> = CUBE_INDICES
            .iter()
            .flat_map(|&i| (i as u32).to_le_bytes())
            .collect();
        let bytes8: Vec<u8> = CUBE_INDICES.iter().map(|&i| i as u8).collect();

        let a = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();
        let b = load_raw(&cube_vertices(), &bytes32, 4).unwrap();
        let c = load_raw(&cube_vertices(), &bytes8, 1).unwrap();
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.indices, c.indices);
    }

    #[test]
    fn malformed_raw_input_is_an_error() {
        assert!(matches!(
            load_raw(&cube_vertices(), &cube_index_bytes(), 3),
            Err(IngestError::UnsupportedIndexWidth(3))
        ));
        assert!(matches!(
            load_raw(&cube_vertices(), &cube_index_bytes()[..8], 2),
            Err(IngestError::InvalidRawData(_))
        ));
        assert!(matches!(
            load_raw(&[], &cube_index_bytes(), 2),
            Err(IngestError::MissingPositions)
        ));
    }
}
