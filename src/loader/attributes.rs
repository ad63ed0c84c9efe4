//! Vertex attributes a primitive may be missing, derived from the ones it has.

use ultraviolet::{Vec2, Vec3, Vec4};

/// Area weighted vertex normals, counter-clockwise triangles face the viewer.
/// Vertices that no triangle touches get +Z.
pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::zero(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = positions[i0];
        // the cross product is not normalized, larger triangles weigh more
        let n = (positions[i1] - p0).cross(positions[i2] - p0);
        normals[i0] += n;
        normals[i1] += n;
        normals[i2] += n;
    }

    for normal in &mut normals {
        *normal = if normal.mag_sq() > 0.0 {
            normal.normalized()
        } else {
            Vec3::unit_z()
        };
    }
    normals
}

/// Tangents from the texture coordinate gradients, with the bitangent handedness in `w`.
pub fn compute_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    texcoords: &[Vec2],
    indices: &[u32],
) -> Vec<Vec4> {
    let mut tangents = vec![Vec3::zero(); positions.len()];
    let mut bitangents = vec![Vec3::zero(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);

        let e1 = positions[i1] - positions[i0];
        let e2 = positions[i2] - positions[i0];
        let duv_e1 = texcoords[i1] - texcoords[i0];
        let duv_e2 = texcoords[i2] - texcoords[i0];

        let a = duv_e1.x * duv_e2.y - duv_e2.x * duv_e1.y;
        let r = if a.abs() > 0.0 { 1.0 / a } else { 1.0 };

        let t = (e1 * duv_e2.y - e2 * duv_e1.y) * r;
        let b = (e2 * duv_e1.x - e1 * duv_e2.x) * r;

        for i in [i0, i1, i2] {
            tangents[i] += t;
            bitangents[i] += b;
        }
    }

    normals
        .iter()
        .zip(tangents.iter().zip(bitangents.iter()))
        .map(|(&n, (&t, &b))| {
            // Gram-Schmidt
            let orthogonal = t - n * n.dot(t);
            let tangent = if orthogonal.mag_sq() > f32::EPSILON {
                orthogonal.normalized()
            } else if n.x.abs() > n.y.abs() {
                Vec3::new(n.z, 0.0, -n.x) / (n.x * n.x + n.z * n.z).sqrt()
            } else {
                Vec3::new(0.0, -n.z, n.y) / (n.y * n.y + n.z * n.z).sqrt()
            };

            let handedness = if n.cross(t).dot(b) < 0.0 { -1.0 } else { 1.0 };
            Vec4::new(tangent.x, tangent.y, tangent.z, handedness)
        })
        .collect()
}

/// Projects every position onto the face of a cube map picked by its dominant axis.
pub fn cube_projection_uvs(positions: &[Vec3]) -> Vec<Vec2> {
    positions.iter().map(|&p| cube_projection_uv(p)).collect()
}

fn cube_projection_uv(p: Vec3) -> Vec2 {
    let abs = p.abs();
    let mut max_axis = 0.0;
    let mut uc = 0.0;
    let mut vc = 0.0;

    // Later faces win ties, the order matters
    if abs.x >= abs.y && abs.x >= abs.z {
        max_axis = abs.x;
        (uc, vc) = if p.x > 0.0 { (-p.z, p.y) } else { (p.z, p.y) };
    }
    if abs.y >= abs.x && abs.y >= abs.z {
        max_axis = abs.y;
        (uc, vc) = if p.y > 0.0 { (p.x, -p.z) } else { (p.x, p.z) };
    }
    if abs.z >= abs.x && abs.z >= abs.y {
        max_axis = abs.z;
        (uc, vc) = if p.z > 0.0 { (p.x, p.y) } else { (-p.x, p.y) };
    }

    if max_axis == 0.0 {
        return Vec2::zero();
    }
    Vec2::new(0.5 * (uc / max_axis + 1.0), 0.5 * (vc / max_axis + 1.0))
}

pub fn bounds(positions: &[Vec3]) -> (Vec3, Vec3) {
    positions.iter().fold(
        (Vec3::broadcast(f32::MAX), Vec3::broadcast(f32::MIN)),
        |(min, max), &p| (min.min_by_component(p), max.max_by_component(p)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit(v: Vec3) {
        assert!((v.mag() - 1.0).abs() < 1e-5, "{v:?} is not unit length");
    }

    // A bent strip: an open mesh with triangles of very different sizes
    fn strip() -> (Vec<Vec3>, Vec<u32>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.5),
            Vec3::new(0.0, 100.0, 3.0),
            Vec3::new(7.0, 7.0, 7.0),
        ];
        let indices = vec![0, 1, 2, 2, 1, 3, 2, 3, 4];
        (positions, indices)
    }

    #[test]
    fn normals_are_unit_length() {
        let (positions, indices) = strip();
        let normals = compute_normals(&positions, &indices);
        assert_eq!(normals.len(), positions.len());
        for normal in &normals {
            assert_unit(*normal);
        }
        assert!((normals[0] - Vec3::unit_z()).mag() < 1e-5);
        // vertex 5 is not part of any triangle
        assert_eq!(normals[5], Vec3::unit_z());
    }

    #[test]
    fn normals_do_not_depend_on_triangle_order() {
        let (positions, indices) = strip();
        let reversed: Vec<u32> = indices.chunks(3).rev().flatten().copied().collect();
        let a = compute_normals(&positions, &indices);
        let b = compute_normals(&positions, &reversed);
        for (a, b) in a.iter().zip(b.iter()) {
            assert!((*a - *b).mag() < 1e-5);
        }
    }

    #[test]
    fn normals_follow_counter_clockwise_winding() {
        let positions = vec![Vec3::zero(), Vec3::unit_x(), Vec3::unit_y()];
        let normals = compute_normals(&positions, &[0, 1, 2]);
        assert!((normals[0] - Vec3::unit_z()).mag() < 1e-5);
        let flipped = compute_normals(&positions, &[0, 2, 1]);
        assert!((flipped[0] + Vec3::unit_z()).mag() < 1e-5);
    }

    #[test]
    fn tangents_follow_the_u_direction() {
        let positions = vec![Vec3::zero(), Vec3::unit_x(), Vec3::unit_y()];
        let normals = vec![Vec3::unit_z(); 3];
        let texcoords = vec![Vec2::zero(), Vec2::unit_x(), Vec2::unit_y()];
        let tangents = compute_tangents(&positions, &normals, &texcoords, &[0, 1, 2]);
        for tangent in tangents {
            assert!((tangent.xyz() - Vec3::unit_x()).mag() < 1e-5);
            assert_eq!(tangent.w, 1.0);
        }

        // mirrored texture coordinates flip the handedness
        let mirrored = vec![Vec2::zero(), Vec2::unit_x(), -Vec2::unit_y()];
        let tangents = compute_tangents(&positions, &normals, &mirrored, &[0, 1, 2]);
        assert_eq!(tangents[0].w, -1.0);
    }

    #[test]
    fn degenerate_tangents_fall_back_to_a_perpendicular() {
        let positions = vec![Vec3::zero(), Vec3::unit_x(), Vec3::unit_y()];
        let texcoords = vec![Vec2::zero(); 3];
        for normal in [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()] {
            let normals = vec![normal; 3];
            let tangents = compute_tangents(&positions, &normals, &texcoords, &[0, 1, 2]);
            for tangent in tangents {
                assert_unit(tangent.xyz());
                assert!(tangent.xyz().dot(normal).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn cube_projection_picks_the_dominant_axis() {
        let uvs = cube_projection_uvs(&[
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(1.0, 1.0, 2.0),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::new(0.5, -4.0, 1.0),
            Vec3::zero(),
        ]);
        assert_eq!(uvs[0], Vec2::new(0.5, 0.5));
        assert_eq!(uvs[1], Vec2::new(0.75, 0.75));
        assert_eq!(uvs[2], Vec2::new(0.25, 0.5));
        assert_eq!(uvs[3], Vec2::new(0.5625, 0.625));
        assert_eq!(uvs[4], Vec2::zero());
        for uv in uvs {
            assert!((0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y));
        }
    }
}
