use ash::vk;
use bytemuck::{Pod, Zeroable};
use ultraviolet::Mat4;

use crate::scene::LoadedScene;

/// Layout of `VkAccelerationStructureInstanceKHR`, with the bitfields packed by hand.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuInstance {
    /// Row major 3x4
    pub transform: [f32; 12],
    pub instance_custom_index_and_mask: u32,
    pub instance_shader_binding_table_record_offset_and_flags: u32,
    pub acceleration_structure_reference: u64,
}

impl GpuInstance {
    pub fn new(
        world_matrix: &Mat4,
        custom_index: u32,
        mask: u8,
        shader_binding_table_offset: u32,
        flags: vk::GeometryInstanceFlagsKHR,
        acceleration_structure_reference: u64,
    ) -> Self {
        // ultraviolet is column major, the last row is dropped
        let mut transform = [0.0; 12];
        for row in 0..3 {
            for column in 0..4 {
                transform[row * 4 + column] = world_matrix.cols[column][row];
            }
        }

        Self {
            transform,
            instance_custom_index_and_mask: (custom_index & 0xFF_FFFF) | (mask as u32) << 24,
            instance_shader_binding_table_record_offset_and_flags: (shader_binding_table_offset
                & 0xFF_FFFF)
                | (flags.as_raw() & 0xFF) << 24,
            acceleration_structure_reference,
        }
    }

    pub fn custom_index(&self) -> u32 {
        self.instance_custom_index_and_mask & 0xFF_FFFF
    }

    pub fn mask(&self) -> u8 {
        (self.instance_custom_index_and_mask >> 24) as u8
    }

    pub fn flags(&self) -> vk::GeometryInstanceFlagsKHR {
        vk::GeometryInstanceFlagsKHR::from_raw(
            self.instance_shader_binding_table_record_offset_and_flags >> 24,
        )
    }
}

/// One instance per scene node. The custom index is the primitive mesh index, which is also
/// where shaders find the instance data. Nodes whose primitive has no BLAS are left out.
pub fn instances_from_nodes(
    scene: &LoadedScene,
    primitive_blas_addresses: &[Option<vk::DeviceAddress>],
) -> Vec<GpuInstance> {
    let mut instances = Vec::with_capacity(scene.nodes.len());
    for (node_index, node) in scene.nodes.iter().enumerate() {
        let Some(address) = primitive_blas_addresses
            .get(node.primitive_mesh)
            .copied()
            .flatten()
        else {
            log::warn!(
                "Node {} uses primitive mesh {} without a BLAS, it will not be traced",
                node_index,
                node.primitive_mesh
            );
            continue;
        };

        let primitive = &scene.primitive_meshes[node.primitive_mesh];
        let mut flags = vk::GeometryInstanceFlagsKHR::empty();
        if let Some(material) = scene.materials.get(primitive.material_index as usize) {
            if material.is_opaque() {
                flags |= vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE;
            }
            if material.double_sided {
                flags |= vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE;
            }
        }

        instances.push(GpuInstance::new(
            &node.world_matrix,
            node.primitive_mesh as u32,
            0xFF,
            0,
            flags,
            address,
        ));
    }
    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{cube_index_bytes, cube_vertices, load_raw};
    use crate::scene::{AlphaMode, Material, SceneNode};
    use ultraviolet::{Vec3, Vec4};

    #[test]
    fn instance_layout_matches_vulkan() {
        assert_eq!(
            std::mem::size_of::<GpuInstance>(),
            std::mem::size_of::<vk::AccelerationStructureInstanceKHR>()
        );
        assert_eq!(std::mem::size_of::<GpuInstance>(), 64);
    }

    #[test]
    fn transform_is_stored_row_major() {
        let matrix = Mat4::new(
            Vec4::new(4.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 5.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 6.0, 0.0),
            Vec4::new(1.0, 2.0, 3.0, 1.0),
        );
        let instance = GpuInstance::new(
            &matrix,
            7,
            0xFF,
            0,
            vk::GeometryInstanceFlagsKHR::empty(),
            0,
        );
        assert_eq!(
            instance.transform,
            [4.0, 0.0, 0.0, 1.0, 0.0, 5.0, 0.0, 2.0, 0.0, 0.0, 6.0, 3.0]
        );
        assert_eq!(instance.custom_index(), 7);
        assert_eq!(instance.mask(), 0xFF);
    }

    #[test]
    fn material_decides_instance_flags() {
        let mut scene = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();
        // raw geometry is opaque and double sided
        scene.materials.push(Material {
            alpha_mode: AlphaMode::Blend,
            base_color_factor: Vec4::new(1.0, 1.0, 1.0, 0.5),
            ..Material::default()
        });
        let mut blended = scene.primitive_meshes[0];
        blended.material_index = 1;
        scene.primitive_meshes.push(blended);
        scene.nodes.push(SceneNode {
            world_matrix: Mat4::from_translation(Vec3::unit_x()),
            primitive_mesh: 1,
        });

        let instances = instances_from_nodes(&scene, &[Some(0x100), Some(0x200)]);
        assert_eq!(instances.len(), 2);

        assert_eq!(
            instances[0].flags(),
            vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE
                | vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE
        );
        assert_eq!(instances[0].acceleration_structure_reference, 0x100);

        assert_eq!(instances[1].flags(), vk::GeometryInstanceFlagsKHR::empty());
        assert_eq!(instances[1].custom_index(), 1);
        assert_eq!(instances[1].acceleration_structure_reference, 0x200);
        assert_eq!(instances[1].transform[3], 1.0);
    }

    fn cube_flags(material: Material) -> vk::GeometryInstanceFlagsKHR {
        let mut scene = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();
        scene.materials[0] = material;
        instances_from_nodes(&scene, &[Some(0x100)])[0].flags()
    }

    #[test]
    fn opacity_and_culling_flags_are_independent() {
        let opaque_single_sided = Material {
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            ..Material::default()
        };
        assert_eq!(
            cube_flags(opaque_single_sided),
            vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE
        );

        let blended_double_sided = Material {
            alpha_mode: AlphaMode::Blend,
            base_color_factor: Vec4::new(1.0, 1.0, 1.0, 0.25),
            double_sided: true,
            ..Material::default()
        };
        assert_eq!(
            cube_flags(blended_double_sided),
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE
        );
    }

    #[test]
    fn blended_materials_without_coverage_are_opaque() {
        let solid = Material {
            alpha_mode: AlphaMode::Blend,
            base_color_factor: Vec4::one(),
            base_color_texture: -1,
            double_sided: false,
            ..Material::default()
        };
        assert_eq!(
            cube_flags(solid.clone()),
            vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE
        );

        // the texture may carry alpha
        let textured = Material {
            base_color_texture: 0,
            ..solid
        };
        assert_eq!(cube_flags(textured), vk::GeometryInstanceFlagsKHR::empty());
    }

    #[test]
    fn nodes_without_blas_are_skipped() {
        let mut scene = load_raw(&cube_vertices(), &cube_index_bytes(), 2).unwrap();
        scene.primitive_meshes.push(scene.primitive_meshes[0]);
        scene.nodes.push(SceneNode {
            world_matrix: Mat4::identity(),
            primitive_mesh: 1,
        });
        scene.nodes.push(SceneNode {
            world_matrix: Mat4::identity(),
            primitive_mesh: 0,
        });

        scene.nodes[2].world_matrix = Mat4::from_translation(Vec3::unit_y());

        let instances = instances_from_nodes(&scene, &[Some(0x100), None]);
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|i| i.custom_index() == 0));
        assert_eq!(instances[1].transform[7], 1.0);
    }
}
