pub mod compress;
pub mod shader_types;
