pub mod acceleration_structure;
pub mod buffer;
pub mod command_buffer;
pub mod context;
pub mod descriptor_set;
pub mod device;
pub mod image;
pub mod query_pool;

#[cfg(test)]
pub mod mock_device;
