use std::{ops::Deref, sync::Arc};

use ash::vk;

use crate::error::VulkanError;

use super::device::GpuDevice;

pub struct QueryPool {
    inner: vk::QueryPool,
    query_type: vk::QueryType,
    query_count: u32,
    device: Arc<dyn GpuDevice>,
}

impl QueryPool {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        query_type: vk::QueryType,
        query_count: u32,
    ) -> Result<Self, VulkanError> {
        let inner = device.create_query_pool(query_type, query_count)?;
        Ok(Self {
            inner,
            query_type,
            query_count,
            device,
        })
    }

    pub fn query_type(&self) -> vk::QueryType {
        self.query_type
    }

    pub fn query_count(&self) -> u32 {
        self.query_count
    }

    /// Waits for and reads back `count` 64 bit results starting at query 0.
    pub fn get_results(&self, count: u32) -> Result<Vec<u64>, VulkanError> {
        debug_assert!(count <= self.query_count);
        self.device.get_query_pool_results(self.inner, 0, count)
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        self.device.destroy_query_pool(self.inner);
    }
}

impl Deref for QueryPool {
    type Target = vk::QueryPool;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
