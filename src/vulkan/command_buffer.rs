mod commands;
pub use commands::*;

use std::sync::Arc;

use crate::error::VulkanError;

use super::{buffer::UntypedBuffer, device::GpuDevice};

/// A command recorded for later submission.
#[derive(Debug, Clone)]
pub enum Cmd {
    CopyBuffer(CmdCopyBuffer),
    UpdateBuffer(CmdUpdateBuffer),
    CopyBufferToImage(CmdCopyBufferToImage),
    PipelineBarrier(CmdPipelineBarrier),
    ResetQueryPool(CmdResetQueryPool),
    BuildAccelerationStructure(CmdBuildAccelerationStructure),
    WriteAccelerationStructuresProperties(CmdWriteAccelerationStructuresProperties),
    CopyAccelerationStructure(CmdCopyAccelerationStructure),
}

/// Commands are collected here and only turn into a `vk::CommandBuffer` on submission.
#[must_use]
pub struct CommandBuffer {
    device: Arc<dyn GpuDevice>,
    commands: Vec<Cmd>,

    // staging buffers and the like, released once the submission has finished
    buffer_resources: Vec<Arc<UntypedBuffer>>,
}

impl CommandBuffer {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            commands: Vec::new(),
            buffer_resources: Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn add_cmd(&mut self, cmd: impl Into<Cmd>) {
        self.commands.push(cmd.into());
    }

    pub fn keep_alive(&mut self, buffer: Arc<UntypedBuffer>) {
        self.buffer_resources.push(buffer);
    }

    pub fn commands(&self) -> &[Cmd] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Blocks until the GPU is done, then releases everything kept alive for it.
    pub fn submit_and_wait(self) -> Result<(), VulkanError> {
        if !self.commands.is_empty() {
            self.device.submit_and_wait(&self.commands)?;
        }
        log::trace!(
            "Submitted {} commands, releasing {} staging buffers",
            self.commands.len(),
            self.buffer_resources.len()
        );
        Ok(())
    }
}
