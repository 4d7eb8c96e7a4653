//! [`FrameBackend`] over real Vulkan queues and a swapchain

use ash::vk;

use super::{CommandRecorder, Fence, Semaphore, Swapchain, VulkanContext, VulkanError, VulkanResult};
use crate::render::frame::{AcquiredImage, FrameBackend};

/// Borrowed view of the objects the render loop touches each frame
///
/// The borrows keep the device, swapchain and recorded buffers alive for as
/// long as the backend is in use. It is cheap to build, so the renderer
/// makes a fresh one per frame.
pub struct VulkanFrameBackend<'a> {
    context: &'a VulkanContext,
    swapchain: &'a Swapchain,
    commands: &'a CommandRecorder,
}

impl<'a> VulkanFrameBackend<'a> {
    /// Borrow the context, the swapchain and the buffers recorded against it
    pub fn new(context: &'a VulkanContext, swapchain: &'a Swapchain, commands: &'a CommandRecorder) -> Self {
        Self {
            context,
            swapchain,
            commands,
        }
    }
}

impl FrameBackend for VulkanFrameBackend<'_> {
    type Semaphore = Semaphore;
    type Fence = Fence;
    type CommandBuffer = vk::CommandBuffer;

    fn create_semaphore(&self) -> VulkanResult<Semaphore> {
        Semaphore::new(self.context.device().clone())
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<Fence> {
        Fence::new(self.context.device().clone(), signaled)
    }

    fn wait_for_fence(&self, fence: &Fence, timeout: u64) -> VulkanResult<()> {
        fence.wait(timeout)
    }

    fn reset_fence(&self, fence: &Fence) -> VulkanResult<()> {
        fence.reset()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn acquire_next_image(&self, timeout: u64, signal: &Semaphore) -> VulkanResult<AcquiredImage> {
        let (index, suboptimal) = self.swapchain.acquire_next_image(timeout, signal.handle())?;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn command_buffer_for(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        usize::try_from(image_index)
            .ok()
            .and_then(|index| self.commands.buffer_for(index))
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No command buffer for image {image_index}"),
            })
    }

    fn submit(&self, buffer: vk::CommandBuffer, wait: &Semaphore, signal: &Semaphore, fence: &Fence) -> VulkanResult<()> {
        let wait_semaphores = [wait.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [buffer];
        let signal_semaphores = [signal.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], fence.handle())
                .map_err(VulkanError::from_vk)
        }
    }

    fn present(&self, image_index: u32, wait: &Semaphore) -> VulkanResult<bool> {
        self.swapchain.present(self.context.present_queue(), image_index, wait.handle())
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}
