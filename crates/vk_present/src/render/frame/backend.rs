//! The GPU operations the frame loop depends on
//!
//! [`FrameBackend`] is the boundary between the pacing protocol and the
//! device. The synchronizer only ever talks to the GPU through it, so the
//! protocol can be exercised against a simulated timeline.

use crate::render::vulkan::VulkanResult;

/// Result of a successful image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the swapchain's image list
    pub index: u32,
    /// The swapchain still works but no longer matches the surface exactly
    pub suboptimal: bool,
}

/// Device, queue and swapchain operations used by one frame
///
/// Semaphores are only waited on and signaled by the GPU. Fences are
/// signaled by the GPU and waited on by the host. Every submission waits
/// on its semaphore at the color attachment output stage, so vertex work may
/// start before the image is actually available.
pub trait FrameBackend {
    /// GPU-GPU ordering primitive; released when dropped
    type Semaphore;
    /// GPU-host completion primitive; released when dropped
    type Fence;
    /// Pre-recorded work for one swapchain image
    type CommandBuffer: Copy;

    /// Create an unsignaled binary semaphore
    fn create_semaphore(&self) -> VulkanResult<Self::Semaphore>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<Self::Fence>;

    /// Block until `fence` is signaled or `timeout` nanoseconds pass
    fn wait_for_fence(&self, fence: &Self::Fence, timeout: u64) -> VulkanResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: &Self::Fence) -> VulkanResult<()>;

    /// Number of presentable images
    fn image_count(&self) -> usize;

    /// Request the next presentable image; `signal` fires once it can be written
    fn acquire_next_image(&self, timeout: u64, signal: &Self::Semaphore) -> VulkanResult<AcquiredImage>;

    /// Command buffer recorded against the framebuffer of `image_index`
    fn command_buffer_for(&self, image_index: u32) -> VulkanResult<Self::CommandBuffer>;

    /// Submit `buffer` to the graphics queue
    fn submit(
        &self,
        buffer: Self::CommandBuffer,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> VulkanResult<()>;

    /// Queue `image_index` for presentation after `wait`; returns whether the swapchain is suboptimal
    fn present(&self, image_index: u32, wait: &Self::Semaphore) -> VulkanResult<bool>;

    /// Block until the device has no outstanding work
    fn wait_idle(&self) -> VulkanResult<()>;
}
