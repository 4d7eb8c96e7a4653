//! Framebuffer management
//!
//! One framebuffer per swapchain image view, all bound to the same render pass.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::from_vk)?
        };

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// The render targets of a swapchain, index-aligned with its images
pub struct RenderTargetSet {
    framebuffers: Vec<Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderTargetSet {
    /// Create one framebuffer per image view
    ///
    /// All or nothing: if any creation fails the ones already built are
    /// dropped before the error is returned.
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffers = image_views
            .iter()
            .map(|&view| Framebuffer::new(device.clone(), render_pass, &[view], extent))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created {} framebuffers", framebuffers.len());

        Ok(Self { framebuffers, extent })
    }

    /// Number of framebuffers
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Whether the set holds no framebuffers
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Shared extent of every framebuffer
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Iterate framebuffers in image order
    pub fn iter(&self) -> impl Iterator<Item = &Framebuffer> {
        self.framebuffers.iter()
    }
}
