//! Presentation renderer
//!
//! Runs the bootstrap in order, owns everything it creates, and tears it
//! down in exactly the reverse order. Fields are declared newest first so
//! that the implicit drop order is the teardown order.

use ash::vk;

use super::error::{RendererError, SetupStage, StageExt};
use super::frame::{FrameStage, FrameStats, FrameStatus, FrameSynchronizer, FrameTimeouts};
use super::vulkan::{
    CommandRecorder, Fence, GraphicsPipeline, RenderPass, RenderTargetSet, Semaphore, ShaderModule, Swapchain,
    VulkanContext, VulkanError, VulkanFrameBackend, VulkanResult, Window,
};
use crate::config::BootstrapConfig;

/// Everything that is sized or formatted by the swapchain
///
/// Images, views, framebuffers and command buffers are index-aligned: entry
/// `i` of each belongs to swapchain image `i`.
pub struct SwapchainResources {
    commands: CommandRecorder,
    _targets: RenderTargetSet,
    _pipeline: GraphicsPipeline,
    _render_pass: RenderPass,
    swapchain: Swapchain,
}

impl SwapchainResources {
    /// Build swapchain, render pass, pipeline, framebuffers and command buffers
    pub fn new(context: &VulkanContext, window: &Window, config: &BootstrapConfig) -> Result<Self, RendererError> {
        let device = context.device();

        let support = context
            .surface()
            .support(context.physical_device().device)
            .stage(SetupStage::Swapchain)?;
        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.surface().handle(),
            &support,
            context.families(),
            vk::Extent2D { width, height },
        )
        .stage(SetupStage::Swapchain)?;

        let render_pass =
            RenderPass::new_present_pass(device.clone(), swapchain.format().format).stage(SetupStage::RenderPass)?;

        // Shader modules are only needed until the pipeline exists
        let pipeline = {
            let vertex = ShaderModule::from_file(device.clone(), &config.shaders.vertex_shader_path)
                .stage(SetupStage::Pipeline)?;
            let fragment = ShaderModule::from_file(device.clone(), &config.shaders.fragment_shader_path)
                .stage(SetupStage::Pipeline)?;
            GraphicsPipeline::new(device.clone(), render_pass.handle(), &vertex, &fragment, swapchain.extent())
                .stage(SetupStage::Pipeline)?
        };

        let targets = RenderTargetSet::new(device, render_pass.handle(), swapchain.image_views(), swapchain.extent())
            .stage(SetupStage::Framebuffers)?;

        let commands = CommandRecorder::record(
            device,
            context.families().graphics,
            render_pass.handle(),
            pipeline.handle(),
            &targets,
            config.clear_color,
        )
        .stage(SetupStage::CommandBuffers)?;

        check_aligned(swapchain.image_count(), targets.len(), commands.buffers().len())
            .stage(SetupStage::CommandBuffers)?;

        let extent = swapchain.extent();
        log::info!(
            "Swapchain ready: {} images, {}x{}, {:?}",
            swapchain.image_count(),
            extent.width,
            extent.height,
            swapchain.present_mode()
        );

        Ok(Self {
            commands,
            _targets: targets,
            _pipeline: pipeline,
            _render_pass: render_pass,
            swapchain,
        })
    }

    /// Per-frame view over the queues, swapchain and recorded buffers
    pub fn frame_backend<'a>(&'a self, context: &'a VulkanContext) -> VulkanFrameBackend<'a> {
        VulkanFrameBackend::new(context, &self.swapchain, &self.commands)
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }
}

fn check_aligned(images: usize, framebuffers: usize, command_buffers: usize) -> VulkanResult<()> {
    if images == framebuffers && framebuffers == command_buffers {
        Ok(())
    } else {
        Err(VulkanError::InvalidOperation {
            reason: format!(
                "{images} images, {framebuffers} framebuffers and {command_buffers} command buffers do not line up"
            ),
        })
    }
}

/// Owns the whole presentation pipeline and drives the frame loop
pub struct VulkanRenderer {
    frames: Option<FrameSynchronizer<Semaphore, Fence>>,
    resources: SwapchainResources,
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Run every bootstrap step; the first failure aborts with its stage
    pub fn new(window: &mut Window, config: &BootstrapConfig) -> Result<Self, RendererError> {
        config.validate()?;

        let context = VulkanContext::new(window, config)?;
        let resources = SwapchainResources::new(&context, window, config)?;

        let frames = FrameSynchronizer::new(
            &resources.frame_backend(&context),
            config.max_frames_in_flight,
            FrameTimeouts::from(&config.timeouts),
        )
        .stage(SetupStage::SyncObjects)?;

        log::info!(
            "Renderer ready: {} frames in flight over {} images (validation {})",
            frames.frames_in_flight(),
            resources.image_count(),
            if context.has_debug_reporter() { "on" } else { "off" }
        );

        Ok(Self {
            frames: Some(frames),
            resources,
            context,
        })
    }

    /// Render and present one frame
    pub fn draw_frame(&mut self) -> FrameStatus {
        let Some(frames) = self.frames.as_mut() else {
            return FrameStatus::Dropped {
                slot: 0,
                stage: FrameStage::Throttle,
                error: VulkanError::InvalidOperation {
                    reason: "Renderer has been shut down".to_string(),
                },
            };
        };

        frames.step(&self.resources.frame_backend(&self.context))
    }

    /// Poll window events and draw until the window asks to close
    pub fn run(&mut self, window: &mut Window) -> FrameStats {
        log::info!("Entering render loop");

        while !window.should_close() {
            window.poll_events();
            self.draw_frame();
        }

        let stats = self.stats();
        log::info!(
            "Render loop finished: {} presented, {} dropped",
            stats.presented,
            stats.dropped
        );
        stats
    }

    /// Frame totals so far
    pub fn stats(&self) -> FrameStats {
        self.frames.as_ref().map(FrameSynchronizer::stats).unwrap_or_default()
    }

    /// Wait for the GPU, then release everything in reverse creation order
    pub fn shutdown(mut self) -> VulkanResult<()> {
        let result = match self.frames.take() {
            Some(frames) => frames.shutdown(&self.resources.frame_backend(&self.context)),
            None => self.context.wait_idle(),
        };
        log::info!("Renderer shut down");
        result
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Some(frames) = self.frames.take() {
            if let Err(e) = frames.shutdown(&self.resources.frame_backend(&self.context)) {
                log::error!("Renderer dropped without a clean idle: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_counts_must_line_up() {
        assert!(check_aligned(3, 3, 3).is_ok());
        assert!(matches!(
            check_aligned(3, 2, 3),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(check_aligned(2, 2, 3).is_err());
    }
}
