//! Command buffer management
//!
//! The draw commands never change, so every swapchain image gets one primary
//! buffer recorded once at startup and resubmitted each time that image comes
//! round again.

use ash::{vk, Device};

use super::{Framebuffer, RenderTargetSet, VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
///
/// Dropping the pool frees its buffers. The owner is responsible for the
/// device being idle first.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::empty())
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::from_vk)?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::from_vk)
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Type-safe recording of a single command buffer
pub struct RecordingBuffer {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl RecordingBuffer {
    /// Wrap an allocated command buffer
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin command recording
    ///
    /// No `ONE_TIME_SUBMIT`: the buffer is submitted once per frame that
    /// lands on its image.
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder();

        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::from_vk)?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Begin render pass
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::from_vk)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Render pass scope; ends the pass when dropped
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut RecordingBuffer,
}

impl ActiveRenderPass<'_> {
    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Non-indexed draw
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.recorder.device.cmd_draw(
                self.recorder.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

/// Pre-recorded draw commands, one buffer per swapchain image
pub struct CommandRecorder {
    buffers: Vec<vk::CommandBuffer>,
    // Frees the buffers on drop
    _pool: CommandPool,
}

impl CommandRecorder {
    /// Allocate and record one buffer per render target
    ///
    /// Each buffer clears its framebuffer, binds `pipeline` and draws three
    /// vertices. Any failure drops the pool, which frees every buffer.
    pub fn record(
        device: &Device,
        queue_family_index: u32,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        targets: &RenderTargetSet,
        clear_color: [f32; 4],
    ) -> VulkanResult<Self> {
        let pool = CommandPool::new(device.clone(), queue_family_index)?;
        let count = u32::try_from(targets.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("Too many render targets: {}", targets.len()),
        })?;
        let buffers = pool.allocate_command_buffers(count)?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: targets.extent(),
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];

        for (&buffer, framebuffer) in buffers.iter().zip(targets.iter()) {
            record_draw(device, buffer, render_pass, pipeline, framebuffer, render_area, &clear_values)?;
        }

        log::debug!("Recorded {} command buffers", buffers.len());

        Ok(Self { buffers, _pool: pool })
    }

    /// Buffer recorded against the framebuffer of `image_index`
    pub fn buffer_for(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index).copied()
    }

    /// All buffers in image order
    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }
}

fn record_draw(
    device: &Device,
    buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    framebuffer: &Framebuffer,
    render_area: vk::Rect2D,
    clear_values: &[vk::ClearValue],
) -> VulkanResult<()> {
    let mut recorder = RecordingBuffer::new(buffer, device.clone());
    recorder.begin()?;
    {
        let mut pass = recorder.begin_render_pass(render_pass, framebuffer.handle(), render_area, clear_values)?;
        pass.bind_pipeline(pipeline);
        pass.draw(3, 1, 0, 0);
    }
    recorder.end()?;
    Ok(())
}
