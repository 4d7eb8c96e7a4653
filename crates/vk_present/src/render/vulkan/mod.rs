//! Vulkan rendering backend
//!
//! Thin RAII wrappers over the Vulkan objects the presentation pipeline is
//! built from, plus the [`VulkanFrameBackend`] that lets the frame
//! synchronizer drive real queues.

pub mod commands;
pub mod context;
pub mod error;
pub mod frame_backend;
pub mod framebuffer;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use commands::{CommandPool, CommandRecorder};
pub use context::{PhysicalDeviceInfo, PresentationSurface, QueueFamilies, SurfaceSupport, VulkanContext};
pub use error::{VulkanError, VulkanResult};
pub use frame_backend::VulkanFrameBackend;
pub use framebuffer::{Framebuffer, RenderTargetSet};
pub use render_pass::RenderPass;
pub use shader::{GraphicsPipeline, ShaderModule};
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};
pub use window::{Window, WindowError};
