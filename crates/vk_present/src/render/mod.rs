//! Rendering: Vulkan objects, frame pacing and the renderer that ties them together

pub mod error;
pub mod frame;
pub mod renderer;
pub mod vulkan;

pub use error::{RendererError, SetupStage};
pub use renderer::{SwapchainResources, VulkanRenderer};
