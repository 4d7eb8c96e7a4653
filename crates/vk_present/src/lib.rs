//! # vk_present
//!
//! Vulkan presentation bootstrap with a bounded frames-in-flight render loop.
//!
//! The crate builds the chain window surface → swapchain → render pass →
//! graphics pipeline → pre-recorded command buffers, then drives one frame
//! per [`render::VulkanRenderer::draw_frame`] call through the
//! [`render::frame::FrameSynchronizer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_present::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BootstrapConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut renderer = VulkanRenderer::new(&mut window, &config)?;
//!     renderer.run(&mut window);
//!     renderer.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for applications
pub mod prelude {
    pub use crate::{
        config::{BootstrapConfig, Config, ConfigError},
        foundation::logging,
        render::{
            frame::{FrameStats, FrameStatus},
            vulkan::{Window, WindowError},
            RendererError, SetupStage, VulkanRenderer,
        },
    };
}
