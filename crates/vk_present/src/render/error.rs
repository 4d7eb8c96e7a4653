//! Bootstrap error types
//!
//! Every setup step returns a [`VulkanResult`]; [`StageExt::stage`] tags a
//! failure with the step it came from so the caller can report which part of
//! the bootstrap broke.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::render::vulkan::{VulkanError, VulkanResult, WindowError};

/// Bootstrap steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Loader and instance creation
    Instance,
    /// Validation layer message routing
    DebugMessenger,
    /// Window surface creation
    Surface,
    /// GPU selection
    PhysicalDevice,
    /// Logical device and queues
    LogicalDevice,
    /// Swapchain and image views
    Swapchain,
    /// Render pass
    RenderPass,
    /// Shader loading and pipeline creation
    Pipeline,
    /// One framebuffer per image view
    Framebuffers,
    /// Command pool and pre-recorded draws
    CommandBuffers,
    /// Flight slot semaphores and fences
    SyncObjects,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instance => "instance creation",
            Self::DebugMessenger => "debug messenger setup",
            Self::Surface => "surface creation",
            Self::PhysicalDevice => "physical device selection",
            Self::LogicalDevice => "logical device creation",
            Self::Swapchain => "swapchain creation",
            Self::RenderPass => "render pass creation",
            Self::Pipeline => "graphics pipeline creation",
            Self::Framebuffers => "framebuffer creation",
            Self::CommandBuffers => "command buffer recording",
            Self::SyncObjects => "sync object creation",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`crate::render::VulkanRenderer`]
#[derive(Error, Debug)]
pub enum RendererError {
    /// A bootstrap step failed
    #[error("{stage} failed: {source}")]
    Setup {
        /// Step that failed
        stage: SetupStage,
        /// Underlying Vulkan failure
        #[source]
        source: VulkanError,
    },

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RendererError {
    /// Bootstrap step that failed, if this is a setup failure
    pub fn stage(&self) -> Option<SetupStage> {
        match self {
            Self::Setup { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tag a Vulkan failure with the bootstrap step it belongs to
pub trait StageExt<T> {
    /// Convert into a [`RendererError::Setup`] for `stage`
    fn stage(self, stage: SetupStage) -> Result<T, RendererError>;
}

impl<T> StageExt<T> for VulkanResult<T> {
    fn stage(self, stage: SetupStage) -> Result<T, RendererError> {
        self.map_err(|source| RendererError::Setup { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging() {
        let result: VulkanResult<()> = Err(VulkanError::NoSuitableDevice);
        let error = result.stage(SetupStage::PhysicalDevice).unwrap_err();

        assert_eq!(error.stage(), Some(SetupStage::PhysicalDevice));
        assert_eq!(
            error.to_string(),
            "physical device selection failed: No suitable GPU found"
        );
    }

    #[test]
    fn test_success_passes_through() {
        let result: VulkanResult<u32> = Ok(3);
        assert_eq!(result.stage(SetupStage::Swapchain).unwrap(), 3);
    }

    #[test]
    fn test_config_errors_have_no_stage() {
        let error = RendererError::from(ConfigError::Invalid("bad".to_string()));
        assert_eq!(error.stage(), None);
    }
}
