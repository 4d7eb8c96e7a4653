//! Vulkan error types

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The swapchain no longer matches the surface; recreation is not supported
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// A finite wait expired before the GPU signaled
    #[error("Timed out waiting for the GPU")]
    Timeout,

    /// The logical device was lost
    #[error("Device lost")]
    DeviceLost,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device met the selection criteria
    #[error("No suitable GPU found")]
    NoSuitableDevice,
}

impl VulkanError {
    /// Classify a raw result code into the error kinds the render loop reacts to
    #[must_use]
    pub const fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            vk::Result::TIMEOUT => Self::Timeout,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Api(other),
        }
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::from_vk(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_classification() {
        assert_eq!(VulkanError::from_vk(vk::Result::ERROR_OUT_OF_DATE_KHR), VulkanError::SwapchainOutOfDate);
        assert_eq!(VulkanError::from_vk(vk::Result::TIMEOUT), VulkanError::Timeout);
        assert_eq!(VulkanError::from_vk(vk::Result::ERROR_DEVICE_LOST), VulkanError::DeviceLost);
        assert_eq!(
            VulkanError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        );
    }
}
