use thiserror::Error;
use vulkanalia::vk;

/// Initialization failures tagged with the stage that produced them.
///
/// Constructed at the failure site and wrapped in `anyhow!`, so callers can
/// log the precise stage and unwind deterministically.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no physical devices available")]
    NoPhysicalDevice,
    #[error("graphics queue cannot present to the surface")]
    PresentUnsupported,
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface does not support the requested swapchain image usage")]
    UnsupportedSwapchainUsage,
    #[error("unsupported image layout transition {0:?} -> {1:?}")]
    UnsupportedTransition(vk::ImageLayout, vk::ImageLayout),
    #[error("no suitable memory type for filter {0:#x}")]
    NoMemoryType(u32),
    #[error("shader bytecode at `{0}` is invalid")]
    InvalidShader(String),
    #[error("no texture candidate could be decoded")]
    NoTextureCandidate,
}
