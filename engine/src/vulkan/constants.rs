use vulkanalia::{vk, Version};

pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);
pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];

/// CPU may run ahead of the GPU by at most this many frames.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Logical render resolution letterboxed into the actual window.
pub const RENDER_WIDTH: f32 = 1240.0;
pub const RENDER_HEIGHT: f32 = 720.0;

pub const VERT_SHADER_PATH: &str = "shaders/vert.spv";
pub const FRAG_SHADER_PATH: &str = "shaders/frag.spv";

/// Texture candidates, tried in order; the first that decodes wins.
pub const TEXTURE_CANDIDATES: &[&str] = &["assets/quad.png", "quad.png", "../assets/quad.png"];
