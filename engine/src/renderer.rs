use anyhow::Result;
use winit::window::Window;

use crate::vulkan::VulkanRenderer;

#[derive(Debug)]
pub struct Renderer {
    pub vk_renderer: VulkanRenderer,
}

impl Renderer {
    /// Creates the Vulkan backend for the given window.
    pub unsafe fn create(window: &Window) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window)?;

        Ok(Self { vk_renderer })
    }

    /// Renders one frame.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        self.vk_renderer.render(window)
    }

    /// Flags the swapchain for recreation on the next frame.
    pub fn mark_resized(&mut self) {
        self.vk_renderer.mark_resized();
    }
}
