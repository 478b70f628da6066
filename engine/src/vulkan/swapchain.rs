use anyhow::{anyhow, Result};
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};
use vulkanalia::vk::{KhrSurfaceExtension, KhrSwapchainExtension};
use vulkanalia::window as vk_window;
use winit::window::Window;

use super::{
    context::VulkanContext, device::VulkanDevice, error::SetupError, instance::VulkanInstance,
};

#[derive(Debug)]
pub struct VulkanSwapchain;

impl VulkanSwapchain {
    pub unsafe fn create_surface(
        window: &Window,
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.surface = vk_window::create_surface(&instance.vk_instance, window, window)?;
        Ok(())
    }

    /// Builds the swapchain and records its format and extent.
    ///
    /// The graphics queue must be able to present to the surface; this
    /// backend assumes a single universal queue.
    pub unsafe fn create(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        usage: vk::ImageUsageFlags,
    ) -> Result<()> {
        let supports_present = instance.vk_instance.get_physical_device_surface_support_khr(
            context.physical_device,
            context.graphics_queue_family,
            context.surface,
        )?;
        if !supports_present {
            return Err(anyhow!(SetupError::PresentUnsupported));
        }

        let capabilities = instance
            .vk_instance
            .get_physical_device_surface_capabilities_khr(context.physical_device, context.surface)?;
        if !capabilities.supported_usage_flags.contains(usage) {
            return Err(anyhow!(SetupError::UnsupportedSwapchainUsage));
        }

        let formats = instance
            .vk_instance
            .get_physical_device_surface_formats_khr(context.physical_device, context.surface)?;
        if formats.is_empty() {
            return Err(anyhow!(SetupError::NoSurfaceFormats));
        }

        // First reported format, no preference ranking.
        let surface_format = formats[0];
        let image_count = select_image_count(&capabilities);
        let extent = select_extent(&capabilities);

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        context.swapchain = device.vk_device.create_swapchain_khr(&info, None)?;
        context.swapchain_images = device.vk_device.get_swapchain_images_khr(context.swapchain)?;
        context.swapchain_format = surface_format.format;
        context.swapchain_extent = extent;

        Ok(())
    }

    pub unsafe fn create_image_views(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.swapchain_image_views = context
            .swapchain_images
            .iter()
            .map(|i| {
                let info = vk::ImageViewCreateInfo::builder()
                    .image(*i)
                    .view_type(vk::ImageViewType::_2D)
                    .format(context.swapchain_format)
                    .subresource_range(
                        vk::ImageSubresourceRange::builder()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1)
                            .build(),
                    );

                device.vk_device.create_image_view(&info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(())
    }

    /// Tears down views then the chain; a no-op if already destroyed.
    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        if context.swapchain.is_null() {
            return;
        }

        context
            .swapchain_image_views
            .iter()
            .for_each(|v| device.vk_device.destroy_image_view(*v, None));
        context.swapchain_image_views.clear();
        context.swapchain_images.clear();

        device.vk_device.destroy_swapchain_khr(context.swapchain, None);
        context.swapchain = vk::SwapchainKHR::null();
    }
}

/// Requests one image beyond the minimum, clamped to the maximum when the
/// surface reports one (zero means unbounded).
pub(crate) fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// Resolves the "must match window" sentinel to the minimum supported extent.
pub(crate) fn select_extent(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    let mut extent = capabilities.current_extent;
    if extent.width == u32::MAX {
        extent.width = capabilities.min_image_extent.width;
    }
    if extent.height == u32::MAX {
        extent.height = capabilities.min_image_extent.height;
    }
    extent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        assert_eq!(select_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn image_count_clamps_to_max() {
        assert_eq!(select_image_count(&capabilities(2, 2)), 2);
        assert_eq!(select_image_count(&capabilities(3, 8)), 4);
    }

    #[test]
    fn image_count_stays_within_reported_bounds() {
        for min in 1..8 {
            for max in [0, min, min + 1, min + 5] {
                let caps = capabilities(min, max);
                let count = select_image_count(&caps);
                assert!(count >= caps.min_image_count);
                if caps.max_image_count != 0 {
                    assert!(count <= caps.max_image_count);
                }
            }
        }
    }

    #[test]
    fn extent_passes_through_concrete_sizes() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = select_extent(&caps);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_resolves_sentinel_to_minimum() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            ..Default::default()
        };
        let extent = select_extent(&caps);
        assert_eq!((extent.width, extent.height), (1, 1));
    }
}
