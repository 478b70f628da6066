use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::constants;
use super::error::SetupError;
use super::image::VulkanImage;
use super::{context::VulkanContext, device::VulkanDevice};

#[derive(Debug)]
pub struct VulkanTexture;

impl VulkanTexture {
    /// Decodes the first usable candidate and uploads it as the quad
    /// texture, then creates the sampler.
    pub unsafe fn create(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let (pixels, width, height) = load_first_rgba8(constants::TEXTURE_CANDIDATES)?;

        let (image, memory, view) =
            VulkanImage::upload_rgba8(device, context, &pixels, width, height)?;
        context.texture_image = image;
        context.texture_image_memory = memory;
        context.texture_image_view = view;

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        context.texture_sampler = device.vk_device.create_sampler(&info, None)?;

        Ok(())
    }

    /// The set layout outlives swapchain recreation; the pipeline layout is
    /// rebuilt against it.
    pub unsafe fn create_descriptor_set_layout(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let bindings = &[vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];

        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        context.descriptor_set_layout =
            device.vk_device.create_descriptor_set_layout(&info, None)?;

        Ok(())
    }

    /// One pool, one set, written once with the quad texture.
    pub unsafe fn create_descriptor_set(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let pool_sizes = &[vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .build()];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(pool_sizes)
            .max_sets(1);
        context.descriptor_pool = device.vk_device.create_descriptor_pool(&pool_info, None)?;

        let set_layouts = &[context.descriptor_set_layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(set_layouts);
        context.descriptor_set = device.vk_device.allocate_descriptor_sets(&allocate_info)?[0];

        let image_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(context.texture_image_view)
            .sampler(context.texture_sampler);

        let image_infos = &[image_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(context.descriptor_set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(image_infos);

        device
            .vk_device
            .update_descriptor_sets(&[write], &[] as &[vk::CopyDescriptorSet]);

        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.descriptor_pool.is_null() {
            device
                .vk_device
                .destroy_descriptor_pool(context.descriptor_pool, None);
            context.descriptor_pool = vk::DescriptorPool::null();
            context.descriptor_set = vk::DescriptorSet::null();
        }
        if !context.descriptor_set_layout.is_null() {
            device
                .vk_device
                .destroy_descriptor_set_layout(context.descriptor_set_layout, None);
            context.descriptor_set_layout = vk::DescriptorSetLayout::null();
        }
        if !context.texture_sampler.is_null() {
            device
                .vk_device
                .destroy_sampler(context.texture_sampler, None);
            context.texture_sampler = vk::Sampler::null();
        }
        if !context.texture_image_view.is_null() {
            device
                .vk_device
                .destroy_image_view(context.texture_image_view, None);
            context.texture_image_view = vk::ImageView::null();
        }
        VulkanImage::destroy(
            device,
            &mut context.texture_image,
            &mut context.texture_image_memory,
        );
    }
}

/// Tries the candidates in order and returns the first one that decodes to
/// RGBA8. Failing every candidate is fatal to initialization.
pub(crate) fn load_first_rgba8(candidates: &[&str]) -> Result<(Vec<u8>, u32, u32)> {
    for path in candidates {
        match image::open(path) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                let (width, height) = (rgba.width(), rgba.height());
                info!("Loaded texture `{path}` ({width}x{height}).");
                return Ok((rgba.into_raw(), width, height));
            }
            Err(err) => {
                warn!("Texture candidate `{path}` unusable: {err}");
            }
        }
    }
    Err(anyhow!(SetupError::NoTextureCandidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_candidates_failing_is_an_error() {
        let result = load_first_rgba8(&["/nonexistent/a.png", "/nonexistent/b.png"]);
        assert!(result.is_err());
    }

    #[test]
    fn no_candidates_is_an_error() {
        assert!(load_first_rgba8(&[]).is_err());
    }
}
