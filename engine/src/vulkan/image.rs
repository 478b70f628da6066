use anyhow::{anyhow, Result};
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::buffer::{find_memory_type, VulkanBuffer};
use super::command_buffer::VulkanCommandBuffer;
use super::error::SetupError;
use super::{context::VulkanContext, device::VulkanDevice};

#[derive(Debug)]
pub struct VulkanImage;

impl VulkanImage {
    pub unsafe fn create(
        device: &VulkanDevice,
        context: &VulkanContext,
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = device.vk_device.create_image(&info, None)?;

        let requirements = device.vk_device.get_image_memory_requirements(image);
        let memory_type = match find_memory_type(
            &context.memory_properties,
            requirements.memory_type_bits,
            properties,
        ) {
            Ok(memory_type) => memory_type,
            Err(err) => {
                device.vk_device.destroy_image(image, None);
                return Err(err);
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match device.vk_device.allocate_memory(&allocate_info, None) {
            Ok(memory) => memory,
            Err(err) => {
                device.vk_device.destroy_image(image, None);
                return Err(err.into());
            }
        };

        device.vk_device.bind_image_memory(image, memory, 0)?;

        Ok((image, memory))
    }

    pub unsafe fn destroy(
        device: &VulkanDevice,
        image: &mut vk::Image,
        memory: &mut vk::DeviceMemory,
    ) {
        if !image.is_null() {
            device.vk_device.destroy_image(*image, None);
            *image = vk::Image::null();
        }
        if !memory.is_null() {
            device.vk_device.free_memory(*memory, None);
            *memory = vk::DeviceMemory::null();
        }
    }

    pub unsafe fn create_view(
        device: &VulkanDevice,
        image: vk::Image,
        format: vk::Format,
        aspects: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::builder()
                    .aspect_mask(aspects)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1)
                    .build(),
            );

        Ok(device.vk_device.create_image_view(&info, None)?)
    }

    /// Transitions between the two layouts the upload path needs via a
    /// single-use command buffer.
    pub unsafe fn transition_layout(
        device: &VulkanDevice,
        context: &VulkanContext,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        aspects: vk::ImageAspectFlags,
    ) -> Result<()> {
        let (src_access_mask, dst_access_mask, src_stage_mask, dst_stage_mask) =
            transition_masks(old_layout, new_layout)?;

        let (pool, command_buffer) = VulkanCommandBuffer::begin_single_use(device, context)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::builder()
                    .aspect_mask(aspects)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1)
                    .build(),
            )
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask);

        device.vk_device.cmd_pipeline_barrier(
            command_buffer,
            src_stage_mask,
            dst_stage_mask,
            vk::DependencyFlags::empty(),
            &[] as &[vk::MemoryBarrier],
            &[] as &[vk::BufferMemoryBarrier],
            &[barrier],
        );

        VulkanCommandBuffer::end_single_use(device, context, pool, command_buffer)
    }

    pub unsafe fn copy_from_buffer(
        device: &VulkanDevice,
        context: &VulkanContext,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let (pool, command_buffer) = VulkanCommandBuffer::begin_single_use(device, context)?;

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1)
                    .build(),
            )
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        device.vk_device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        VulkanCommandBuffer::end_single_use(device, context, pool, command_buffer)
    }

    /// Stages the pixel data, creates a device-local sRGB image, runs the
    /// two layout transitions around the copy, and returns the image with
    /// its view. Blocks until the transfer queue drains.
    pub unsafe fn upload_rgba8(
        device: &VulkanDevice,
        context: &VulkanContext,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
        let size = u64::from(width) * u64::from(height) * 4;
        debug_assert_eq!(pixels.len() as u64, size);

        let (mut staging_buffer, mut staging_memory) = VulkanBuffer::create(
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = (|| -> Result<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
            let mapped =
                device
                    .vk_device
                    .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(pixels.as_ptr(), mapped.cast(), pixels.len());
            device.vk_device.unmap_memory(staging_memory);

            let (mut image, mut memory) = VulkanImage::create(
                device,
                context,
                width,
                height,
                vk::Format::R8G8B8A8_SRGB,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;

            let view = (|| -> Result<vk::ImageView> {
                VulkanImage::transition_layout(
                    device,
                    context,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageAspectFlags::COLOR,
                )?;
                VulkanImage::copy_from_buffer(device, context, staging_buffer, image, width, height)?;
                VulkanImage::transition_layout(
                    device,
                    context,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageAspectFlags::COLOR,
                )?;
                VulkanImage::create_view(
                    device,
                    image,
                    vk::Format::R8G8B8A8_SRGB,
                    vk::ImageAspectFlags::COLOR,
                )
            })();

            match view {
                Ok(view) => Ok((image, memory, view)),
                Err(err) => {
                    VulkanImage::destroy(device, &mut image, &mut memory);
                    Err(err)
                }
            }
        })();

        VulkanBuffer::destroy(device, &mut staging_buffer, &mut staging_memory);
        result
    }
}

/// Access and stage masks for the two supported transitions. Anything else
/// is rejected rather than guessed at.
pub(crate) fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => Err(anyhow!(SetupError::UnsupportedTransition(
            old_layout, new_layout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_are_supported() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .is_err());
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
        .is_err());
    }
}
