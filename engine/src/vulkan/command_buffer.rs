use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{constants, context::VulkanContext, device::VulkanDevice, pipeline};

#[derive(Debug)]
pub struct VulkanCommandBuffer;

impl VulkanCommandBuffer {
    /// One command pool and one primary buffer per in-flight frame slot.
    /// The pool is reset wholesale when its slot comes around again, so the
    /// buffers are never freed individually.
    pub unsafe fn create_per_frame(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        for _ in 0..constants::MAX_FRAMES_IN_FLIGHT {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .flags(vk::CommandPoolCreateFlags::empty())
                .queue_family_index(context.graphics_queue_family);
            let pool = device.vk_device.create_command_pool(&pool_info, None)?;

            let allocate_info = vk::CommandBufferAllocateInfo::builder()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffer = device.vk_device.allocate_command_buffers(&allocate_info)?[0];

            context.frame_command_pools.push(pool);
            context.frame_command_buffers.push(buffer);
        }

        Ok(())
    }

    pub unsafe fn destroy_per_frame(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .frame_command_pools
            .iter()
            .for_each(|p| device.vk_device.destroy_command_pool(*p, None));
        context.frame_command_pools.clear();
        context.frame_command_buffers.clear();
    }

    /// Records frame `frame`'s command buffer for the acquired image.
    pub unsafe fn record(
        device: &VulkanDevice,
        context: &VulkanContext,
        frame: usize,
        image_index: usize,
        clear_color: [f32; 4],
    ) -> Result<()> {
        device.vk_device.reset_command_pool(
            context.frame_command_pools[frame],
            vk::CommandPoolResetFlags::empty(),
        )?;

        let command_buffer = context.frame_command_buffers[frame];
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.vk_device.begin_command_buffer(command_buffer, &info)?;

        let render_area = vk::Rect2D::builder()
            .offset(vk::Offset2D::default())
            .extent(context.swapchain_extent);

        let color_clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        };

        let clear_values = &[color_clear_value];
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(context.render_pass)
            .framebuffer(context.framebuffers[image_index])
            .render_area(render_area)
            .clear_values(clear_values);

        device.vk_device.cmd_begin_render_pass(
            command_buffer,
            &info,
            vk::SubpassContents::INLINE,
        );

        device.vk_device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            context.pipeline,
        );

        let (viewport, scissor) = pipeline::letterbox_viewport(context.swapchain_extent);
        device
            .vk_device
            .cmd_set_viewport(command_buffer, 0, &[viewport]);
        device
            .vk_device
            .cmd_set_scissor(command_buffer, 0, &[scissor]);

        let vertex_buffers = &[context.vertex_buffer];
        let offsets = &[0_u64];
        device
            .vk_device
            .cmd_bind_vertex_buffers(command_buffer, 0, vertex_buffers, offsets);
        device.vk_device.cmd_bind_index_buffer(
            command_buffer,
            context.index_buffer,
            0,
            vk::IndexType::UINT16,
        );
        device.vk_device.cmd_bind_descriptor_sets(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            context.pipeline_layout,
            0,
            &[context.descriptor_set],
            &[],
        );

        device
            .vk_device
            .cmd_draw_indexed(command_buffer, context.index_count, 1, 0, 0, 0);
        device.vk_device.cmd_end_render_pass(command_buffer);

        device.vk_device.end_command_buffer(command_buffer)?;

        Ok(())
    }

    /// Creates a transient pool with a single recording buffer for one-shot
    /// transfer work.
    pub unsafe fn begin_single_use(
        device: &VulkanDevice,
        context: &VulkanContext,
    ) -> Result<(vk::CommandPool, vk::CommandBuffer)> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(context.graphics_queue_family);
        let pool = device.vk_device.create_command_pool(&pool_info, None)?;

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match device.vk_device.allocate_command_buffers(&allocate_info) {
            Ok(buffers) => buffers[0],
            Err(err) => {
                device.vk_device.destroy_command_pool(pool, None);
                return Err(err.into());
            }
        };

        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(err) = device.vk_device.begin_command_buffer(command_buffer, &info) {
            device.vk_device.destroy_command_pool(pool, None);
            return Err(err.into());
        }

        Ok((pool, command_buffer))
    }

    /// Submits the recording, blocks until the queue drains, and destroys
    /// the transient pool. Synchronous by design; only used for one-time
    /// startup uploads.
    pub unsafe fn end_single_use(
        device: &VulkanDevice,
        context: &VulkanContext,
        pool: vk::CommandPool,
        command_buffer: vk::CommandBuffer,
    ) -> Result<()> {
        let result = (|| -> Result<()> {
            device.vk_device.end_command_buffer(command_buffer)?;

            let command_buffers = &[command_buffer];
            let info = vk::SubmitInfo::builder().command_buffers(command_buffers);
            device
                .vk_device
                .queue_submit(context.graphics_queue, &[info], vk::Fence::null())?;
            device.vk_device.queue_wait_idle(context.graphics_queue)?;
            Ok(())
        })();

        device.vk_device.destroy_command_pool(pool, None);
        result
    }
}
