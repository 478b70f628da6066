use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension},
    Entry,
};
use winit::window::Window;

use buffer::VulkanBuffer;
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use device::VulkanDevice;
use framebuffer::VulkanFramebuffer;
use instance::VulkanInstance;
use pipeline::{Vertex, VulkanPipeline};
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;
use texture::VulkanTexture;

mod buffer;
mod command_buffer;
mod constants;
mod context;
mod device;
mod error;
mod framebuffer;
mod image;
mod instance;
mod pipeline;
mod render_pass;
mod swapchain;
mod texture;

/// The one piece of geometry this renderer draws: a centered textured quad.
const VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 1.0, 1.0], [0.0, 0.0]),
    Vertex::new([0.5, -0.5], [1.0, 1.0, 1.0], [1.0, 0.0]),
    Vertex::new([0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Phase advance per rendered frame for the animated clear color.
const CLEAR_COLOR_STEP: f32 = 0.002;

#[derive(Debug)]
pub struct VulkanRenderer {
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    /// Current in-flight frame slot, cycling modulo `MAX_FRAMES_IN_FLIGHT`.
    frame: usize,
    /// Set by the window layer on resize; consumed after presentation.
    resized: bool,
    color_phase: f32,
    destroyed: bool,
}

impl VulkanRenderer {
    pub unsafe fn new(window: &Window) -> Result<VulkanRenderer> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        let mut context = VulkanContext::default();
        let mut instance = VulkanInstance::new(window, &entry, &mut context)?;

        // The surface must exist before device selection so present support
        // can be checked against it.
        if let Err(err) = VulkanSwapchain::create_surface(window, &instance, &mut context) {
            instance.destroy(&mut context);
            return Err(err);
        }

        let device = match VulkanDevice::new(&entry, &instance, &mut context) {
            Ok(device) => device,
            Err(err) => {
                instance.destroy(&mut context);
                return Err(err);
            }
        };

        // From here on the renderer owns everything; a failure partway
        // through resource setup unwinds through the normal teardown path,
        // which tolerates whatever was not yet created.
        let mut renderer = VulkanRenderer {
            _entry: entry,
            instance,
            device,
            context,
            frame: 0,
            resized: false,
            color_phase: 0.0,
            destroyed: false,
        };

        if let Err(err) = renderer.init_resources() {
            renderer.destroy();
            return Err(err);
        }

        Ok(renderer)
    }

    unsafe fn init_resources(&mut self) -> Result<()> {
        let Self {
            instance,
            device,
            context,
            ..
        } = self;

        VulkanSwapchain::create(
            instance,
            device,
            context,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanRenderPass::create(device, context)?;
        VulkanTexture::create_descriptor_set_layout(device, context)?;
        VulkanPipeline::create(device, context)?;
        VulkanFramebuffer::create(device, context)?;
        VulkanCommandBuffer::create_per_frame(device, context)?;

        VulkanTexture::create(device, context)?;

        let (vertex_buffer, vertex_memory) = VulkanBuffer::upload_to_device_local(
            device,
            context,
            &VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        context.vertex_buffer = vertex_buffer;
        context.vertex_buffer_memory = vertex_memory;

        let (index_buffer, index_memory) = VulkanBuffer::upload_to_device_local(
            device,
            context,
            &INDICES,
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        context.index_buffer = index_buffer;
        context.index_buffer_memory = index_memory;
        context.index_count = INDICES.len() as u32;

        VulkanTexture::create_descriptor_set(device, context)?;

        VulkanRenderer::create_sync_objects(device, context)?;

        Ok(())
    }

    /// Per-frame objects live for the process; per-image objects are
    /// rebuilt alongside the swapchain.
    unsafe fn create_sync_objects(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each frame slot passes immediately.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..constants::MAX_FRAMES_IN_FLIGHT {
            context
                .image_available_semaphores
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
            context
                .in_flight_fences
                .push(device.vk_device.create_fence(&fence_info, None)?);
        }

        VulkanRenderer::create_per_image_sync(device, context)
    }

    unsafe fn create_per_image_sync(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        for _ in 0..context.swapchain_images.len() {
            context
                .render_finished_semaphores
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
        }

        context.images_in_flight = context
            .swapchain_images
            .iter()
            .map(|_| vk::Fence::null())
            .collect();

        Ok(())
    }

    unsafe fn destroy_per_image_sync(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .render_finished_semaphores
            .iter()
            .for_each(|s| device.vk_device.destroy_semaphore(*s, None));
        context.render_finished_semaphores.clear();
        context.images_in_flight.clear();
    }

    unsafe fn destroy_per_frame_sync(device: &VulkanDevice, context: &mut VulkanContext) {
        context
            .in_flight_fences
            .iter()
            .for_each(|f| device.vk_device.destroy_fence(*f, None));
        context.in_flight_fences.clear();
        context
            .image_available_semaphores
            .iter()
            .for_each(|s| device.vk_device.destroy_semaphore(*s, None));
        context.image_available_semaphores.clear();
    }

    /// Renders and presents one frame.
    ///
    /// An out-of-date swapchain at acquire or present triggers recreation
    /// and is not an error; every other Vulkan failure propagates and ends
    /// the frame loop.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        let in_flight_fence = self.context.in_flight_fences[self.frame];
        self.device
            .vk_device
            .wait_for_fences(&[in_flight_fence], true, u64::MAX)?;

        if self.resized {
            return self.recreate_swapchain(window);
        }

        let result = self.device.vk_device.acquire_next_image_khr(
            self.context.swapchain,
            u64::MAX,
            self.context.image_available_semaphores[self.frame],
            vk::Fence::null(),
        );

        // A suboptimal acquire still renders this frame; the chain is
        // rebuilt after presenting it.
        let (image_index, mut stale) = match result {
            Ok((image_index, code)) => {
                (image_index as usize, code == vk::SuccessCode::SUBOPTIMAL_KHR)
            }
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => return self.recreate_swapchain(window),
            Err(e) => return Err(anyhow!(e)),
        };

        // The image may still be in use by an earlier frame slot.
        if !self.context.images_in_flight[image_index].is_null() {
            self.device.vk_device.wait_for_fences(
                &[self.context.images_in_flight[image_index]],
                true,
                u64::MAX,
            )?;
        }
        self.context.images_in_flight[image_index] = in_flight_fence;

        self.color_phase = (self.color_phase + CLEAR_COLOR_STEP) % 1.0;
        VulkanCommandBuffer::record(
            &self.device,
            &self.context,
            self.frame,
            image_index,
            clear_color(self.color_phase),
        )?;

        let wait_semaphores = &[self.context.image_available_semaphores[self.frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.context.frame_command_buffers[self.frame]];
        let signal_semaphores = &[self.context.render_finished_semaphores[image_index]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        // Reset only after the work for this slot is definitely submitted
        // next; resetting earlier could deadlock the slot on a failed submit.
        self.device.vk_device.reset_fences(&[in_flight_fence])?;

        self.device.vk_device.queue_submit(
            self.context.graphics_queue,
            &[submit_info],
            in_flight_fence,
        )?;

        let swapchains = &[self.context.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = self
            .device
            .vk_device
            .queue_present_khr(self.context.graphics_queue, &present_info);

        self.frame = (self.frame + 1) % constants::MAX_FRAMES_IN_FLIGHT;

        stale = stale
            || result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);
        if self.resized || stale {
            self.recreate_swapchain(window)?;
        } else if let Err(e) = result {
            return Err(anyhow!(e));
        }

        Ok(())
    }

    pub fn mark_resized(&mut self) {
        self.resized = true;
    }

    /// Tears down everything that depends on the swapchain and rebuilds it
    /// against the window's current size. A zero-area window defers the
    /// rebuild until the next resize gives it drawable area.
    unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.resized = true;
            return Ok(());
        }
        self.resized = false;

        debug!("Recreating swapchain ({}x{}).", size.width, size.height);
        self.device.vk_device.device_wait_idle()?;
        self.destroy_swapchain_resources();

        let Self {
            instance,
            device,
            context,
            ..
        } = self;

        VulkanSwapchain::create(
            instance,
            device,
            context,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanRenderPass::create(device, context)?;
        VulkanPipeline::create(device, context)?;
        VulkanFramebuffer::create(device, context)?;
        VulkanRenderer::create_per_image_sync(device, context)?;

        Ok(())
    }

    unsafe fn destroy_swapchain_resources(&mut self) {
        let Self {
            device, context, ..
        } = self;

        VulkanFramebuffer::destroy(device, context);
        VulkanPipeline::destroy(device, context);
        VulkanRenderPass::destroy(device, context);
        VulkanRenderer::destroy_per_image_sync(device, context);
        VulkanSwapchain::destroy(device, context);
    }

    /// Full teardown in reverse creation order. Safe to call on a partially
    /// constructed renderer and idempotent; `Drop` routes here as well.
    pub unsafe fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Err(err) = self.device.vk_device.device_wait_idle() {
            warn!("Device did not reach idle before teardown: {err}");
        }

        self.destroy_swapchain_resources();

        let Self {
            instance,
            device,
            context,
            ..
        } = self;

        VulkanRenderer::destroy_per_frame_sync(device, context);
        VulkanCommandBuffer::destroy_per_frame(device, context);
        VulkanBuffer::destroy(
            device,
            &mut context.index_buffer,
            &mut context.index_buffer_memory,
        );
        VulkanBuffer::destroy(
            device,
            &mut context.vertex_buffer,
            &mut context.vertex_buffer_memory,
        );
        VulkanTexture::destroy(device, context);
        device.destroy();
        instance.destroy(context);
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        unsafe { self.destroy() };
    }
}

/// Opaque clear color whose green channel sweeps [0, 1) with `phase`.
fn clear_color(phase: f32) -> [f32; 4] {
    [0.0, phase, 0.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_indices_reference_every_vertex() {
        assert_eq!(INDICES.len(), 6);
        for index in INDICES {
            assert!((index as usize) < VERTICES.len());
        }
        for vertex in 0..VERTICES.len() as u16 {
            assert!(INDICES.contains(&vertex));
        }
    }

    #[test]
    fn clear_color_sweeps_only_the_green_channel() {
        let mut phase = 0.0_f32;
        for _ in 0..2000 {
            phase = (phase + CLEAR_COLOR_STEP) % 1.0;
            let [r, g, b, a] = clear_color(phase);
            assert_eq!(r, 0.0);
            assert_eq!(b, 0.0);
            assert!((0.0..1.0).contains(&g));
            assert_eq!(a, 1.0);
            assert!((0.0..1.0).contains(&phase));
        }
    }

    #[test]
    fn frame_slot_wraps_within_bounds() {
        let mut frame = 0;
        for _ in 0..10 {
            frame = (frame + 1) % constants::MAX_FRAMES_IN_FLIGHT;
            assert!(frame < constants::MAX_FRAMES_IN_FLIGHT);
        }
    }
}
