use anyhow::{anyhow, Result};
use std::mem::size_of_val;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::command_buffer::VulkanCommandBuffer;
use super::error::SetupError;
use super::{context::VulkanContext, device::VulkanDevice};

#[derive(Debug)]
pub struct VulkanBuffer;

impl VulkanBuffer {
    pub unsafe fn create(
        device: &VulkanDevice,
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.vk_device.create_buffer(&buffer_info, None)?;

        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);
        let memory_type = match find_memory_type(
            &context.memory_properties,
            requirements.memory_type_bits,
            properties,
        ) {
            Ok(memory_type) => memory_type,
            Err(err) => {
                device.vk_device.destroy_buffer(buffer, None);
                return Err(err);
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match device.vk_device.allocate_memory(&allocate_info, None) {
            Ok(memory) => memory,
            Err(err) => {
                device.vk_device.destroy_buffer(buffer, None);
                return Err(err.into());
            }
        };

        device.vk_device.bind_buffer_memory(buffer, memory, 0)?;

        Ok((buffer, memory))
    }

    pub unsafe fn destroy(
        device: &VulkanDevice,
        buffer: &mut vk::Buffer,
        memory: &mut vk::DeviceMemory,
    ) {
        if !buffer.is_null() {
            device.vk_device.destroy_buffer(*buffer, None);
            *buffer = vk::Buffer::null();
        }
        if !memory.is_null() {
            device.vk_device.free_memory(*memory, None);
            *memory = vk::DeviceMemory::null();
        }
    }

    pub unsafe fn copy(
        device: &VulkanDevice,
        context: &VulkanContext,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let (pool, command_buffer) = VulkanCommandBuffer::begin_single_use(device, context)?;

        let region = vk::BufferCopy::builder().size(size);
        device
            .vk_device
            .cmd_copy_buffer(command_buffer, src, dst, &[region]);

        VulkanCommandBuffer::end_single_use(device, context, pool, command_buffer)
    }

    /// Staging upload: host-visible source is filled, a device-local
    /// destination is created with `TRANSFER_DST | usage`, a one-shot copy
    /// is submitted and awaited, then the staging buffer is destroyed.
    /// Blocks the calling thread; only meant for startup uploads.
    pub unsafe fn upload_to_device_local<T>(
        device: &VulkanDevice,
        context: &VulkanContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let size = size_of_val(data) as vk::DeviceSize;

        let (mut staging_buffer, mut staging_memory) = VulkanBuffer::create(
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = (|| -> Result<(vk::Buffer, vk::DeviceMemory)> {
            let mapped =
                device
                    .vk_device
                    .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast(), data.len());
            device.vk_device.unmap_memory(staging_memory);

            let (mut dst_buffer, mut dst_memory) = VulkanBuffer::create(
                device,
                context,
                size,
                vk::BufferUsageFlags::TRANSFER_DST | usage,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;

            if let Err(err) = VulkanBuffer::copy(device, context, staging_buffer, dst_buffer, size)
            {
                VulkanBuffer::destroy(device, &mut dst_buffer, &mut dst_memory);
                return Err(err);
            }

            Ok((dst_buffer, dst_memory))
        })();

        VulkanBuffer::destroy(device, &mut staging_buffer, &mut staging_memory);
        result
    }
}

pub(crate) fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory.memory_type_count)
        .find(|i| {
            let suitable = (type_filter & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            suitable && memory_type.property_flags.contains(properties)
        })
        .ok_or_else(|| anyhow!(SetupError::NoMemoryType(type_filter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties() -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        memory
    }

    #[test]
    fn finds_matching_memory_type() {
        let memory = memory_properties();
        let index = find_memory_type(
            &memory,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_the_type_filter() {
        let memory = memory_properties();
        assert!(find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
        assert_eq!(
            find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn fails_when_no_type_matches() {
        let memory = memory_properties();
        assert!(
            find_memory_type(&memory, 0b11, vk::MemoryPropertyFlags::LAZILY_ALLOCATED).is_err()
        );
    }
}
