// Descriptor plumbing for the view-projection uniform block
//
// One uniform buffer and one descriptor set per swapchain image, so the
// frame being recorded never writes the block a previous frame still reads.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::{buffer, VulkanDevice};

/// Uniform block read by the vertex shader at set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UboViewProjection {
    pub projection: Mat4,
    pub view: Mat4,
}

/// Layout: a single vertex-stage uniform buffer binding
pub fn create_descriptor_set_layout(device: &VulkanDevice) -> Result<vk::DescriptorSetLayout> {
    let vp_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .build();

    let bindings = [vp_binding];
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    unsafe {
        device
            .device
            .create_descriptor_set_layout(&layout_info, None)
            .context("Failed to create descriptor set layout")
    }
}

/// Per-image uniform buffers holding the view-projection block
pub fn create_uniform_buffers(
    device: &VulkanDevice,
    count: usize,
) -> Result<Vec<(vk::Buffer, vk::DeviceMemory)>> {
    let size = std::mem::size_of::<UboViewProjection>() as vk::DeviceSize;

    (0..count)
        .map(|_| {
            buffer::create_buffer(
                device,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
        })
        .collect()
}

pub fn create_descriptor_pool(device: &VulkanDevice, count: u32) -> Result<vk::DescriptorPool> {
    let pool_sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: count,
    }];

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(count)
        .pool_sizes(&pool_sizes);

    unsafe {
        device
            .device
            .create_descriptor_pool(&pool_info, None)
            .context("Failed to create descriptor pool")
    }
}

/// Allocate one set per uniform buffer and point each at its buffer
pub fn create_descriptor_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform_buffers: &[(vk::Buffer, vk::DeviceMemory)],
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; uniform_buffers.len()];

    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe {
        device
            .device
            .allocate_descriptor_sets(&alloc_info)
            .context("Failed to allocate descriptor sets")?
    };

    for (set, &(buffer, _)) in sets.iter().zip(uniform_buffers) {
        let buffer_info = vk::DescriptorBufferInfo::builder()
            .buffer(buffer)
            .offset(0)
            .range(std::mem::size_of::<UboViewProjection>() as vk::DeviceSize)
            .build();

        let buffer_infos = [buffer_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(*set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build();

        unsafe {
            device.device.update_descriptor_sets(&[write], &[]);
        }
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_two_mat4s() {
        // Matches the std140 layout of the shader's UboViewProjection block
        assert_eq!(std::mem::size_of::<UboViewProjection>(), 128);
    }
}
