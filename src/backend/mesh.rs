// Meshes - vertex/index buffers plus a per-mesh model matrix
//
// Upload is a single map-copy-unmap into host-visible memory.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::sync::Arc;

use super::{buffer, VulkanDevice};

/// Interleaved vertex data: position + color
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub col: [f32; 3],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // Position (location 0)
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0)
                .build(),
            // Color (location 1, after 3 floats)
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(12)
                .build(),
        ]
    }
}

/// Indexed mesh living in GPU memory
pub struct Mesh {
    vertex_buffer: vk::Buffer,
    vertex_memory: vk::DeviceMemory,
    index_buffer: vk::Buffer,
    index_memory: vk::DeviceMemory,
    vertex_count: u32,
    index_count: u32,
    model: Mat4,
    device: Arc<VulkanDevice>,
}

impl Mesh {
    pub fn new(device: Arc<VulkanDevice>, vertices: &[Vertex], indices: &[u32]) -> Result<Self> {
        anyhow::ensure!(!vertices.is_empty(), "Mesh needs at least one vertex");
        anyhow::ensure!(!indices.is_empty(), "Mesh needs at least one index");

        let (vertex_buffer, vertex_memory) = buffer::create_buffer_with_data(
            &device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )
        .context("Failed to create vertex buffer")?;

        let (index_buffer, index_memory) = buffer::create_buffer_with_data(
            &device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            indices,
        )
        .context("Failed to create index buffer")?;

        Ok(Self {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            model: Mat4::IDENTITY,
            device,
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.vertex_buffer, None);
            self.device.device.free_memory(self.vertex_memory, None);
            self.device.device.destroy_buffer(self.index_buffer, None);
            self.device.device.free_memory(self.index_memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(
            Vertex::binding_description().stride,
            std::mem::size_of::<Vertex>() as u32
        );
    }

    #[test]
    fn attribute_offsets_match_layout() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[1].location, 1);
    }
}
