// Buffer and image utilities
//
// Helpers for creating GPU-accessible buffers, image views and the depth
// attachment. Uploads are a single map-copy-unmap into host-visible,
// host-coherent memory; there is no staging or pooling.

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Create a GPU buffer with specified usage and memory properties
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device
            .device
            .create_buffer(&buffer_info, None)
            .context("Failed to create buffer")?
    };

    let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = find_memory_type(
        &device.memory_properties,
        mem_requirements.memory_type_bits,
        memory_properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let buffer_memory = unsafe {
        device
            .device
            .allocate_memory(&alloc_info, None)
            .context("Failed to allocate buffer memory")?
    };

    unsafe {
        device
            .device
            .bind_buffer_memory(buffer, buffer_memory, 0)
            .context("Failed to bind buffer memory")?;
    }

    Ok((buffer, buffer_memory))
}

/// Create a host-visible buffer and fill it with data
pub fn create_buffer_with_data<T: Copy>(
    device: &VulkanDevice,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    anyhow::ensure!(!data.is_empty(), "Refusing to create an empty buffer");

    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let (buffer, memory) = create_buffer(
        device,
        size,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe {
        let ptr = device
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())? as *mut T;

        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        device.device.unmap_memory(memory);
    }

    Ok((buffer, memory))
}

/// Write `data` into already-allocated host-coherent memory
pub fn write_memory<T: Copy>(
    device: &VulkanDevice,
    memory: vk::DeviceMemory,
    data: &T,
) -> Result<()> {
    let size = std::mem::size_of::<T>() as vk::DeviceSize;

    unsafe {
        let ptr = device
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())? as *mut T;
        ptr.copy_from_nonoverlapping(data, 1);
        device.device.unmap_memory(memory);
    }

    Ok(())
}

/// Find a memory type index matching the requirement bits and properties
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..mem_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    anyhow::bail!("Failed to find suitable memory type")
}

/// Create a 2D image view over a single mip level and layer
pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .device
            .create_image_view(&create_info, None)
            .context("Failed to create image view")
    }
}

/// Depth formats we accept, in preference order
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate format usable as an optimal-tiling depth attachment
pub fn find_depth_format(device: &VulkanDevice) -> Result<vk::Format> {
    for format in DEPTH_FORMAT_CANDIDATES {
        let props = unsafe {
            device
                .instance
                .get_physical_device_format_properties(device.physical_device, format)
        };

        if supports_depth_attachment(&props) {
            return Ok(format);
        }
    }

    anyhow::bail!("No supported depth attachment format")
}

pub fn supports_depth_attachment(props: &vk::FormatProperties) -> bool {
    props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
}

/// Combined depth-stencil formats need both aspects on their views
pub fn depth_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Depth attachment image, its backing memory and a view over it
pub struct DepthBuffer {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl DepthBuffer {
    pub fn new(device: &VulkanDevice, extent: vk::Extent2D) -> Result<Self> {
        let format = find_depth_format(device)?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("Failed to create depth image")?
        };

        let mem_requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let memory_type_index = find_memory_type(
            &device.memory_properties,
            mem_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .device
                .allocate_memory(&alloc_info, None)
                .context("Failed to allocate depth image memory")?
        };

        unsafe {
            device
                .device
                .bind_image_memory(image, memory, 0)
                .context("Failed to bind depth image memory")?;
        }

        let view = create_image_view(device, image, format, depth_aspect_mask(format))?;

        Ok(Self {
            image,
            memory,
            view,
            format,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(
        types: &[(vk::MemoryPropertyFlags, u32)],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &(flags, heap)) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: heap,
            };
        }
        props
    }

    #[test]
    fn memory_type_honors_filter_bits() {
        let props = memory_properties(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
        ]);

        // Both types allowed: first matching wins
        let index = find_memory_type(
            &props,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);

        // Filter excludes the only matching type
        let err = find_memory_type(&props, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(err.is_err());
    }

    #[test]
    fn memory_type_requires_all_properties() {
        let props = memory_properties(&[(vk::MemoryPropertyFlags::HOST_VISIBLE, 0)]);

        let err = find_memory_type(
            &props,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(err.is_err());
    }

    #[test]
    fn depth_attachment_feature_check() {
        let supported = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        };
        assert!(supports_depth_attachment(&supported));

        let linear_only = vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        assert!(!supports_depth_attachment(&linear_only));
    }

    #[test]
    fn stencil_formats_get_both_aspects() {
        assert_eq!(
            depth_aspect_mask(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
