// Shader module loading
//
// Vulkan consumes SPIR-V bytecode; compilation happens offline (build.rs
// runs glslc when available). Binaries are read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::VulkanDevice;

/// Read a SPIR-V binary from disk and create a shader module from it
pub fn load_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader binary {:?}", path))?;

    // read_spv validates size/alignment and re-packs bytes into u32 words
    let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes))
        .with_context(|| format!("{:?} is not valid SPIR-V", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {:?}", path))
    }
}
