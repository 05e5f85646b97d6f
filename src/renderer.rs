// Renderer - owns every Vulkan resource and the per-frame draw loop
//
// Bring-up order: device (instance/surface/queues) -> swapchain -> render
// pass -> pipeline -> framebuffers -> buffers/descriptors -> sync objects.
// Everything that depends on the swapchain lives in SwapchainResources so
// a resize can tear it down and rebuild it as one unit.

use anyhow::{Context, Result};
use ash::vk;
use glam::{Mat4, Vec3};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

use crate::backend::buffer::{self, DepthBuffer};
use crate::backend::descriptor::{self, UboViewProjection};
use crate::backend::{pipeline, shader, sync, Mesh, Swapchain, Vertex, VulkanDevice};
use crate::config::Config;

/// Everything that must be rebuilt when the window size changes
struct SwapchainResources {
    swapchain: Swapchain,
    depth: DepthBuffer,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    framebuffers: Vec<vk::Framebuffer>,
    uniform_buffers: Vec<(vk::Buffer, vk::DeviceMemory)>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    /// One command buffer per swapchain image, re-recorded each frame
    command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainResources {
    fn destroy(self, device: &VulkanDevice, command_pool: vk::CommandPool) {
        unsafe {
            device
                .device
                .free_command_buffers(command_pool, &self.command_buffers);
            device
                .device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            for &(buffer, memory) in &self.uniform_buffers {
                device.device.destroy_buffer(buffer, None);
                device.device.free_memory(memory, None);
            }
            for &framebuffer in &self.framebuffers {
                device.device.destroy_framebuffer(framebuffer, None);
            }
            device.device.destroy_pipeline(self.pipeline, None);
            device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            device.device.destroy_render_pass(self.render_pass, None);
            self.depth.destroy(&device.device);
        }
        // self.swapchain cleans itself up on drop
    }
}

pub struct Renderer {
    device: Arc<VulkanDevice>,

    // Resources that outlive swapchain recreation
    descriptor_set_layout: vk::DescriptorSetLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    command_pool: vk::CommandPool,

    frames: Option<SwapchainResources>,

    // Sync objects for each frame in flight
    frame_sync: Vec<sync::FrameSync>,
    /// Which sync slot we're currently using (0 to max_frames_in_flight-1)
    current_frame: usize,
    max_frames_in_flight: usize,

    // Scene
    meshes: Vec<Mesh>,
    ubo_view_projection: UboViewProjection,

    clear_color: [f32; 4],
    preferred_present_mode: vk::PresentModeKHR,

    // Pre-allocated to avoid per-frame heap allocations
    wait_stages: [vk::PipelineStageFlags; 1],

    /// Set when the swapchain must be rebuilt before the next frame
    pub needs_resize: bool,
    /// Set while the window has a zero-sized framebuffer
    pub is_minimized: bool,
}

impl Renderer {
    pub fn new(
        config: &Config,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(
            &config.window.title,
            enable_validation,
            display_handle,
            window_handle,
        )?;

        let descriptor_set_layout = descriptor::create_descriptor_set_layout(&device)?;

        let vert_shader = shader::load_shader_module(&device, &config.shaders.vertex)?;
        let frag_shader = shader::load_shader_module(&device, &config.shaders.fragment)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device
                .device
                .create_command_pool(&pool_info, None)
                .context("Failed to create command pool")?
        };

        let max_frames_in_flight = config.graphics.max_frames_in_flight.max(1);
        let frame_sync = (0..max_frames_in_flight)
            .map(|_| sync::FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>>>()?;

        let meshes = build_scene(device.clone())?;
        for (i, mesh) in meshes.iter().enumerate() {
            log::debug!(
                "Mesh {}: {} vertices, {} indices",
                i,
                mesh.vertex_count(),
                mesh.index_count()
            );
        }

        let mut renderer = Self {
            device,
            descriptor_set_layout,
            vert_shader,
            frag_shader,
            command_pool,
            frames: None,
            frame_sync,
            current_frame: 0,
            max_frames_in_flight,
            meshes,
            ubo_view_projection: UboViewProjection {
                projection: Mat4::IDENTITY,
                view: Mat4::look_at_rh(
                    Vec3::new(3.0, 0.0, -1.0),
                    Vec3::new(0.0, 0.0, -4.0),
                    Vec3::Y,
                ),
            },
            clear_color: config.graphics.clear_color,
            preferred_present_mode: config.get_present_mode(),
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            needs_resize: false,
            is_minimized: false,
        };

        renderer.create_swapchain_resources(width, height)?;

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    /// Build (or rebuild) everything hanging off the swapchain.
    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> Result<()> {
        // Zero-sized framebuffer: nothing to present to
        if width == 0 || height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // The surface can only have one swapchain at a time, so tear the
        // old bundle down before creating its replacement
        if let Some(old) = self.frames.take() {
            old.destroy(&self.device, self.command_pool);
        }

        let swapchain = Swapchain::new(
            self.device.clone(),
            self.preferred_present_mode,
            width,
            height,
        )?;
        let extent = swapchain.extent;

        let depth = DepthBuffer::new(&self.device, extent)?;
        let render_pass = pipeline::create_render_pass(&self.device, swapchain.format, depth.format)?;
        let (graphics_pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &self.device,
            render_pass,
            extent,
            self.descriptor_set_layout,
            self.vert_shader,
            self.frag_shader,
        )?;
        let framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            depth.view,
            render_pass,
            extent,
        )?;

        let image_count = swapchain.images.len();
        let uniform_buffers = descriptor::create_uniform_buffers(&self.device, image_count)?;
        let descriptor_pool =
            descriptor::create_descriptor_pool(&self.device, image_count as u32)?;
        let descriptor_sets = descriptor::create_descriptor_sets(
            &self.device,
            descriptor_pool,
            self.descriptor_set_layout,
            &uniform_buffers,
        )?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count as u32);
        let command_buffers = unsafe {
            self.device
                .device
                .allocate_command_buffers(&alloc_info)
                .context("Failed to allocate command buffers")?
        };

        // Projection tracks the swapchain aspect ratio. Vulkan's clip-space
        // Y points down, hence the sign flip.
        let aspect = extent.width as f32 / extent.height as f32;
        let mut projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0);
        projection.y_axis.y *= -1.0;
        self.ubo_view_projection.projection = projection;

        self.frames = Some(SwapchainResources {
            swapchain,
            depth,
            render_pass,
            pipeline: graphics_pipeline,
            pipeline_layout,
            framebuffers,
            uniform_buffers,
            descriptor_pool,
            descriptor_sets,
            command_buffers,
        });
        self.needs_resize = false;

        Ok(())
    }

    /// Recreate the swapchain after a resize. Waits for the GPU to finish
    /// all outstanding work before destroying anything.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.wait_idle()?;
        self.create_swapchain_resources(width, height)
    }

    /// Replace the model matrix of the mesh at `index`.
    /// Out-of-range indices are ignored.
    pub fn update_model(&mut self, index: usize, model: Mat4) {
        if let Some(mesh) = self.meshes.get_mut(index) {
            mesh.set_model(model);
        }
    }

    /// Render a single frame. Returns false when nothing was presented
    /// (minimized, or the swapchain needs recreation first).
    ///
    /// FRAME TIMELINE:
    ///   wait fence -> acquire image -> record commands -> write UBO
    ///   -> submit (fenced) -> present -> advance frame index
    pub fn draw(&mut self) -> Result<bool> {
        if self.is_minimized || self.needs_resize {
            return Ok(false);
        }

        let sync = &self.frame_sync[self.current_frame];
        let image_available = sync.image_available;
        let render_finished = sync.render_finished;
        let in_flight_fence = sync.in_flight_fence;

        // Wait for the previous frame that used this sync slot
        unsafe {
            self.device
                .device
                .wait_for_fences(&[in_flight_fence], true, u64::MAX)?;
        }

        let acquire_result = {
            let frames = self
                .frames
                .as_ref()
                .context("Swapchain not initialized")?;
            frames.swapchain.acquire_next_image(u64::MAX, image_available)
        };

        let image_index = match acquire_result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.needs_resize = true;
                }
                index
            }
            Err(e) if swapchain_out_of_date(e) => {
                self.needs_resize = true;
                return Ok(false);
            }
            Err(e) => return Err(e).context("Failed to acquire swapchain image"),
        };

        // Only reset the fence once we know work will be submitted
        unsafe {
            self.device.device.reset_fences(&[in_flight_fence])?;
        }

        self.record_commands(image_index as usize)?;
        self.update_uniform_buffer(image_index as usize)?;

        let frames = self
            .frames
            .as_ref()
            .context("Swapchain not initialized")?;
        let cmd = frames.command_buffers[image_index as usize];

        let wait_semaphores = [image_available];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    in_flight_fence,
                )
                .context("Failed to submit command buffer")?;
        }

        let present_result = frames.swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        );

        match present_result {
            Ok(suboptimal) => {
                if suboptimal {
                    self.needs_resize = true;
                }
            }
            Err(e) if swapchain_out_of_date(e) => {
                self.needs_resize = true;
            }
            Err(e) => return Err(e).context("Failed to present image"),
        }

        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;

        Ok(true)
    }

    /// Re-record the command buffer for the acquired swapchain image:
    /// one render pass, then per mesh bind buffers, push the model matrix,
    /// bind the frame's descriptor set and draw indexed.
    fn record_commands(&self, image_index: usize) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .context("Swapchain not initialized")?;
        let cmd = frames.command_buffers[image_index];
        let device = &self.device.device;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(frames.render_pass)
            .framebuffer(frames.framebuffers[image_index])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: frames.swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, frames.pipeline);

            for mesh in &self.meshes {
                let vertex_buffers = [mesh.vertex_buffer()];
                let offsets = [0];
                device.cmd_bind_vertex_buffers(cmd, 0, &vertex_buffers, &offsets);
                device.cmd_bind_index_buffer(cmd, mesh.index_buffer(), 0, vk::IndexType::UINT32);

                let model = mesh.model();
                device.cmd_push_constants(
                    cmd,
                    frames.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&model),
                );

                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    frames.pipeline_layout,
                    0,
                    &[frames.descriptor_sets[image_index]],
                    &[],
                );

                device.cmd_draw_indexed(cmd, mesh.index_count(), 1, 0, 0, 0);
            }

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }

    /// Rewrite the view-projection block for the acquired image
    fn update_uniform_buffer(&self, image_index: usize) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .context("Swapchain not initialized")?;
        let (_, memory) = frames.uniform_buffers[image_index];
        buffer::write_memory(&self.device, memory, &self.ubo_view_projection)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        let _ = self.device.wait_idle();

        if let Some(frames) = self.frames.take() {
            frames.destroy(&self.device, self.command_pool);
        }

        // Sync objects and meshes free themselves against the still-live device
        self.frame_sync.clear();
        self.meshes.clear();

        unsafe {
            self.device
                .device
                .destroy_shader_module(self.vert_shader, None);
            self.device
                .device
                .destroy_shader_module(self.frag_shader, None);
            self.device
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }

        log::info!("Cleanup complete");
    }
}

/// The one acquire/present error that means "rebuild the swapchain and
/// retry" rather than "give up". Everything else (device lost, surface
/// lost) propagates to the caller as fatal.
fn swapchain_out_of_date(result: vk::Result) -> bool {
    result == vk::Result::ERROR_OUT_OF_DATE_KHR
}

/// Quad vertices centered on the given x range, one flat color
fn quad_vertices(x_min: f32, x_max: f32, color: [f32; 3]) -> Vec<Vertex> {
    vec![
        Vertex {
            pos: [x_min, -0.4, 0.0],
            col: color,
        },
        Vertex {
            pos: [x_max, -0.4, 0.0],
            col: color,
        },
        Vertex {
            pos: [x_max, 0.4, 0.0],
            col: color,
        },
        Vertex {
            pos: [x_min, 0.4, 0.0],
            col: color,
        },
    ]
}

/// Two triangles covering the quad
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Demo scene: two overlapping colored quads
fn build_scene(device: Arc<VulkanDevice>) -> Result<Vec<Mesh>> {
    let red_quad = quad_vertices(-0.9, 0.9, [1.0, 0.0, 0.0]);
    let blue_quad = quad_vertices(0.1, 0.9, [0.0, 0.0, 1.0]);

    Ok(vec![
        Mesh::new(device.clone(), &red_quad, &QUAD_INDICES)?,
        Mesh::new(device, &blue_quad, &QUAD_INDICES)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_out_of_date_triggers_recreation() {
        assert!(swapchain_out_of_date(vk::Result::ERROR_OUT_OF_DATE_KHR));
        // Fatal conditions must propagate, not silently retry
        assert!(!swapchain_out_of_date(vk::Result::ERROR_DEVICE_LOST));
        assert!(!swapchain_out_of_date(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    #[test]
    fn quad_geometry_is_consistent() {
        let quad = quad_vertices(-1.0, 1.0, [1.0, 0.0, 0.0]);
        assert_eq!(quad.len(), 4);
        assert_eq!(QUAD_INDICES.len(), 6);
        // Every index addresses a real vertex
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < quad.len()));
    }

    #[test]
    fn quad_triangles_share_the_diagonal() {
        let first = &QUAD_INDICES[..3];
        let second = &QUAD_INDICES[3..];
        let shared: Vec<_> = first.iter().filter(|i| second.contains(i)).collect();
        assert_eq!(shared.len(), 2);
    }
}
