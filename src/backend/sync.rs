// Per-frame synchronization
//
// One FrameSync per frame in flight: two semaphores ordering GPU work
// against the swapchain, and a fence pacing the CPU.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct FrameSync {
    /// Signaled when the acquired image is ready to be rendered to
    pub image_available: vk::Semaphore,
    /// Signaled when rendering finishes, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signaled when the GPU is done with this slot's submission
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Fence starts signaled so the first frame doesn't block forever
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
                device,
            })
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_semaphore(self.image_available, None);
            self.device
                .device
                .destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
