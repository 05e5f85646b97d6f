// Platform surface creation
//
// Maps raw window/display handles from winit onto the matching
// VK_KHR_*_surface extension. Only the extension for the display server
// actually in use is requested, so instance creation never asks the
// driver for a platform it doesn't have.

use anyhow::{bail, Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::os::raw::c_char;

/// Instance extensions required to present to the given display server
pub fn required_extension_names(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = match display_handle {
        RawDisplayHandle::Windows(_) => vec![
            ash::extensions::khr::Surface::name().as_ptr(),
            ash::extensions::khr::Win32Surface::name().as_ptr(),
        ],
        RawDisplayHandle::Xlib(_) => vec![
            ash::extensions::khr::Surface::name().as_ptr(),
            ash::extensions::khr::XlibSurface::name().as_ptr(),
        ],
        RawDisplayHandle::Xcb(_) => vec![
            ash::extensions::khr::Surface::name().as_ptr(),
            ash::extensions::khr::XcbSurface::name().as_ptr(),
        ],
        RawDisplayHandle::Wayland(_) => vec![
            ash::extensions::khr::Surface::name().as_ptr(),
            ash::extensions::khr::WaylandSurface::name().as_ptr(),
        ],
        other => bail!("Unsupported display server: {:?}", other),
    };

    Ok(extensions)
}

/// Create a surface for the window behind the given raw handles
pub fn create_surface(
    entry: &Entry,
    instance: &ash::Instance,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    unsafe {
        match (display_handle, window_handle) {
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
                let hinstance = window
                    .hinstance
                    .map(|h| h.get())
                    .unwrap_or(0) as *const std::ffi::c_void;
                let hwnd = window.hwnd.get() as *const std::ffi::c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd);
                let loader = ash::extensions::khr::Win32Surface::new(entry, instance);
                loader
                    .create_win32_surface(&create_info, None)
                    .context("Failed to create Win32 surface")
            }
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                let dpy = display
                    .display
                    .context("Xlib display handle is missing the display pointer")?;
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.as_ptr() as *mut _)
                    .window(window.window);
                let loader = ash::extensions::khr::XlibSurface::new(entry, instance);
                loader
                    .create_xlib_surface(&create_info, None)
                    .context("Failed to create Xlib surface")
            }
            (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                let connection = display
                    .connection
                    .context("Xcb display handle is missing the connection pointer")?;
                let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection.as_ptr())
                    .window(window.window.get());
                let loader = ash::extensions::khr::XcbSurface::new(entry, instance);
                loader
                    .create_xcb_surface(&create_info, None)
                    .context("Failed to create Xcb surface")
            }
            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr())
                    .surface(window.surface.as_ptr());
                let loader = ash::extensions::khr::WaylandSurface::new(entry, instance);
                loader
                    .create_wayland_surface(&create_info, None)
                    .context("Failed to create Wayland surface")
            }
            _ => bail!("Unsupported window handle type"),
        }
    }
}
