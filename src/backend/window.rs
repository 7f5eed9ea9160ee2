// GLFW windowing plumbing
//
// Window creation, the surface bridge and the event pump used by the
// gateway. GLFW owns surface creation so no raw-handle bridging is
// needed.

use anyhow::{anyhow, Context, Result};
use ash::vk;
use glfw::Context as _;

use crate::handle::RawId;

/// Initialize the GLFW library. Errors are routed to the log.
pub fn init_glfw() -> Result<glfw::Glfw> {
    glfw::init(glfw::log_errors).context("Failed to initialize GLFW")
}

/// Create a fixed-size window with no client API (we render through
/// Vulkan, not an OpenGL context).
pub fn create_window(
    glfw: &mut glfw::Glfw,
    width: u32,
    height: u32,
    title: &str,
) -> Result<(glfw::PWindow, glfw::GlfwReceiver<(f64, glfw::WindowEvent)>)> {
    glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
    glfw.window_hint(glfw::WindowHint::Resizable(false));

    let (mut window, events) = glfw
        .create_window(width, height, title, glfw::WindowMode::Windowed)
        .context("Failed to create GLFW window")?;

    window.set_close_polling(true);
    window.set_key_polling(true);

    Ok((window, events))
}

/// Native identifier of a window: its `GLFWwindow*` bit pattern.
pub fn window_id(window: &glfw::Window) -> RawId {
    RawId(window.window_ptr() as u64)
}

/// Create a `VkSurfaceKHR` for the window through GLFW's built-in
/// Vulkan support (`glfwCreateWindowSurface`).
pub fn create_surface(window: &glfw::Window, instance: vk::Instance) -> Result<vk::SurfaceKHR> {
    let mut surface = vk::SurfaceKHR::null();
    let result = window.create_window_surface(instance, std::ptr::null(), &mut surface);

    if result == vk::Result::SUCCESS {
        Ok(surface)
    } else {
        Err(anyhow!("Failed to create window surface: {:?}", result))
    }
}
