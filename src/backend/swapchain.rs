// Swapchain creation
//
// Format, present-mode, extent and image-count negotiation against
// the surface. The chain only owns the VkSwapchainKHR handle; image
// views and framebuffers belong to the rendering layer.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;

use super::device::QueueFamilyIndices;

pub fn create_swapchain(
    window: &glfw::Window,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    surface_loader: &khr::Surface,
    swapchain_loader: &khr::Swapchain,
    indices: QueueFamilyIndices,
    preferred_present_mode: vk::PresentModeKHR,
) -> Result<vk::SwapchainKHR> {
    let surface_caps = unsafe {
        surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
    }?;
    let formats =
        unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }?;
    let present_modes = unsafe {
        surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
    }?;

    // Choose surface format (prefer SRGB)
    let surface_format = formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .context("No suitable surface format")?;

    // FIFO is the only mode guaranteed to be available
    let present_mode = present_modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred_present_mode)
        .unwrap_or(vk::PresentModeKHR::FIFO);

    log::info!("Present mode: {:?}", present_mode);

    // Choose extent from the framebuffer size when the surface leaves
    // it to us
    let extent = if surface_caps.current_extent.width != u32::MAX {
        surface_caps.current_extent
    } else {
        let (width, height) = window.get_framebuffer_size();
        vk::Extent2D {
            width: (width as u32).clamp(
                surface_caps.min_image_extent.width,
                surface_caps.max_image_extent.width,
            ),
            height: (height as u32).clamp(
                surface_caps.min_image_extent.height,
                surface_caps.max_image_extent.height,
            ),
        }
    };

    // One image above the minimum so the driver never blocks us
    let mut image_count = surface_caps.min_image_count + 1;
    if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
        image_count = surface_caps.max_image_count;
    }

    let family_indices = [indices.graphics, indices.present];
    let mut create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .pre_transform(surface_caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);

    // Distinct graphics and present families share the images
    create_info = if indices.graphics != indices.present {
        create_info
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(&family_indices)
    } else {
        create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
    };

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
        .context("Failed to create swapchain")?;

    let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;
    log::info!(
        "Created swapchain: {}x{}, {} images",
        extent.width,
        extent.height,
        images.len()
    );

    Ok(swapchain)
}
