// Vulkan instance and device creation
//
// - Instance creation with validation layers
// - Physical device selection (prefer discrete GPU)
// - Logical device + graphics/present queue creation

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::vk;
use std::ffi::{CStr, CString};

/// Queue families the bring-up needs: one that can run graphics work
/// and one that can present to the surface. Often the same family.
#[derive(Clone, Copy, Debug)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

pub fn create_instance(
    entry: &ash::Entry,
    glfw: &glfw::Glfw,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new("hello-triangle")?;
    let engine_name = CString::new("No Engine")?;

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    // GLFW reports the surface extensions the platform needs.
    let required: Vec<CString> = glfw
        .get_required_instance_extensions()
        .context("GLFW reports no Vulkan support")?
        .into_iter()
        .map(CString::new)
        .collect::<Result<_, _>>()?;

    let mut extensions: Vec<*const std::os::raw::c_char> =
        required.iter().map(|name| name.as_ptr()).collect();
    if enable_validation {
        extensions.push(ext::DebugUtils::name().as_ptr());
    }

    let layer_names = if enable_validation {
        vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .context("Failed to create Vulkan instance")?;

    Ok(instance)
}

pub fn setup_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ext::DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

    Ok((debug_utils, messenger))
}

pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
) -> Result<Option<QueueFamilyIndices>> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics = None;
    let mut present = None;

    for (index, props) in families.iter().enumerate() {
        let index = index as u32;

        if graphics.is_none() && props.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }

        let supports_present = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, index, surface)
        }?;
        if present.is_none() && supports_present {
            present = Some(index);
        }

        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    Ok(graphics
        .zip(present)
        .map(|(graphics, present)| QueueFamilyIndices { graphics, present }))
}

/// Pick the most suitable GPU: complete queue families, swapchain
/// extension, at least one surface format and present mode. Discrete
/// GPUs score above integrated ones.
pub fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
) -> Result<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;

    if devices.is_empty() {
        anyhow::bail!("No Vulkan-capable GPU found");
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        if find_queue_families(instance, device, surface_loader, surface)?.is_none() {
            continue;
        }
        if !supports_swapchain_extension(instance, device)? {
            continue;
        }

        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }?;
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }?;
        if formats.is_empty() || present_modes.is_empty() {
            continue;
        }

        let props = unsafe { instance.get_physical_device_properties(device) };
        let score = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };

        if score > best_score {
            log::info!("candidate GPU: {}", unsafe {
                CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy()
            });
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
}

fn supports_swapchain_extension(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Result<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
    let wanted = khr::Swapchain::name();

    Ok(available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == wanted
    }))
}

/// Create the logical device and fetch both queues. With a single
/// shared family the two queues alias the same native queue.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    indices: QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let mut unique_families = vec![indices.graphics];
    if indices.present != indices.graphics {
        unique_families.push(indices.present);
    }

    let queue_priorities = [1.0];
    let queue_create_infos: Vec<_> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
                .build()
        })
        .collect();

    let extensions = [khr::Swapchain::name().as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .context("Failed to create logical device")?;

    let graphics_queue = unsafe { device.get_device_queue(indices.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(indices.present, 0) };

    Ok((device, graphics_queue, present_queue))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
