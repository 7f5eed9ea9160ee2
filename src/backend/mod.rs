// Backend module - the real gateway over GLFW and ash
//
// VulkanGateway hands the chain opaque RawIds and keeps the rich
// objects (loaders, GLFW context, ash wrappers) to itself. Every
// native failure is translated into the invalid-sentinel handle after
// an error log; destroy calls never report back.

pub mod device;
pub mod swapchain;
pub mod window;

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::vk;
use ash::vk::Handle as _;

use crate::config::Config;
use crate::gateway::{DeviceHandles, NativeGateway};
use crate::handle::{BorrowedHandle, Handle, RawId, ResourceKind};

use device::QueueFamilyIndices;

pub struct VulkanGateway {
    validation: bool,
    preferred_present_mode: vk::PresentModeKHR,

    // Windowing state
    glfw: Option<glfw::Glfw>,
    window: Option<glfw::PWindow>,
    // Kept alive so GLFW has somewhere to queue events.
    _events: Option<glfw::GlfwReceiver<(f64, glfw::WindowEvent)>>,

    // Vulkan state, populated as the chain walks forward
    entry: Option<ash::Entry>,
    instance: Option<ash::Instance>,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Option<khr::Surface>,
    device: Option<ash::Device>,
    queue_families: Option<QueueFamilyIndices>,
    swapchain_loader: Option<khr::Swapchain>,
}

impl VulkanGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            // Validation only in debug builds, and only if configured
            validation: cfg!(debug_assertions) && config.debug.validation_layers,
            preferred_present_mode: config.graphics.preferred_present_mode(),
            glfw: None,
            window: None,
            _events: None,
            entry: None,
            instance: None,
            debug_utils: None,
            surface_loader: None,
            device: None,
            queue_families: None,
            swapchain_loader: None,
        }
    }

    // ── id checks ────────────────────────────────────────────────────
    //
    // The chain echoes ids back to us; a mismatch means it is talking
    // about a resource we no longer hold, which we treat exactly like
    // a failing native call.

    fn window_ref(&self, id: RawId) -> Result<&glfw::PWindow> {
        self.window
            .as_ref()
            .filter(|w| window::window_id(w) == id)
            .with_context(|| format!("unknown window {id}"))
    }

    fn instance_ref(&self, id: RawId) -> Result<&ash::Instance> {
        self.instance
            .as_ref()
            .filter(|i| i.handle().as_raw() == id.0)
            .with_context(|| format!("unknown instance {id}"))
    }

    fn device_ref(&self, id: RawId) -> Result<&ash::Device> {
        self.device
            .as_ref()
            .filter(|d| d.handle().as_raw() == id.0)
            .with_context(|| format!("unknown device {id}"))
    }

    fn surface_loader_ref(&self) -> Result<&khr::Surface> {
        self.surface_loader.as_ref().context("no surface loader")
    }

    // ── fallible bodies behind the sentinel convention ───────────────

    fn try_create_window(&mut self, width: u32, height: u32, title: &str) -> Result<RawId> {
        if self.glfw.is_none() {
            self.glfw = Some(window::init_glfw()?);
        }
        let glfw = self.glfw.as_mut().context("GLFW not initialized")?;

        let (win, events) = window::create_window(glfw, width, height, title)?;
        let id = window::window_id(&win);
        self.window = Some(win);
        self._events = Some(events);
        Ok(id)
    }

    fn try_create_instance(&mut self) -> Result<RawId> {
        let glfw = self.glfw.as_ref().context("GLFW not initialized")?;

        if self.entry.is_none() {
            self.entry = Some(
                unsafe { ash::Entry::load() }
                    .context("Failed to load Vulkan library. Is Vulkan installed?")?,
            );
        }
        let entry = self.entry.as_ref().context("no Vulkan entry")?;

        let instance = device::create_instance(entry, glfw, self.validation)?;

        let debug_utils = if self.validation {
            match device::setup_debug_messenger(entry, &instance) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    // Undo the half-built instance so the sentinel we
                    // return is the whole truth.
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let id = RawId(instance.handle().as_raw());
        self.surface_loader = Some(khr::Surface::new(entry, &instance));
        self.instance = Some(instance);
        self.debug_utils = debug_utils;
        Ok(id)
    }

    fn try_create_surface(&mut self, instance: RawId, win: RawId) -> Result<RawId> {
        let vk_instance = self.instance_ref(instance)?.handle();
        let window = self.window_ref(win)?;
        let surface = window::create_surface(window, vk_instance)?;
        Ok(RawId(surface.as_raw()))
    }

    fn try_pick_physical_device(&mut self, instance: RawId, surface: RawId) -> Result<RawId> {
        let instance = self.instance_ref(instance)?;
        let surface_loader = self.surface_loader_ref()?;
        let physical = device::pick_physical_device(
            instance,
            surface_loader,
            vk::SurfaceKHR::from_raw(surface.0),
        )?;
        Ok(RawId(physical.as_raw()))
    }

    fn try_create_device(
        &mut self,
        physical: RawId,
        surface: RawId,
    ) -> Result<(RawId, RawId, RawId)> {
        // The device call does not carry the instance id; the live
        // instance is the only one there can be.
        let instance = self.instance.as_ref().context("no instance")?;
        let surface_loader = self.surface_loader_ref()?;
        let physical_device = vk::PhysicalDevice::from_raw(physical.0);

        let indices = device::find_queue_families(
            instance,
            physical_device,
            surface_loader,
            vk::SurfaceKHR::from_raw(surface.0),
        )?
        .context("queue families incomplete for the picked device")?;

        let (dev, graphics_queue, present_queue) =
            device::create_logical_device(instance, physical_device, indices)?;

        let ids = (
            RawId(dev.handle().as_raw()),
            RawId(graphics_queue.as_raw()),
            RawId(present_queue.as_raw()),
        );
        self.swapchain_loader = Some(khr::Swapchain::new(instance, &dev));
        self.device = Some(dev);
        self.queue_families = Some(indices);
        Ok(ids)
    }

    fn try_create_swapchain(
        &mut self,
        win: RawId,
        surface: RawId,
        physical: RawId,
        dev: RawId,
    ) -> Result<RawId> {
        let window = self.window_ref(win)?;
        let _ = self.device_ref(dev)?;
        let surface_loader = self.surface_loader_ref()?;
        let swapchain_loader = self.swapchain_loader.as_ref().context("no swapchain loader")?;
        let indices = self.queue_families.context("no queue families recorded")?;

        let swapchain = swapchain::create_swapchain(
            window,
            vk::SurfaceKHR::from_raw(surface.0),
            vk::PhysicalDevice::from_raw(physical.0),
            surface_loader,
            swapchain_loader,
            indices,
            self.preferred_present_mode,
        )?;
        Ok(RawId(swapchain.as_raw()))
    }
}

impl NativeGateway for VulkanGateway {
    fn create_window(&mut self, width: u32, height: u32, title: &str) -> Handle {
        match self.try_create_window(width, height, title) {
            Ok(id) => Handle::from_native(ResourceKind::Window, id),
            Err(err) => {
                log::error!("window creation failed: {err:#}");
                Handle::invalid(ResourceKind::Window)
            }
        }
    }

    fn destroy_window(&mut self, window: RawId) {
        match self.window.take() {
            Some(win) if window::window_id(&win) == window => {
                // Dropping the PWindow runs glfwDestroyWindow.
                self._events = None;
                drop(win);
            }
            other => {
                self.window = other;
                log::error!("destroy requested for unknown window {window}");
            }
        }
    }

    fn window_should_close(&mut self, window: RawId) -> bool {
        match self.window_ref(window) {
            Ok(win) => win.should_close(),
            Err(err) => {
                log::error!("{err:#}; stopping the loop");
                true
            }
        }
    }

    fn poll_events(&mut self) -> Result<()> {
        let glfw = self.glfw.as_mut().context("GLFW not initialized")?;
        glfw.poll_events();
        Ok(())
    }

    fn terminate(&mut self) {
        self.window = None;
        self._events = None;
        // Dropping the last Glfw handle terminates the library.
        self.glfw = None;
        log::info!("windowing terminated");
    }

    fn create_instance(&mut self) -> Handle {
        match self.try_create_instance() {
            Ok(id) => Handle::from_native(ResourceKind::Instance, id),
            Err(err) => {
                log::error!("instance creation failed: {err:#}");
                Handle::invalid(ResourceKind::Instance)
            }
        }
    }

    fn destroy_instance(&mut self, instance: RawId) {
        if self.instance_ref(instance).is_err() {
            log::error!("destroy requested for unknown instance {instance}");
            return;
        }
        self.surface_loader = None;
        if let Some((debug_utils, messenger)) = self.debug_utils.take() {
            unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
        }
        if let Some(inst) = self.instance.take() {
            unsafe { inst.destroy_instance(None) };
        }
    }

    fn create_surface(&mut self, instance: RawId, window: RawId) -> Handle {
        match self.try_create_surface(instance, window) {
            Ok(id) => Handle::from_native(ResourceKind::Surface, id),
            Err(err) => {
                log::error!("surface creation failed: {err:#}");
                Handle::invalid(ResourceKind::Surface)
            }
        }
    }

    fn destroy_surface(&mut self, instance: RawId, surface: RawId) {
        let result = self.instance_ref(instance).and_then(|_| {
            let loader = self.surface_loader_ref()?;
            unsafe { loader.destroy_surface(vk::SurfaceKHR::from_raw(surface.0), None) };
            Ok(())
        });
        if let Err(err) = result {
            // Unrecoverable: the surface cannot be destroyed without
            // its instance.
            log::error!("surface destroy failed: {err:#}");
        }
    }

    fn pick_physical_device(&mut self, instance: RawId, surface: RawId) -> BorrowedHandle {
        match self.try_pick_physical_device(instance, surface) {
            Ok(id) => BorrowedHandle::from_native(ResourceKind::PhysicalDevice, id),
            Err(err) => {
                log::error!("physical device selection failed: {err:#}");
                BorrowedHandle::invalid(ResourceKind::PhysicalDevice)
            }
        }
    }

    fn create_device(&mut self, physical_device: RawId, surface: RawId) -> DeviceHandles {
        match self.try_create_device(physical_device, surface) {
            Ok((device, graphics, present)) => DeviceHandles {
                device: Handle::from_native(ResourceKind::Device, device),
                graphics_queue: BorrowedHandle::from_native(ResourceKind::GraphicsQueue, graphics),
                present_queue: BorrowedHandle::from_native(ResourceKind::PresentQueue, present),
            },
            Err(err) => {
                log::error!("device creation failed: {err:#}");
                DeviceHandles {
                    device: Handle::invalid(ResourceKind::Device),
                    graphics_queue: BorrowedHandle::invalid(ResourceKind::GraphicsQueue),
                    present_queue: BorrowedHandle::invalid(ResourceKind::PresentQueue),
                }
            }
        }
    }

    fn destroy_device(&mut self, device: RawId) {
        if self.device_ref(device).is_err() {
            log::error!("destroy requested for unknown device {device}");
            return;
        }
        self.swapchain_loader = None;
        self.queue_families = None;
        if let Some(dev) = self.device.take() {
            unsafe {
                // Let in-flight work drain before the device goes away.
                let _ = dev.device_wait_idle();
                dev.destroy_device(None);
            }
        }
    }

    fn create_swapchain(
        &mut self,
        window: RawId,
        surface: RawId,
        physical_device: RawId,
        device: RawId,
    ) -> Handle {
        match self.try_create_swapchain(window, surface, physical_device, device) {
            Ok(id) => Handle::from_native(ResourceKind::Swapchain, id),
            Err(err) => {
                log::error!("swapchain creation failed: {err:#}");
                Handle::invalid(ResourceKind::Swapchain)
            }
        }
    }

    fn destroy_swapchain(&mut self, device: RawId, swapchain: RawId) {
        let result = self.device_ref(device).and_then(|_| {
            let loader = self
                .swapchain_loader
                .as_ref()
                .context("no swapchain loader")?;
            unsafe { loader.destroy_swapchain(vk::SwapchainKHR::from_raw(swapchain.0), None) };
            Ok(())
        });
        if let Err(err) = result {
            log::error!("swapchain destroy failed: {err:#}");
        }
    }
}
