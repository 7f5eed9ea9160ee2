// Native subsystem gateway
//
// The one boundary between the resource chain and the windowing
// library / graphics driver. Create operations report failure only
// through an invalid handle - never through a Result or a panic -
// because the chain's rollback keys off that single signal. Destroy
// operations are fire-and-forget.

use anyhow::Result;

use crate::handle::{BorrowedHandle, Handle, RawId};

/// Result of the compound device-creation call: the logical device
/// plus its two queues. The queues are created together with the
/// device and may alias the same native queue.
pub struct DeviceHandles {
    pub device: Handle,
    pub graphics_queue: BorrowedHandle,
    pub present_queue: BorrowedHandle,
}

pub trait NativeGateway {
    // ── Windowing ────────────────────────────────────────────────────
    fn create_window(&mut self, width: u32, height: u32, title: &str) -> Handle;
    fn destroy_window(&mut self, window: RawId);
    fn window_should_close(&mut self, window: RawId) -> bool;
    /// One bounded event pump. A failure here aborts the run loop;
    /// teardown still executes.
    fn poll_events(&mut self) -> Result<()>;
    fn terminate(&mut self);

    // ── Vulkan ───────────────────────────────────────────────────────
    fn create_instance(&mut self) -> Handle;
    fn destroy_instance(&mut self, instance: RawId);

    fn create_surface(&mut self, instance: RawId, window: RawId) -> Handle;
    fn destroy_surface(&mut self, instance: RawId, surface: RawId);

    /// Selection only - the physical device is owned by the instance
    /// and is never independently destroyed.
    fn pick_physical_device(&mut self, instance: RawId, surface: RawId) -> BorrowedHandle;

    fn create_device(&mut self, physical_device: RawId, surface: RawId) -> DeviceHandles;
    fn destroy_device(&mut self, device: RawId);

    fn create_swapchain(
        &mut self,
        window: RawId,
        surface: RawId,
        physical_device: RawId,
        device: RawId,
    ) -> Handle;
    fn destroy_swapchain(&mut self, device: RawId, swapchain: RawId);
}
