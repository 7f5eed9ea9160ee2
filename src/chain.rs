// Resource chain - ordered ownership of the bring-up dependency chain
//
// Window -> Instance -> Surface -> PhysicalDevice -> Device(+Queues)
// -> Swapchain. Creation strictly in that order, release strictly in
// reverse. A failed step rolls back everything this builder created
// before the failure is reported.

use thiserror::Error;

use crate::gateway::NativeGateway;
use crate::handle::{BorrowedHandle, Handle, RawId, ResourceKind};

/// The single error taxon: a creation step failed. The chain has
/// already rolled back by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} creation failed")]
pub struct StepError {
    pub kind: ResourceKind,
}

enum Slot {
    Owned(Handle),
    /// Lifetime owned by an earlier entry; popped on teardown but
    /// never destroyed.
    Borrowed(BorrowedHandle),
    /// The compound device step. The queues live and die with the
    /// device handle.
    Device {
        handle: Handle,
        graphics_queue: BorrowedHandle,
        present_queue: BorrowedHandle,
    },
}

struct Entry {
    kind: ResourceKind,
    slot: Slot,
}

/// Ordered sequence of chain entries. Invariant: if an entry is
/// valid, every entry before it is valid - dependencies are looked up
/// from the entries still in the chain, so a released dependency can
/// never be observed.
pub struct ResourceChain {
    entries: Vec<Entry>,
}

impl ResourceChain {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Native id of the entry of the given kind, if present. Queue
    /// ids resolve into the device entry.
    pub fn raw(&self, kind: ResourceKind) -> Option<RawId> {
        self.entries.iter().find_map(|entry| match &entry.slot {
            Slot::Owned(handle) if entry.kind == kind => Some(handle.id()),
            Slot::Borrowed(handle) if entry.kind == kind => Some(handle.id()),
            Slot::Device {
                handle,
                graphics_queue,
                present_queue,
            } => match kind {
                ResourceKind::Device => Some(handle.id()),
                ResourceKind::GraphicsQueue => Some(graphics_queue.id()),
                ResourceKind::PresentQueue => Some(present_queue.id()),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn is_valid(&self, kind: ResourceKind) -> bool {
        self.entries.iter().any(|entry| match &entry.slot {
            Slot::Owned(handle) => entry.kind == kind && handle.is_valid(),
            Slot::Borrowed(handle) => entry.kind == kind && handle.is_valid(),
            Slot::Device {
                handle,
                graphics_queue,
                present_queue,
            } => match kind {
                ResourceKind::Device => handle.is_valid(),
                ResourceKind::GraphicsQueue => graphics_queue.is_valid(),
                ResourceKind::PresentQueue => present_queue.is_valid(),
                _ => false,
            },
        })
    }

    /// Install the window as entry 0. The driver creates the window;
    /// the chain owns it from here on so teardown covers it.
    pub fn adopt_window(&mut self, window: Handle) {
        debug_assert!(self.entries.is_empty());
        debug_assert!(window.is_valid());
        self.entries.push(Entry {
            kind: ResourceKind::Window,
            slot: Slot::Owned(window),
        });
    }

    /// Run the Vulkan creation steps in fixed order. On failure the
    /// chain releases everything this call created, in reverse
    /// creation order, and names the failed step. The window entry is
    /// left in place - window teardown is the driver's transition.
    pub fn build_vulkan(&mut self, gateway: &mut dyn NativeGateway) -> Result<(), StepError> {
        let base = self.entries.len();
        let result = self.try_build_vulkan(gateway);
        if let Err(step) = result {
            log::error!("{step}; rolling back partially built chain");
            self.rollback_to(base, gateway);
        }
        result
    }

    fn try_build_vulkan(&mut self, gateway: &mut dyn NativeGateway) -> Result<(), StepError> {
        let window = self.require(ResourceKind::Window, ResourceKind::Instance)?;

        let instance = gateway.create_instance();
        self.commit_owned(instance)?;
        let instance = self.require(ResourceKind::Instance, ResourceKind::Surface)?;

        let surface = gateway.create_surface(instance, window);
        self.commit_owned(surface)?;
        let surface = self.require(ResourceKind::Surface, ResourceKind::PhysicalDevice)?;

        let physical = gateway.pick_physical_device(instance, surface);
        if !physical.is_valid() {
            return Err(StepError {
                kind: ResourceKind::PhysicalDevice,
            });
        }
        log::info!("picked {} {}", physical.kind(), physical.id());
        self.entries.push(Entry {
            kind: ResourceKind::PhysicalDevice,
            slot: Slot::Borrowed(physical),
        });
        let physical = self.require(ResourceKind::PhysicalDevice, ResourceKind::Device)?;

        // Compound step: device plus both queues must come back valid.
        let created = gateway.create_device(physical, surface);
        let queues_valid = created.graphics_queue.is_valid() && created.present_queue.is_valid();
        if !created.device.is_valid() || !queues_valid {
            if created.device.is_valid() {
                // Queues cannot be destroyed on their own and a device
                // without its queues is unusable: the step counts as
                // never created and the native device is abandoned.
                log::error!(
                    "device {} created but its queues are invalid; abandoning it",
                    created.device.id()
                );
                created.device.abandon();
            }
            return Err(StepError {
                kind: ResourceKind::Device,
            });
        }
        self.entries.push(Entry {
            kind: ResourceKind::Device,
            slot: Slot::Device {
                handle: created.device,
                graphics_queue: created.graphics_queue,
                present_queue: created.present_queue,
            },
        });
        let device = self.require(ResourceKind::Device, ResourceKind::Swapchain)?;

        let swapchain = gateway.create_swapchain(window, surface, physical, device);
        self.commit_owned(swapchain)?;

        Ok(())
    }

    /// Dependency lookup for the next step: the dependency must exist
    /// and still be valid, otherwise the step fails without a native
    /// call being made.
    fn require(&self, dep: ResourceKind, step: ResourceKind) -> Result<RawId, StepError> {
        match self.raw(dep) {
            Some(id) if self.is_valid(dep) => Ok(id),
            _ => {
                log::error!("{step} step requires a valid {dep}");
                Err(StepError { kind: step })
            }
        }
    }

    fn commit_owned(&mut self, handle: Handle) -> Result<(), StepError> {
        if !handle.is_valid() {
            return Err(StepError {
                kind: handle.kind(),
            });
        }
        log::info!("created {} {}", handle.kind(), handle.id());
        self.entries.push(Entry {
            kind: handle.kind(),
            slot: Slot::Owned(handle),
        });
        Ok(())
    }

    /// Release every entry in reverse creation order. Safe to call
    /// again: a drained chain is a no-op.
    pub fn release_all(&mut self, gateway: &mut dyn NativeGateway) {
        self.rollback_to(0, gateway);
    }

    fn rollback_to(&mut self, base: usize, gateway: &mut dyn NativeGateway) {
        while self.entries.len() > base {
            self.release_tail(gateway);
        }
    }

    fn release_tail(&mut self, gateway: &mut dyn NativeGateway) {
        let Some(entry) = self.entries.pop() else {
            return;
        };
        match entry.slot {
            // Destroyed implicitly with the owning instance/device.
            Slot::Borrowed(_) => {}
            Slot::Device { mut handle, .. } => {
                handle.release(|id| gateway.destroy_device(id));
            }
            Slot::Owned(mut handle) => match entry.kind {
                ResourceKind::Window => handle.release(|id| gateway.destroy_window(id)),
                ResourceKind::Instance => handle.release(|id| gateway.destroy_instance(id)),
                ResourceKind::Surface => {
                    // The owning instance is still in the chain (it is
                    // released after us); NULL only on an invariant
                    // breach, which the gateway logs.
                    let instance = self.raw(ResourceKind::Instance).unwrap_or(RawId::NULL);
                    handle.release(|id| gateway.destroy_surface(instance, id));
                }
                ResourceKind::Swapchain => {
                    let device = self.raw(ResourceKind::Device).unwrap_or(RawId::NULL);
                    handle.release(|id| gateway.destroy_swapchain(device, id));
                }
                kind => {
                    // PhysicalDevice and the queues are never stored
                    // as owned slots.
                    log::error!("owned {kind} entry cannot be released");
                    handle.abandon();
                }
            },
        }
    }
}

impl Default for ResourceChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::gateway::mock::Call;

    /// All chain kinds in creation order, queues folded into Device.
    const CHAIN_ORDER: [ResourceKind; 6] = [
        ResourceKind::Window,
        ResourceKind::Instance,
        ResourceKind::Surface,
        ResourceKind::PhysicalDevice,
        ResourceKind::Device,
        ResourceKind::Swapchain,
    ];

    fn chain_with_window(gateway: &mut MockGateway) -> ResourceChain {
        let mut chain = ResourceChain::new();
        let window = gateway.create_window(800, 600, "test");
        chain.adopt_window(window);
        chain
    }

    /// No entry may be valid while an earlier entry is invalid.
    fn assert_no_gap(chain: &ResourceChain) {
        let mut earlier_invalid = false;
        for kind in CHAIN_ORDER {
            if chain.is_valid(kind) {
                assert!(!earlier_invalid, "{kind} valid after an invalid dependency");
            } else {
                earlier_invalid = true;
            }
        }
    }

    #[test]
    fn full_build_creates_all_six_entries_in_order() {
        let mut gateway = MockGateway::new();
        let mut chain = chain_with_window(&mut gateway);

        chain.build_vulkan(&mut gateway).unwrap();

        assert_eq!(chain.len(), 6);
        for kind in CHAIN_ORDER {
            assert!(chain.is_valid(kind), "{kind} should be valid");
        }
        assert!(chain.is_valid(ResourceKind::GraphicsQueue));
        assert!(chain.is_valid(ResourceKind::PresentQueue));
        assert_no_gap(&chain);

        let creates: Vec<_> = gateway
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Create(kind) => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(creates, CHAIN_ORDER);
        assert!(gateway.destroys().is_empty());
    }

    #[test]
    fn teardown_releases_in_reverse_order_exactly_once() {
        let mut gateway = MockGateway::new();
        let mut chain = chain_with_window(&mut gateway);
        chain.build_vulkan(&mut gateway).unwrap();

        chain.release_all(&mut gateway);

        assert_eq!(
            gateway.destroys(),
            vec![
                ResourceKind::Swapchain,
                ResourceKind::Device,
                ResourceKind::Surface,
                ResourceKind::Instance,
                ResourceKind::Window,
            ]
        );
        assert!(chain.is_empty());

        // Releasing an already-drained chain issues nothing further.
        chain.release_all(&mut gateway);
        assert_eq!(gateway.destroys().len(), 5);
    }

    #[test]
    fn rollback_order_under_forced_failure_at_every_step() {
        let cases: [(ResourceKind, &[ResourceKind]); 5] = [
            (ResourceKind::Instance, &[]),
            (ResourceKind::Surface, &[ResourceKind::Instance]),
            (
                ResourceKind::PhysicalDevice,
                &[ResourceKind::Surface, ResourceKind::Instance],
            ),
            (
                ResourceKind::Device,
                &[ResourceKind::Surface, ResourceKind::Instance],
            ),
            (
                ResourceKind::Swapchain,
                &[
                    ResourceKind::Device,
                    ResourceKind::Surface,
                    ResourceKind::Instance,
                ],
            ),
        ];

        for (failing, expected_destroys) in cases {
            let mut gateway = MockGateway::failing(&[failing]);
            let mut chain = chain_with_window(&mut gateway);

            let err = chain.build_vulkan(&mut gateway).unwrap_err();
            assert_eq!(err, StepError { kind: failing });

            assert_eq!(gateway.destroys(), expected_destroys, "failing at {failing}");
            // The window survives rollback; the driver owns its teardown.
            assert_eq!(chain.len(), 1);
            assert!(chain.is_valid(ResourceKind::Window));
            assert_no_gap(&chain);

            // Borrowed handles are never destroyed, whatever failed.
            assert_eq!(gateway.destroy_count(ResourceKind::PhysicalDevice), 0);
            assert_eq!(gateway.destroy_count(ResourceKind::GraphicsQueue), 0);
            assert_eq!(gateway.destroy_count(ResourceKind::PresentQueue), 0);
        }
    }

    #[test]
    fn surface_failure_destroys_the_created_instance() {
        let mut gateway = MockGateway::failing(&[ResourceKind::Surface]);
        let mut chain = chain_with_window(&mut gateway);

        let err = chain.build_vulkan(&mut gateway).unwrap_err();
        assert_eq!(err.kind, ResourceKind::Surface);
        assert_eq!(err.to_string(), "Surface creation failed");

        // The instance created as id 2 is the one rolled back.
        assert!(gateway
            .calls
            .contains(&Call::Destroy(ResourceKind::Instance, RawId(2))));
    }

    #[test]
    fn invalid_queue_fails_the_device_step_without_a_device_destroy() {
        let mut gateway = MockGateway::new();
        gateway.fail_graphics_queue = true;
        let mut chain = chain_with_window(&mut gateway);

        let err = chain.build_vulkan(&mut gateway).unwrap_err();
        assert_eq!(err.kind, ResourceKind::Device);

        // The device is deemed not fully created: rollback destroys
        // Surface and Instance only.
        assert_eq!(
            gateway.destroys(),
            vec![ResourceKind::Surface, ResourceKind::Instance]
        );
        assert_eq!(gateway.destroy_count(ResourceKind::Device), 0);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn aliased_queues_are_a_valid_device_step() {
        let mut gateway = MockGateway::new();
        gateway.alias_queues = true;
        let mut chain = chain_with_window(&mut gateway);

        chain.build_vulkan(&mut gateway).unwrap();

        assert_eq!(
            chain.raw(ResourceKind::GraphicsQueue),
            chain.raw(ResourceKind::PresentQueue)
        );
        assert!(chain.is_valid(ResourceKind::Swapchain));
    }
}
