// Native resource handles
//
// One move-only wrapper for every destructible native object (window,
// instance, surface, device, swapchain) plus a borrowed variant for
// objects whose lifetime is owned by their parent (physical device,
// queues). Destruction goes through the resource chain, never through
// a handle's own destructor.

use std::fmt;

/// Opaque native identifier. Holds a `GLFWwindow*` or any Vulkan
/// handle bit pattern (dispatchable handles are pointers,
/// non-dispatchable ones are 64-bit ids).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawId(pub u64);

impl RawId {
    /// Sentinel meaning "no resource".
    pub const NULL: RawId = RawId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Which link of the bring-up chain a handle belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceKind {
    Window,
    Instance,
    Surface,
    PhysicalDevice,
    Device,
    GraphicsQueue,
    PresentQueue,
    Swapchain,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Window => "Window",
            ResourceKind::Instance => "Instance",
            ResourceKind::Surface => "Surface",
            ResourceKind::PhysicalDevice => "PhysicalDevice",
            ResourceKind::Device => "Device",
            ResourceKind::GraphicsQueue => "GraphicsQueue",
            ResourceKind::PresentQueue => "PresentQueue",
            ResourceKind::Swapchain => "Swapchain",
        };
        f.write_str(name)
    }
}

/// Owning wrapper around one destructible native resource.
///
/// Deliberately neither `Copy` nor `Clone`: exactly one owner at a
/// time, and moving the handle voids the source at the language level.
#[derive(Debug)]
pub struct Handle {
    kind: ResourceKind,
    id: RawId,
    owns: bool,
}

impl Handle {
    /// Wrap a freshly created native identifier. A sentinel id yields
    /// a handle that is already invalid - the gateway's only failure
    /// signal.
    pub fn from_native(kind: ResourceKind, id: RawId) -> Self {
        Self {
            kind,
            id,
            owns: !id.is_null(),
        }
    }

    /// An invalid handle of the given kind.
    pub fn invalid(kind: ResourceKind) -> Self {
        Self::from_native(kind, RawId::NULL)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> RawId {
        self.id
    }

    /// Pure query, no side effect.
    pub fn is_valid(&self) -> bool {
        self.owns && !self.id.is_null()
    }

    /// Release the underlying resource through `destroy`. Idempotent:
    /// the callback runs at most once over the handle's lifetime.
    /// Whatever the native destroy reports is not our concern here -
    /// the gateway logs unrecoverable destroy failures itself.
    pub fn release<F>(&mut self, destroy: F)
    where
        F: FnOnce(RawId),
    {
        if !self.owns {
            return;
        }
        destroy(self.id);
        self.owns = false;
        self.id = RawId::NULL;
    }

    /// Give up ownership without a destroy call. Reserved for the
    /// products of a failed compound creation step, which the chain
    /// treats as never created.
    pub fn abandon(mut self) {
        self.owns = false;
        self.id = RawId::NULL;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // A still-owned handle at drop is a leak: the chain is the
        // only place destroy calls may be issued from.
        if self.owns {
            log::warn!("leaked {} handle {}", self.kind, self.id);
        }
    }
}

/// Reference to a resource owned by another resource (physical device
/// by the instance, queues by the device). There is no release
/// operation: no code path can issue a destroy call for these.
#[derive(Clone, Copy, Debug)]
pub struct BorrowedHandle {
    kind: ResourceKind,
    id: RawId,
}

impl BorrowedHandle {
    pub fn from_native(kind: ResourceKind, id: RawId) -> Self {
        Self { kind, id }
    }

    pub fn invalid(kind: ResourceKind) -> Self {
        Self::from_native(kind, RawId::NULL)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> RawId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_null()
    }
}
