use std::{alloc::Layout, fmt::Display};

/// Control block couldn't be allocated.
///
/// By the time this is returned the adopted resource has already been disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    layout: Layout,
    resource: &'static str,
}

impl AllocError {
    pub fn new<T: ?Sized>(layout: Layout) -> Self {
        Self {
            layout,
            resource: std::any::type_name::<T>(),
        }
    }

    /// Layout of the control block that failed to allocate.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Type name of the resource that was being adopted.
    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

impl Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to allocate control block of {} bytes aligned to {} for {}.",
            self.layout.size(),
            self.layout.align(),
            self.resource
        )
    }
}

impl std::error::Error for AllocError {}
