use std::{fmt, ptr::NonNull};

/// Which disposal strategy a control block was created with.
/// Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisposalKind {
    /// Resource is freed as a `Box<T>`.
    Default,
    /// Resource is given to a caller supplied callable.
    Custom,
}

impl fmt::Display for DisposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Action taken on the resource once no owner remains.
///
/// Any `FnOnce(NonNull<T>)` is a custom disposal.
pub trait Dispose<T> {
    /// UNSAFE: ptr must be the resource this was created for, and this is called at most once for it.
    unsafe fn dispose(self, ptr: NonNull<T>);

    fn kind(&self) -> DisposalKind {
        DisposalKind::Custom
    }
}

/// Frees resource that was allocated as `Box<T>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDispose;

impl<T> Dispose<T> for DefaultDispose {
    unsafe fn dispose(self, ptr: NonNull<T>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }

    fn kind(&self) -> DisposalKind {
        DisposalKind::Default
    }
}

impl<T, F: FnOnce(NonNull<T>)> Dispose<T> for F {
    unsafe fn dispose(self, ptr: NonNull<T>) {
        self(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    struct Flag(Rc<Cell<bool>>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn default_frees_box() {
        let dropped = Rc::new(Cell::new(false));
        let ptr = NonNull::from(Box::leak(Box::new(Flag(dropped.clone()))));

        assert_eq!(Dispose::<Flag>::kind(&DefaultDispose), DisposalKind::Default);
        unsafe { DefaultDispose.dispose(ptr) };
        assert!(dropped.get());
    }

    #[test]
    fn closure_receives_pointer() {
        let mut value = 7u32;
        let expected = NonNull::from(&mut value);
        let seen = Cell::new(None);

        let disposer = |ptr: NonNull<u32>| seen.set(Some(ptr));
        assert_eq!(Dispose::<u32>::kind(&disposer), DisposalKind::Custom);
        unsafe { disposer.dispose(expected) };

        assert_eq!(seen.get(), Some(expected));
    }
}
