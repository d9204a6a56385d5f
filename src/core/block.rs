use super::{AllocError, Allocator, Counter, DisposalKind, Dispose};
use log::*;
use std::{
    alloc::Layout,
    mem::ManuallyDrop,
    ptr::{self, NonNull},
};

/// Type erased part of control block.
/// Shared by all handles of one resource.
#[repr(C)]
pub struct Header<T, P: Counter, A: Allocator> {
    count: P,
    resource: NonNull<T>,
    kind: DisposalKind,
    /// Monomorphised for the disposer the block was created with.
    destroy: unsafe fn(NonNull<Header<T, P, A>>),
    alloc: A,
}

#[repr(C)]
struct Block<T, P: Counter, A: Allocator, D> {
    header: Header<T, P, A>,
    disposer: ManuallyDrop<D>,
}

impl<T, P: Counter, A: Allocator> Header<T, P, A> {
    /// Allocates control block for resource with count of 1.
    ///
    /// If allocation fails, resource is disposed of with disposer before returning error.
    ///
    /// UNSAFE: resource must be valid for disposer, and not owned by anything else.
    pub unsafe fn allocate<D: Dispose<T>>(
        resource: NonNull<T>,
        disposer: D,
        alloc: A,
    ) -> Result<NonNull<Self>, AllocError> {
        let layout = Layout::new::<Block<T, P, A, D>>();
        let Some(ptr) = alloc.allocate(layout) else {
            error!(
                "Failed to allocate control block for {:p} of {}, disposing of it with {} disposal.",
                resource,
                std::any::type_name::<T>(),
                disposer.kind()
            );
            disposer.dispose(resource);
            return Err(AllocError::new::<T>(layout));
        };

        let block = ptr.cast::<Block<T, P, A, D>>();
        block.as_ptr().write(Block {
            header: Header {
                count: P::new(),
                resource,
                kind: disposer.kind(),
                destroy: destroy::<T, P, A, D>,
                alloc,
            },
            disposer: ManuallyDrop::new(disposer),
        });
        trace!("Allocated control block {:p} for {:p}", block, resource);

        // Header is first field of repr(C) Block.
        Ok(block.cast())
    }

    /// Adds one owner.
    #[inline]
    pub fn acquire(&self) {
        self.count.acquire();
    }

    /// Removes one owner. At zero disposes of the resource and then frees the control block.
    /// True if it was disposed.
    ///
    /// UNSAFE: caller must be giving up an ownership unit it holds. If this returns true,
    /// header is dangling.
    #[inline]
    pub unsafe fn release(header: NonNull<Self>) -> bool {
        if !header.as_ref().count.release() {
            return false;
        }
        let destroy = header.as_ref().destroy;
        destroy(header);
        true
    }

    pub fn count(&self) -> u32 {
        self.count.count()
    }

    pub fn resource(&self) -> NonNull<T> {
        self.resource
    }

    pub fn kind(&self) -> DisposalKind {
        self.kind
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

/// UNSAFE: header must be of a Block<T, P, A, D> whose count has reached zero.
unsafe fn destroy<T, P: Counter, A: Allocator, D: Dispose<T>>(header: NonNull<Header<T, P, A>>) {
    let block = header.cast::<Block<T, P, A, D>>().as_ptr();
    let resource = (*block).header.resource;
    debug!(
        "Disposing of {:p} of {} with {} disposal.",
        resource,
        std::any::type_name::<T>(),
        (*block).header.kind
    );

    let disposer = ManuallyDrop::take(&mut (*block).disposer);
    disposer.dispose(resource);

    // Last thing, release own storage.
    let alloc = ptr::read(ptr::addr_of!((*block).header.alloc));
    ptr::drop_in_place(ptr::addr_of_mut!((*block).header.count));
    alloc.deallocate(
        NonNull::new_unchecked(block).cast(),
        Layout::new::<Block<T, P, A, D>>(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DefaultDispose, Global, Single};
    use std::{cell::Cell, rc::Rc};

    struct Exhausted;

    impl Allocator for Exhausted {
        fn allocate(&self, _: Layout) -> Option<NonNull<u8>> {
            None
        }

        unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {
            unreachable!("Nothing was allocated");
        }
    }

    fn leak(value: u64) -> NonNull<u64> {
        NonNull::from(Box::leak(Box::new(value)))
    }

    #[test]
    fn disposes_at_zero() {
        let disposed = Rc::new(Cell::new(0));
        let resource = leak(3);
        let counter = disposed.clone();
        let header = unsafe {
            Header::<u64, Single, Global>::allocate(
                resource,
                move |ptr: NonNull<u64>| {
                    counter.set(counter.get() + 1);
                    drop(Box::from_raw(ptr.as_ptr()));
                },
                Global,
            )
        }
        .unwrap();

        unsafe {
            assert_eq!(header.as_ref().count(), 1);
            assert_eq!(header.as_ref().kind(), DisposalKind::Custom);
            assert_eq!(header.as_ref().resource(), resource);

            header.as_ref().acquire();
            assert_eq!(header.as_ref().count(), 2);

            assert!(!Header::release(header));
            assert_eq!(disposed.get(), 0);
            assert!(Header::release(header));
        }
        assert_eq!(disposed.get(), 1);
    }

    #[test]
    fn default_kind() {
        let header =
            unsafe { Header::<u64, Single, Global>::allocate(leak(1), DefaultDispose, Global) }
                .unwrap();
        unsafe {
            assert_eq!(header.as_ref().kind(), DisposalKind::Default);
            assert!(Header::release(header));
        }
    }

    #[test]
    fn failed_allocation_disposes_with_given_disposer() {
        let disposed = Rc::new(Cell::new(None));
        let resource = leak(5);
        let seen = disposed.clone();
        let result = unsafe {
            Header::<u64, Single, Exhausted>::allocate(
                resource,
                move |ptr: NonNull<u64>| {
                    seen.set(Some(ptr));
                    drop(Box::from_raw(ptr.as_ptr()));
                },
                Exhausted,
            )
        };

        let error = result.err().unwrap();
        assert_eq!(error.resource(), "u64");
        assert_eq!(disposed.get(), Some(resource));
    }
}
