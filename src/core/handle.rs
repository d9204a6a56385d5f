use super::{
    Admits, AllocError, Allocator, Counter, DefaultDispose, DisposalKind, Dispose, Global, Header,
    Single, ThreadSafe,
};
use std::{fmt, marker::PhantomData, ops::Deref, ptr::NonNull};

/// Handle that can't be shared between threads.
///
/// ```compile_fail
/// use sharer::core::LocalHandle;
///
/// let handle = LocalHandle::new(1u32);
/// std::thread::spawn(move || drop(handle));
/// ```
pub type LocalHandle<T, A = Global> = SharedHandle<T, Single, A>;

/// Handle whose ownership can be shared between threads.
#[cfg(feature = "sync")]
pub type SyncHandle<T, A = Global> = SharedHandle<T, super::Atomic, A>;

/// Shared owner of a resource.
///
/// Cloning adds an owner, dropping removes one. The last owner disposes of the resource
/// and frees the control block. Handle can also be empty, in which case it owns nothing.
///
/// Only ownership is shared, resource is accessible only through &T.
pub struct SharedHandle<T, P: Counter = Single, A: Allocator = Global> {
    inner: Option<Inner<T, P, A>>,
    _owns: PhantomData<T>,
}

struct Inner<T, P: Counter, A: Allocator> {
    block: NonNull<Header<T, P, A>>,
    /// Copy of resource pointer from the block.
    resource: NonNull<T>,
}

impl<T, P: Counter, A: Allocator> Inner<T, P, A> {
    fn header(&self) -> &Header<T, P, A> {
        // SAFETY: Inner exists only in handles that hold an ownership unit of the block.
        unsafe { self.block.as_ref() }
    }
}

impl<T, P: Counter, A: Allocator> Clone for Inner<T, P, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, P: Counter, A: Allocator> Copy for Inner<T, P, A> {}

impl<T, P: Counter> SharedHandle<T, P, Global> {
    /// Moves value to heap and adopts it.
    pub fn new(value: T) -> Self
    where
        P: Admits<DefaultDispose> + Admits<Global>,
    {
        Self::from_box(Box::new(value))
    }

    pub fn from_box(value: Box<T>) -> Self
    where
        P: Admits<DefaultDispose> + Admits<Global>,
    {
        // SAFETY: Box pointer is valid for default disposal.
        unsafe { Self::from_raw(NonNull::new_unchecked(Box::into_raw(value))) }
    }

    /// Adopts resource allocated as `Box<T>`.
    ///
    /// UNSAFE: resource must come from Box::into_raw and not be owned by anything else.
    pub unsafe fn from_raw(resource: NonNull<T>) -> Self
    where
        P: Admits<DefaultDispose> + Admits<Global>,
    {
        Self::from_raw_with(resource, DefaultDispose)
    }

    /// Adopts resource that will be given to disposer once no owner remains.
    ///
    /// Aborts through alloc error handler if control block can't be allocated,
    /// after resource has been given to disposer.
    ///
    /// UNSAFE: resource must be valid to dereference until disposer is called,
    /// and not owned by anything else.
    pub unsafe fn from_raw_with<D: Dispose<T> + 'static>(resource: NonNull<T>, disposer: D) -> Self
    where
        P: Admits<D> + Admits<Global>,
    {
        match Self::try_from_raw_with_in(resource, disposer, Global) {
            Ok(handle) => handle,
            Err(error) => std::alloc::handle_alloc_error(error.layout()),
        }
    }
}

impl<T, P: Counter, A: Allocator + 'static> SharedHandle<T, P, A> {
    /// Moves value to heap and adopts it, allocating control block with alloc.
    /// On error value has been dropped.
    pub fn try_new_in(value: T, alloc: A) -> Result<Self, AllocError>
    where
        P: Admits<DefaultDispose> + Admits<A>,
    {
        Self::try_from_box_in(Box::new(value), alloc)
    }

    /// On error value has been dropped.
    pub fn try_from_box_in(value: Box<T>, alloc: A) -> Result<Self, AllocError>
    where
        P: Admits<DefaultDispose> + Admits<A>,
    {
        // SAFETY: Box pointer is valid for default disposal.
        unsafe { Self::try_from_raw_in(NonNull::new_unchecked(Box::into_raw(value)), alloc) }
    }

    /// UNSAFE: resource must come from Box::into_raw and not be owned by anything else.
    pub unsafe fn try_from_raw_in(resource: NonNull<T>, alloc: A) -> Result<Self, AllocError>
    where
        P: Admits<DefaultDispose> + Admits<A>,
    {
        Self::try_from_raw_with_in(resource, DefaultDispose, alloc)
    }

    /// The only way to establish ownership of a resource.
    ///
    /// Adoption is all or nothing: if control block can't be allocated, resource is
    /// given to disposer before error is returned.
    ///
    /// UNSAFE: resource must be valid to dereference until disposer is called,
    /// and not owned by anything else.
    pub unsafe fn try_from_raw_with_in<D: Dispose<T> + 'static>(
        resource: NonNull<T>,
        disposer: D,
        alloc: A,
    ) -> Result<Self, AllocError>
    where
        P: Admits<D> + Admits<A>,
    {
        let block = Header::<T, P, A>::allocate(resource, disposer, alloc)?;
        Ok(Self {
            inner: Some(Inner { block, resource }),
            _owns: PhantomData,
        })
    }
}

impl<T, P: Counter, A: Allocator> SharedHandle<T, P, A> {
    /// Handle that owns nothing.
    pub const fn empty() -> Self {
        Self {
            inner: None,
            _owns: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: Resource lives at least as long as this handle holds its ownership unit.
        self.inner.map(|inner| unsafe { &*inner.resource.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.map(|inner| inner.resource)
    }

    /// Number of handles sharing the resource, 0 if empty.
    pub fn use_count(&self) -> u32 {
        self.inner.map_or(0, |inner| inner.header().count())
    }

    /// True if this is the only owner.
    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }

    /// True if both share the same control block, or are both empty.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.map(|inner| inner.block) == other.inner.map(|inner| inner.block)
    }

    pub fn disposal_kind(&self) -> Option<DisposalKind> {
        self.inner.map(|inner| inner.header().kind())
    }

    /// Allocator of the control block.
    pub fn allocator(&self) -> Option<&A> {
        self.inner.as_ref().map(|inner| {
            // SAFETY: Block lives at least as long as this handle holds its ownership unit.
            let header: &Header<T, P, A> = unsafe { &*inner.block.as_ptr() };
            header.allocator()
        })
    }

    /// Gives up ownership, leaving this empty.
    /// If this was the last owner, resource is disposed of.
    pub fn reset(&mut self) {
        // Taken first so that a panicking disposal can't lead to a second release.
        if let Some(inner) = self.inner.take() {
            // SAFETY: inner held one ownership unit which is now given up.
            unsafe {
                Header::release(inner.block);
            }
        }
    }

    /// Makes this share other's resource.
    ///
    /// No op if both already share the same control block. Otherwise current resource is
    /// released, possibly disposing of it, and other's is acquired.
    pub fn assign(&mut self, other: &Self) {
        if self.ptr_eq(other) {
            return;
        }
        self.reset();
        if let Some(inner) = other.inner {
            inner.header().acquire();
            self.inner = Some(inner);
        }
    }
}

impl<T, P: Counter, A: Allocator> Clone for SharedHandle<T, P, A> {
    fn clone(&self) -> Self {
        if let Some(inner) = self.inner {
            inner.header().acquire();
        }
        Self {
            inner: self.inner,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T, P: Counter, A: Allocator> Drop for SharedHandle<T, P, A> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, P: Counter, A: Allocator> Default for SharedHandle<T, P, A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, P: Counter, A: Allocator> Deref for SharedHandle<T, P, A> {
    type Target = T;

    /// Panics if empty.
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!(
                "Dereferenced empty SharedHandle of {}",
                std::any::type_name::<T>()
            ),
        }
    }
}

// SAFETY: Counting is thread safe, resource is only accessed through &T and may be disposed of on any thread.
// Disposers and allocators carried by the block are restricted to Send + Sync through Admits.
unsafe impl<T: Send + Sync, P: ThreadSafe, A: Allocator + Send + Sync> Send
    for SharedHandle<T, P, A>
{
}

unsafe impl<T: Send + Sync, P: ThreadSafe, A: Allocator + Send + Sync> Sync
    for SharedHandle<T, P, A>
{
}

// Debug
impl<T: fmt::Debug, P: Counter, A: Allocator> fmt::Debug for SharedHandle<T, P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("SharedHandle")
                .field("value", value)
                .field("count", &self.use_count())
                .finish(),
            None => write!(f, "SharedHandle(empty)"),
        }
    }
}

// Pointer
impl<T, P: Counter, A: Allocator> fmt::Pointer for SharedHandle<T, P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = self
            .as_ptr()
            .map_or(std::ptr::null::<T>(), |ptr| ptr.as_ptr() as *const T);
        fmt::Pointer::fmt(&ptr, f)
    }
}
