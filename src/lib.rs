//! # Goal
//! Reference counted shared ownership of a resource, built from small replaceable parts.
//!
//! # Architecture
//! - SharedHandle - value type that users copy, assign, and drop. Delegates all counting.
//! - Control block - one per adopted resource. Holds the count, the resource pointer,
//!   the disposer, and the allocator it came from. Frees itself once count reaches zero.
//! - Counter - policy for the count: plain, atomic, or locked.
//! - Dispose - what happens with the resource at zero: freed as `Box` by default, or given
//!   to a caller supplied callable.
//! - Allocator - where control blocks come from. Failure to allocate one never leaks
//!   the resource that was being adopted.
//!
//! # Example
//! ```
//! use sharer::core::LocalHandle;
//!
//! let s1 = LocalHandle::new(String::from("first"));
//! let s2 = LocalHandle::new(String::from("second"));
//! let mut s3 = s1.clone();
//! assert_eq!(s1.use_count(), 2);
//!
//! s3.assign(&s2);
//! s3.clone_from(&s2);
//! assert_eq!(s1.use_count(), 1);
//! assert_eq!(s2.use_count(), 2);
//! assert_eq!(*s3, "second");
//! ```

//? Important decisions:
//? - No weak references, no arrays, no aliasing constructors.
//? - Resource is never mutably accessible through a handle. Interior mutability is on the resource.

pub mod core;
// Generic things
pub mod util;
