mod allocator;
mod block;
mod counter;
mod dispose;
mod error;
mod handle;

pub use allocator::*;
pub use block::Header;
pub use counter::*;
pub use dispose::*;
pub use error::*;
pub use handle::*;

/* NOTES

- Handle -> control block -> disposer. Handles never touch the resource's storage,
  only the block does, and only once at zero.

- Block is allocated only by adoption. Copy/assign/drop only move the count.

- Disposer and allocator types are erased behind the block's destroy fn, so handles
  with different disposers have the same type.

- Single counter is the default. Sharing between threads is opt in through policy,
  and even then only the count is synchronized.
*/
