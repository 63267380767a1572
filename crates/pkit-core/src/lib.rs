//! # pkit-core
//!
//! Core building blocks of the pkit systems toolkit.
//!
//! Everything here is synchronous and allocation-light: containers work on
//! caller-owned memory or on whole pages mapped straight from the OS.
//!
//! ## Modules
//!
//! - `error` - Errno-style error kind shared by all pkit crates
//! - `memory` - Page size and page-granular allocation
//! - `binstack` - Variable-size LIFO arena with stable pointers
//! - `splaytree` - Intrusive self-adjusting search tree
//! - `spinlock` - Short-critical-section lock
//! - `kprint` - Leveled logging macros
//! - `env` - Environment variable utilities

pub mod error;
pub mod memory;
pub mod binstack;
pub mod splaytree;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use error::{FirstError, KitError, KitResult};
pub use memory::{alloc_pages, free_pages, page_size, PageBlock};
pub use binstack::BinStack;
pub use splaytree::{SplayTree, TreeAdapter, TreeIter, TreeNode};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
