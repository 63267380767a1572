//! # pkit - POSIX systems toolkit
//!
//! Low-level building blocks for systems programs on POSIX hosts.
//!
//! ## Features
//!
//! - **Binary stack**: page-backed LIFO arena with pointers that never move
//! - **Splay tree**: intrusive, allocation-free, self-adjusting search tree
//! - **Event counter**: saturating counter with a pollable descriptor
//! - **I/O worker**: a thread running queued read/write tasks in FIFO order
//! - **Codecs**: percent encoding, Base64, good-suffix substring search and
//!   an `http` URL record
//!
//! ## Quick Start
//!
//! ```ignore
//! use pkit::{EventCount, IoTask, IoWorker, CURRENT_POSITION};
//!
//! let worker = IoWorker::new()?;
//! let done = EventCount::new()?;
//! let mut buf = vec![0u8; 4096];
//! let task = IoTask::new_read(fd, &mut buf, 0, Some(&done));
//! unsafe { worker.submit(&[&task])? };
//! done.wait(-1)?;
//! let n = task.result().unwrap()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   pkit-core      errors, logging, env, pages, BinStack, SplayTree, SpinLock
//!       ^
//!   pkit-codec     WBuffer, urlencode, base64, strsearch, Url
//!   pkit-runtime   config, parking, EventCount, IoTask, IoList, IoWorker
//! ```
//!
//! ## Environment
//!
//! - `PKIT_LOG_LEVEL`, `PKIT_FLUSH_EPRINT` - logging
//! - `PKIT_WORKER_STACK_SIZE`, `PKIT_WORKER_PARK_TIMEOUT_MS`,
//!   `PKIT_WORKER_NAME`, `PKIT_BINSTACK_PREALLOC` - runtime config

pub use pkit_codec;
pub use pkit_core;
pub use pkit_runtime;

pub use pkit_core::{
    kdebug, kerror, kinfo, ktrace, kwarn,
    page_size, BinStack, KitError, KitResult, SplayTree, TreeAdapter, TreeIter, TreeNode,
};

pub use pkit_codec::{
    base64decode, base64encode, rsearch, search, urldecode, urlencode, RevStrSearch,
    StaticBuffer, StrSearch, Url, UrlField, UrlParts, WBuffer,
};

pub use pkit_runtime::{
    EventCount, IoList, IoTask, IoWorker, Parking, RuntimeConfig, TaskState, CURRENT_POSITION,
};
