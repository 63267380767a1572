//! # pkit-runtime
//!
//! Thread-shared pieces of pkit: a pollable event counter, the I/O task
//! list and the worker thread that drains it.
//!
//! ## Modules
//!
//! - `config` - Build-time defaults with environment overrides
//! - `parking` - Futex (Linux) or Condvar thread parking
//! - `eventcount` - Saturating counter backed by eventfd
//! - `iotask` - I/O request record with release/acquire completion
//! - `iolist` - Spinlocked FIFO ring of tasks
//! - `ioworker` - Worker thread running read/write tasks

pub mod config;
pub mod parking;
pub mod eventcount;
pub mod iotask;
pub mod iolist;
pub mod ioworker;

pub use config::{ConfigError, RuntimeConfig};
pub use parking::{new_parking, Parking, PlatformParking};
pub use eventcount::EventCount;
pub use iotask::{IoOp, IoTask, TaskState, CURRENT_POSITION};
pub use iolist::IoList;
pub use ioworker::IoWorker;
