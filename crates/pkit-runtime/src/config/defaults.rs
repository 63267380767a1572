//! Compile-time defaults merged by build.rs
//!
//! Override any of them at build time with `PKIT_CONFIG_RS=/path/to/file.rs`.

include!(concat!(env!("OUT_DIR"), "/pkit_merged_config.rs"));
