//! tessera-io: Disk and stream backends for `tessera-pipeline`.
//!
//! - [`LocalFs`]: the [`Filesystem`](tessera_pipeline::Filesystem) over
//!   `std::fs`, with atomic writes.
//! - [`open_dir_cache`]: a directory of cached artifacts.
//! - [`CgiSink`]: streams a content-type header followed by the body.

pub mod cache;
pub mod fs;
pub mod sink;

pub use cache::{DEFAULT_CACHE_DIR, open_dir_cache};
pub use fs::LocalFs;
pub use sink::CgiSink;
