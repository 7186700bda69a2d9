//! tessera-pipeline: Cached raster image pipeline (sans-IO).
//!
//! A [`Pipeline`] starts from an image file or a blank canvas, applies an
//! ordered list of operations (crop, scale, scale-and-crop, rotate, line,
//! rectangle, text, overlay) and encodes the result as PNG, JPEG or GIF.
//! Results are cached under a fingerprint of the source and every
//! operation parameter, so identical requests skip rendering.
//!
//! This crate performs **no direct I/O**. Files are reached through the
//! [`Filesystem`] trait, artifacts are stored through [`CacheStore`] and
//! streamed output goes to an [`OutputSink`]. `tessera-io` provides the
//! disk-backed implementations; [`MemoryFs`] and [`BufferSink`] keep
//! everything in memory.
//!
//! ```no_run
//! use std::rc::Rc;
//! use tessera_pipeline::{Color, Format, FsCache, MemoryFs, Pipeline, Rectangle, Rotate};
//!
//! # fn main() -> Result<(), tessera_pipeline::PipelineError> {
//! let fs = Rc::new(MemoryFs::new());
//! let cache = Rc::new(FsCache::new(fs.clone(), "/cache"));
//! let mut pipeline = Pipeline::new(fs).with_cache(cache);
//! pipeline.create(200, 100)?;
//! pipeline.add_operation(Rectangle::new(10, 10, 50, 20).color(Color::parse("#ff0000")?));
//! pipeline.add_operation(Rotate::new(30.0));
//! let png = pipeline.encode(Format::Png)?;
//! # let _ = png;
//! # Ok(())
//! # }
//! ```

pub mod canvas;
pub mod color;
pub mod config;
pub mod crop;
pub mod draw;
pub mod entities;
pub mod fingerprint;
pub mod operation;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod recipe;
pub mod rotate;
pub mod scale;
pub mod store;
pub mod text;
pub mod types;

pub use canvas::{Canvas, MAX_TEXT_SIZE};
pub use color::{Color, ColorParseError, MAX_ALPHA};
pub use config::{PipelineConfig, ResampleFilter};
pub use crop::Crop;
pub use draw::{Line, Rectangle};
pub use fingerprint::{CacheValue, Fingerprint, FingerprintBuilder};
pub use operation::{ImageOperation, RenderContext, Rendered};
pub use output::{BufferSink, OutputSink, data_uri};
pub use overlay::Overlay;
pub use pipeline::{Pipeline, PipelineHandle, Source};
pub use recipe::{OperationSpec, Recipe, SourceSpec};
pub use rotate::Rotate;
pub use scale::{Scale, ScaleAndCrop};
pub use store::{CacheStore, Filesystem, FsCache, MemoryFs, cache_file_name};
pub use text::Text;
pub use types::{Dimensions, Format, PipelineError, RgbaImage};
