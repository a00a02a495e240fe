//! Preview pipeline for the culling view.
//!
//! This module provides:
//! - `Decoder` / `RawPreviewDecoder` - RAW to displayable image, with placeholder fallback
//! - `PreviewCache` - Bounded LRU with a prefetch window around the current image
//! - `DecodeQueue` - Fixed worker pool for background decodes

pub mod cache;
pub mod decoder;
pub mod queue;

pub use cache::{PreviewCache, PreviewStore};
pub use decoder::{Converter, Decoder, PreviewImage, RawPreviewDecoder};
pub use queue::{DecodeQueue, DecodeRequest};
