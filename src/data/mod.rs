//! Data collaborators for the training engine.
//!
//! The engine only sees [`BatchSource`]; everything else here is a
//! convenience for building sources from in-memory rows, CSV bytes or images.

pub mod csv;
pub mod image;
pub mod source;

pub use self::csv::{parse_csv, builtin_blobs, builtin_xor};
pub use self::image::{image_to_tensor, ImageChannels};
pub use source::{Batch, BatchSource, InMemoryDataset};
