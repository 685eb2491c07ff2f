//! Image format conversion worker
//!
//! Producers store an original image in blob storage and enqueue a conversion
//! job; the worker fetches the original, derives every requested format and
//! stores the results next to it, then removes the original.

pub mod convert;
pub mod error;
pub mod models;
pub mod producer;
pub mod queue;
pub mod storage;
pub mod worker;

pub use error::{Error, Result};
