//! HuggingFace Hub integration for unclip.
//!
//! Turns a tokenizer identifier (local file, local directory, or Hub repo id)
//! into a path to a `tokenizer.json` on disk.

#![warn(missing_docs)]

mod download;

pub use download::*;
