//! # cartera-shared
//!
//! Domain models and conversion logic shared by every Cartera crate.
//!
//! The remote store hands back loosely-shaped documents (see [`value`]);
//! the [`normalize`] module converts those into the strict entities in
//! [`models`]. Normalization is total: malformed input degrades to
//! documented defaults, it never fails.

pub mod models;
pub mod normalize;
pub mod value;

pub use models::*;
pub use value::{Fields, RawDocument, Value};
