//! Type definitions for the client.
//!
//! Values, rows, keys, and read timestamp bounds shared by every layer.

mod keys;
mod timestamps;
mod value;

pub use keys::{Key, KeyBound, KeyRange, KeySet};
pub use timestamps::TimestampBounds;
pub use value::{row, Row, Value};
