//! Cross-origin access control.
//!
//! - [`Cors`]: preflight handling and header exposure for a set of URL regexes.

mod cors;

pub use cors::Cors;
