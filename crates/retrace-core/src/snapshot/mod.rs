//! Request capture building blocks shared by the API middleware

pub mod geo;
pub mod redact;

pub use geo::{GeoResolver, PlatformGeo};
pub use redact::{body_value, redact_headers, truncate_with_marker, TRUNCATION_MARKER};
