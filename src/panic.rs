//! Utilities for working with panic payloads.
//!
//! A subscriber that panics is caught at the dispatch site; these helpers turn
//! the payload into text for the resulting connection error and for logs.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use std::any::Any;
///
/// use framelink::panic::format_panic;
///
/// let text: Box<dyn Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(&*text).to_string(), "boom");
/// let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
/// assert_eq!(format_panic(&*owned).to_string(), "boom");
/// let other: Box<dyn Any + Send> = Box::new(5_u32);
/// assert!(format_panic(&*other).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
///
/// Pass the payload itself (`&*payload`), not a reference to its box.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }
