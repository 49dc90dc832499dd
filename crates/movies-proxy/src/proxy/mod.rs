//! Upstream forwarding and request correlation.

pub mod correlation;
pub mod forward;
