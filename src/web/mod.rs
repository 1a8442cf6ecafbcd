//! Integration with the host web framework.
//!
//! Use [`warp::request_log`] to feed every request served by a warp filter chain into a
//! [`crate::LogHandler`].

pub mod warp;
