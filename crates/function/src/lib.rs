//! HTTP entrypoint: receives push deliveries and runs one controller
//! invocation per delivery.

pub mod app;
pub mod push;
