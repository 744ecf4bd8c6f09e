//! Template engine module.
//!
//! Provides Jinja2-compatible template rendering using minijinja.

mod engine;
mod host_object;

pub use engine::TemplateEngine;
pub use host_object::HostObject;
