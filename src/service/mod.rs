//! Service helpers
//!
//! Describe, action and wait helpers shared by the resource handlers, one
//! module per remote service.

pub mod ecs;
pub mod fc;
pub mod log;
pub mod response;
pub mod slb;
