//! HTTP route handlers

pub mod catches;
pub mod relay_jobs;
pub mod status;
