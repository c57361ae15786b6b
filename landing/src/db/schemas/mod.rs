//! Document schemas for the primary store

pub mod catch_record;
pub mod metadata;
pub mod relay_job;

pub use catch_record::{CatchRecord, CatchStatus, GeoPoint, CATCH_COLLECTION};
pub use metadata::Metadata;
pub use relay_job::{RelayJobDoc, RELAY_JOB_COLLECTION};
