//! Primary store: MongoDB client, document schemas, and the stores the
//! gateway and relay worker share.

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use store::{MemoryStore, MongoStore, RecordStore};
