pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod record;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::{MemoryRecordStore, Statement};
pub use postgres::PgRecordStore;
pub use record::{ChangeType, FieldChange, Record, PRIMARY_KEY};
pub use store::{RecordStore, StoreTransaction};
