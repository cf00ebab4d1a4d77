pub mod column;
pub mod change_log;

pub use change_log::ChangeLogEntry;
pub use column::ColumnInfo;
