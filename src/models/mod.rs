pub mod failure;
pub mod point;
pub mod time;
pub mod window;

pub use failure::{FailureKind, MigrationError};
pub use point::{classify, Classified, DataPoint, FieldValue, SourceRecord, SourceValue};
pub use time::TimeFormat;
pub use window::{MigrationTask, TimeWindow};
