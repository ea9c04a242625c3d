//! Expression data model and store.
//!
//! - [`SampleCatalog`]: the declared sample columns of one dataset
//! - [`ExpressionRecord`]: one reporter's values across samples
//! - [`ExpressionStore`]: raw values on disk, queried by hub id

pub mod record;
pub mod samples;
pub mod store;

pub use record::{ExpressionRecord, SampleValue};
pub use samples::{truncate_name, Sample, SampleCatalog, ValueType};
pub use store::{merge_by_group, ExpressionStore, RawExpressionRow};
