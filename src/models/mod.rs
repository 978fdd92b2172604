pub mod record;
pub mod selection;
pub mod work;

pub use record::{fields, normalize_cell, Record};
pub use selection::RowSelection;
pub use work::{partition, Batch, RowOutcome, RowStatus, StepResult, WorkItem};
