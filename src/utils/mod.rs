pub mod columns;
pub mod logging;

pub use columns::{column_letter, find_column};
pub use logging::truncate_text;
