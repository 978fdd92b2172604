pub mod manual_entry;
pub mod nomination;
pub mod operator;
pub mod registry;
pub mod tabular;

pub use manual_entry::ManualEntryLog;
pub use nomination::{HttpNominator, Nominator};
pub use operator::{ConsoleOperator, Operator};
pub use registry::{RegistryTable, RegistryUpdater, SheetsRegistry};
pub use tabular::{
    write_back_with_retry, CsvOutputStore, CsvRowSource, CsvTable, OutputStore, RowSource,
    UpsertAction,
};
