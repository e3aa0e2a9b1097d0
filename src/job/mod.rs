// Jobs: the two end-to-end flows built on the core read/write loops.
pub mod export;
pub mod replicate;

pub use export::{ColumnMap, ExportConfig, ExportReport, run_export};
pub use replicate::{
    Destination, DestinationOutcome, DestinationStatus, ReplicateConfig, ReplicateReport,
    run_replicate,
};
