mod csv;
mod dataset;

pub use self::csv::{ingest, load_csv, Ingested, MAX_FILE_SIZE};
pub use dataset::Dataset;
