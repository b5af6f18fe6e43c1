pub mod report;

pub use report::{DownloadBlob, ExtractionReport, DESCRIPTION_FILE_NAME, TEXT_FILE_NAME};
