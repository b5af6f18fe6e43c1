pub mod extractor;
pub mod models;

pub use extractor::{ExtractorConfig, MediaTextExtractor};
pub use models::{DownloadBlob, ExtractionReport};
