mod local;

pub use local::LocalIngestor;
