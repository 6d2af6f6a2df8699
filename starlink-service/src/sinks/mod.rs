pub mod store_batch;

pub use store_batch::StoreBatchSink;
