pub mod write_batcher;

pub use write_batcher::{BatchConfig, FlushBatch, FlushReason, WriteBatcher};
