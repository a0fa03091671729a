mod buffer;
mod job;
mod pipeline;

pub use buffer::PieceBuffer;
pub use job::PieceJob;
pub use pipeline::{download_piece, PipelineOptions};

/// Standard block size (16 KB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Requests kept in flight per connection
pub const PIPELINE_DEPTH: usize = 5;
