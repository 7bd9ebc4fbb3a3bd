pub mod batcher;
pub mod segment;

pub use batcher::TranscriptBatcher;
pub use segment::{Speaker, TranscriptSegment};
