// Production decode and output capabilities: Symphonia and cpal

pub mod decoder;
pub mod output;

pub use decoder::{SymphoniaDecoder, SymphoniaFactory};
pub use output::{CpalSink, CpalSinkFactory};
