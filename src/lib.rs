pub mod compile;
pub mod engine;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod lockfile;
pub mod observability;
pub mod pipeline;
pub mod presets;
pub mod probe;
pub mod slides;
pub mod timeline;
pub mod validation;

pub use compile::{CompiledProgram, compile};
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{RenderError, RenderResult};
pub use pipeline::{RenderOptions, RenderPipeline};
pub use probe::{FfprobeProbe, MediaProbe};
pub use timeline::Timeline;
