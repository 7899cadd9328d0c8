//! Per-hop delay profiling.
//!
//! A batch of uniquely tagged messages is sent one by one from a route's
//! source; each message is timed until it can be popped from the
//! destination's inbox. Received samples are summarized and handed to the
//! artifact writer.

pub mod error;
pub mod pacer;
pub mod profiler;
pub mod stats;
pub mod types;

pub use error::{ProfilerError, ProfilerResult};
pub use pacer::SendPacer;
pub use profiler::{draw_tags, DelayProfiler};
pub use types::{
    DelayProfile, DelayStats, Histogram, PacketRecord, ProfileLabels, ProfilerConfig,
    HISTOGRAM_BINS,
};
