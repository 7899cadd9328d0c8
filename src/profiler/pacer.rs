//! Send pacing for profiling batches using the governor crate

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Limits how fast profiling messages leave the source node
#[derive(Clone, Default)]
pub struct SendPacer {
    /// `None` when pacing is disabled
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl SendPacer {
    /// Create a pacer allowing `messages_per_second` sends (0 = unlimited)
    pub fn new(messages_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(messages_per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Wait until the next send is allowed
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}
