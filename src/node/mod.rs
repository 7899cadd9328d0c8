//! Node identities, routes and the API surface the harness consumes.

pub mod api;
pub mod error;
pub mod http;
pub mod metrics;
pub mod types;

pub use api::NodeApi;
pub use error::{NodeError, NodeResult};
pub use http::HttpNodeApi;
pub use metrics::MetricsSnapshot;
pub use types::{
    Capabilities, Capability, DelayConfig, InboxMessage, Node, PeerId, Protocol, Route, Session,
    SessionOpenRequest, SessionPath, SessionTarget, RESERVED_TAG_UPPER_BOUND,
};
