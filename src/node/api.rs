use crate::node::error::NodeResult;
use crate::node::types::{InboxMessage, PeerId, Protocol, Session, SessionOpenRequest};
use async_trait::async_trait;

/// The subset of a mixnet node's API the harness drives.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Send `body` to `destination` over `path`. `Ok(false)` means the node
    /// refused the message.
    async fn send_message(
        &self,
        destination: &PeerId,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> NodeResult<bool>;

    /// Pop the oldest inbox message carrying `tag`, if any.
    async fn pop_message(&self, tag: u16) -> NodeResult<Option<InboxMessage>>;

    /// Open and fund an outgoing channel, returning its id.
    async fn open_channel(&self, destination_address: &str, amount: u128) -> NodeResult<String>;

    async fn close_channel(&self, channel_id: &str) -> NodeResult<bool>;

    async fn session_open(
        &self,
        protocol: Protocol,
        request: &SessionOpenRequest,
    ) -> NodeResult<Session>;

    async fn session_list(&self, protocol: Protocol) -> NodeResult<Vec<Session>>;

    async fn session_close(&self, session: &Session) -> NodeResult<bool>;

    /// Raw metrics exposition text.
    async fn metrics(&self) -> NodeResult<String>;
}
