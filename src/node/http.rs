//! REST client for a node's v3 API.

use crate::node::api::NodeApi;
use crate::node::error::{NodeError, NodeResult};
use crate::node::types::{
    InboxMessage, OpenChannelRequest, OpenChannelResponse, PeerId, PopMessageRequest, Protocol,
    SendMessageRequest, Session, SessionOpenRequest,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

pub const API_BASE_PATH: &str = "/api/v3";
pub const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone)]
pub struct HttpNodeApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNodeApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> NodeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_BASE_PATH}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTH_HEADER, token),
            None => request,
        }
    }

    async fn expect_status(response: Response, expected: &[StatusCode]) -> NodeResult<Response> {
        let status = response.status();
        if expected.contains(&status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NodeError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn send_message(
        &self,
        destination: &PeerId,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> NodeResult<bool> {
        let request = SendMessageRequest {
            tag,
            body: body.to_string(),
            peer_id: destination.clone(),
            path: path.to_vec(),
        };

        let response = self
            .authorize(self.client.post(self.url("/messages")))
            .json(&request)
            .send()
            .await?;

        let accepted = response.status() == StatusCode::ACCEPTED;
        if !accepted {
            tracing::warn!(
                status = %response.status(),
                %destination,
                tag,
                "node rejected message"
            );
        }
        Ok(accepted)
    }

    async fn pop_message(&self, tag: u16) -> NodeResult<Option<InboxMessage>> {
        let response = self
            .authorize(self.client.post(self.url("/messages/pop")))
            .json(&PopMessageRequest { tag })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::expect_status(response, &[StatusCode::OK]).await?;
        Ok(Some(response.json().await?))
    }

    async fn open_channel(&self, destination_address: &str, amount: u128) -> NodeResult<String> {
        let request = OpenChannelRequest {
            peer_address: destination_address.to_string(),
            amount: amount.to_string(),
        };

        let response = self
            .authorize(self.client.post(self.url("/channels")))
            .json(&request)
            .send()
            .await?;

        let response =
            Self::expect_status(response, &[StatusCode::CREATED, StatusCode::OK]).await?;
        let opened: OpenChannelResponse = response.json().await?;
        Ok(opened.channel_id)
    }

    async fn close_channel(&self, channel_id: &str) -> NodeResult<bool> {
        let response = self
            .authorize(self.client.delete(self.url(&format!("/channels/{channel_id}"))))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn session_open(
        &self,
        protocol: Protocol,
        request: &SessionOpenRequest,
    ) -> NodeResult<Session> {
        let response = self
            .authorize(self.client.post(self.url(&format!("/session/{protocol}"))))
            .json(request)
            .send()
            .await?;

        let response =
            Self::expect_status(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        Ok(response.json().await?)
    }

    async fn session_list(&self, protocol: Protocol) -> NodeResult<Vec<Session>> {
        let response = self
            .authorize(self.client.get(self.url(&format!("/session/{protocol}"))))
            .send()
            .await?;

        let response = Self::expect_status(response, &[StatusCode::OK]).await?;
        Ok(response.json().await?)
    }

    async fn session_close(&self, session: &Session) -> NodeResult<bool> {
        let path = format!(
            "/session/{}/{}/{}",
            session.protocol, session.ip, session.port
        );
        let response = self
            .authorize(self.client.delete(self.url(&path)))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn metrics(&self) -> NodeResult<String> {
        let response = self
            .authorize(self.client.get(self.url("/node/metrics")))
            .send()
            .await?;

        let response = Self::expect_status(response, &[StatusCode::OK]).await?;
        Ok(response.text().await?)
    }
}
