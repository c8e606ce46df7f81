//! `Platform` over a JSON/HTTP bridge to the chat platform's user API.
//!
//! The bridge owns the protocol session (MTProto, auth keys, flood waits);
//! this client only speaks its REST surface:
//!
//! | call                         | body                                   |
//! |------------------------------|----------------------------------------|
//! | `POST /sessions`             | `{name, api_id, api_hash}`             |
//! | `POST /sessions/{s}/resolve` | `{identifier}` → `Peer`                |
//! | `GET  /sessions/{s}/dialogs` | → `[Dialog]`                           |
//! | `POST /sessions/{s}/participants` | `{peer}` → `ParticipantSnapshot`  |
//! | `POST /sessions/{s}/search`  | `{peer, search, from_user, limit}` → `MessagePage` |
//! | `POST /sessions/{s}/forward` | `{from_peer, ids, to_peer}`            |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use park_types::models::DeploymentConfig;
use park_types::remote::{Dialog, MessagePage, ParticipantSnapshot, Peer};

use crate::error::PlatformError;
use crate::platform::{MessageQuery, Platform};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpPlatform {
    client: Client,
    session_url: String,
}

#[derive(Serialize)]
struct StartSession<'a> {
    name: &'a str,
    api_id: i64,
    api_hash: &'a str,
}

#[derive(Deserialize)]
struct SessionStarted {
    session_id: String,
}

#[derive(Serialize)]
struct Resolve<'a> {
    identifier: &'a str,
}

#[derive(Serialize)]
struct Participants<'a> {
    peer: &'a Peer,
}

#[derive(Serialize)]
struct Search<'a> {
    peer: &'a Peer,
    search: Option<&'a str>,
    from_user: Option<i64>,
    limit: usize,
}

#[derive(Serialize)]
struct Forward<'a> {
    from_peer: &'a Peer,
    ids: &'a [i64],
    to_peer: &'a Peer,
}

impl HttpPlatform {
    /// Opens (or resumes) the session named after the deployment.
    pub async fn start(base_url: &str, config: &DeploymentConfig) -> Result<Self, PlatformError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.trim_end_matches('/');

        let started: SessionStarted = send(
            "start session",
            client.post(format!("{}/sessions", base_url)).json(&StartSession {
                name: &config.id,
                api_id: config.api_id,
                api_hash: &config.api_hash,
            }),
        )
        .await?;

        info!("Platform session {} started via {}", started.session_id, base_url);
        Ok(Self {
            client,
            session_url: format!("{}/sessions/{}", base_url, started.session_id),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.session_url, path)
    }
}

async fn send<T: DeserializeOwned>(call: &str, req: RequestBuilder) -> Result<T, PlatformError> {
    Ok(checked(call, req).await?.json::<T>().await?)
}

/// Sends `req` and maps error statuses. The body of a success is left unread.
async fn checked(call: &str, req: RequestBuilder) -> Result<Response, PlatformError> {
    debug!("bridge call: {}", call);
    let resp = req.send().await?;
    let status = resp.status();

    if status == StatusCode::NOT_FOUND {
        let message = resp.text().await.unwrap_or_default();
        return Err(PlatformError::NotFound(format!("{}: {}", call, message)));
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(PlatformError::Api {
            call: call.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    Ok(resp)
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn resolve_entity(&self, identifier: &str) -> Result<Peer, PlatformError> {
        send(
            "resolve",
            self.client.post(self.url("resolve")).json(&Resolve { identifier }),
        )
        .await
    }

    async fn dialogs(&self) -> Result<Vec<Dialog>, PlatformError> {
        send("dialogs", self.client.get(self.url("dialogs"))).await
    }

    async fn participants(&self, channel: &Peer) -> Result<ParticipantSnapshot, PlatformError> {
        send(
            "participants",
            self.client
                .post(self.url("participants"))
                .json(&Participants { peer: channel }),
        )
        .await
    }

    async fn search_messages(
        &self,
        channel: &Peer,
        query: &MessageQuery,
    ) -> Result<MessagePage, PlatformError> {
        send(
            "search",
            self.client.post(self.url("search")).json(&Search {
                peer: channel,
                search: query.search.as_deref(),
                from_user: query.from_user,
                limit: query.limit,
            }),
        )
        .await
    }

    async fn forward_messages(
        &self,
        from: &Peer,
        ids: &[i64],
        to: &Peer,
    ) -> Result<(), PlatformError> {
        // any 2xx counts, with or without a body
        checked(
            "forward",
            self.client.post(self.url("forward")).json(&Forward {
                from_peer: from,
                ids,
                to_peer: to,
            }),
        )
        .await?;
        Ok(())
    }
}
