use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Server-side wait of one long poll.
const LONG_POLL_SECS: u64 = 25;

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub forward_origin: Option<MessageOrigin>,
    /// Pre-7.0 Bot API servers still send this instead of `forward_origin`.
    #[serde(default)]
    pub forward_from: Option<User>,
}

impl Message {
    /// Author of the original message when this one is a forward of a
    /// visible user's message.
    pub fn forwarded_from_user(&self) -> Option<&User> {
        match &self.forward_origin {
            Some(MessageOrigin::User { sender_user }) => Some(sender_user),
            Some(_) => None,
            None => self.forward_from.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageOrigin {
    User { sender_user: User },
    HiddenUser { sender_user_name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
}

/// Outgoing side of the Bot API used by the handlers.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn forward_message(&self, chat_id: i64, from_chat_id: i64, message_id: i64)
    -> Result<()>;
}

pub struct BotClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct ForwardMessage {
    chat_id: i64,
    from_chat_id: i64,
    message_id: i64,
}

impl BotClient {
    pub fn new(bot_key: &str) -> Result<Self> {
        if bot_key.trim().is_empty() {
            bail!("bot key is empty");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_key),
        })
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let resp = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?;
        unwrap_response(resp).await
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T> {
        debug!("Bot API call: {}", method);
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?;
        unwrap_response(resp).await
    }
}

async fn unwrap_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body: TelegramResponse<T> = resp.json().await?;
    if !body.ok {
        return Err(anyhow!(
            "Bot API error {}: {}",
            status.as_u16(),
            body.description.unwrap_or_default()
        ));
    }
    body.result.ok_or_else(|| anyhow!("Bot API returned no result"))
}

#[async_trait]
impl Outbox for BotClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self.call("sendMessage", &SendMessage { chat_id, text }).await?;
        Ok(())
    }

    async fn forward_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "forwardMessage",
                &ForwardMessage {
                    chat_id,
                    from_chat_id,
                    message_id,
                },
            )
            .await?;
        Ok(())
    }
}
