use crate::error::MessengerError;
use crate::schemas::{ReplyPayload, UserId};
use async_trait::async_trait;
use serde::Serialize;

/// Where a reply goes: the sender and the one-shot token from their event.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplyContext {
    pub user_id: UserId,
    pub reply_token: String,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, ctx: &ReplyContext, payload: &ReplyPayload) -> Result<(), MessengerError>;
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quick_reply: Option<QuickReply<'a>>,
}

#[derive(Serialize, Debug, PartialEq)]
struct QuickReply<'a> {
    items: Vec<QuickReplyItem<'a>>,
}

#[derive(Serialize, Debug, PartialEq)]
struct QuickReplyItem<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action: MessageAction<'a>,
}

#[derive(Serialize, Debug, PartialEq)]
struct MessageAction<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    label: &'a str,
    text: &'a str,
}

fn reply_request<'a>(reply_token: &'a str, payload: &'a ReplyPayload) -> ReplyRequest<'a> {
    let quick_reply = match payload {
        ReplyPayload::PlainText { .. } => None,
        ReplyPayload::TextWithChoices { choices, .. } => Some(QuickReply {
            items: choices
                .iter()
                .map(|choice| QuickReplyItem {
                    kind: "action",
                    action: MessageAction {
                        kind: "message",
                        label: &choice.label,
                        text: &choice.value,
                    },
                })
                .collect(),
        }),
    };
    ReplyRequest {
        reply_token,
        messages: vec![TextMessage {
            kind: "text",
            text: payload.body(),
            quick_reply,
        }],
    }
}

/// Sends replies through the platform's reply endpoint.
pub struct LineMessenger {
    client: reqwest::Client,
    reply_url: String,
    access_token: String,
}

impl LineMessenger {
    pub fn new(api_base: &str, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            reply_url: format!("{}/v2/bot/message/reply", api_base.trim_end_matches('/')),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl Messenger for LineMessenger {
    async fn send(&self, ctx: &ReplyContext, payload: &ReplyPayload) -> Result<(), MessengerError> {
        let response = self
            .client
            .post(&self.reply_url)
            .bearer_auth(&self.access_token)
            .json(&reply_request(&ctx.reply_token, payload))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(user_id = %ctx.user_id, "reply delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MessengerError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
