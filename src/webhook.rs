use crate::error::WebhookError;
use crate::schemas::UserId;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Message {
        reply_token: String,
        source: Source,
        message: Message,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub user_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

/// A text message worth handing to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundText {
    pub user_id: UserId,
    pub reply_token: String,
    pub text: String,
}

impl WebhookBody {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|err| WebhookError::MalformedBody(err.to_string()))
    }

    pub fn text_messages(&self) -> Vec<InboundText> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Message {
                    reply_token,
                    source:
                        Source {
                            user_id: Some(user_id),
                        },
                    message: Message::Text { text },
                } => Some(InboundText {
                    user_id: user_id.clone(),
                    reply_token: reply_token.clone(),
                    text: text.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
