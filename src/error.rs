use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::schemas::Name;

/// Problems with what a user typed. Recovered by re-prompting.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("\"{0}\" is not a number. Please enter the amount again, e.g. 120 or 45.5")]
    InvalidNumericInput(String),
    #[error("The amount must be greater than zero, got {0}. Please enter it again")]
    NonPositiveAmount(f64),
    #[error(
        "{0} is more than I can keep track of. Please enter an amount up to {max}",
        max = crate::engine::MAX_AMOUNT
    )]
    AmountTooLarge(f64),
    #[error("Sorry, I don't know the option \"{0}\". Please pick one from the menu")]
    InvalidMenuChoice(String),
    #[error("I need at least one participant name, separated by commas")]
    EmptyParticipantList,
    #[error("The name can't be empty. Please type a name")]
    BlankName,
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("{payer} doesn't owe {receiver} anything, so there is nothing to settle")]
    NoSuchDebt { payer: Name, receiver: Name },
    #[error("an expense needs at least one participant")]
    EmptyParticipantList,
    #[error("{0} can't be recorded, amounts must be positive and not absurdly large")]
    InvalidAmount(f64),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing X-Line-Signature header")]
    MissingSignature,
    #[error("signature header is not valid base64")]
    MalformedSignature,
    #[error("signature does not match the request body")]
    InvalidSignature,
    #[error("malformed webhook body: {0}")]
    MalformedBody(String),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::BadRequest().body(self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("request to messaging API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("messaging API rejected the reply with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("you need to add {0} to the env")]
    MissingVar(&'static str),
    #[error("PORT must be a number between 0 and 65535, got {0:?}")]
    InvalidPort(String),
}
