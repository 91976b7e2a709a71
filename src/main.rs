use actix_web::{get, middleware::Logger, post, web, App, HttpRequest, HttpResponse, HttpServer};
use futures::future::join_all;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod engine;
mod error;
mod ledger;
mod messenger;
mod schemas;
mod session;
mod webhook;

use crate::{
    auth::{verify_signature, SIGNATURE_HEADER},
    config::Config,
    engine::LedgerEngine,
    error::WebhookError,
    ledger::DebtLedger,
    messenger::{LineMessenger, Messenger, ReplyContext},
    session::SessionStore,
    webhook::WebhookBody,
};

/// The channel secret, kept apart from the rest of the config so handlers
/// only see what they need.
struct ChannelSecret(String);

#[get("/")]
async fn home() -> HttpResponse {
    HttpResponse::Ok().body("FinBot server is running!")
}

#[post("/callback")]
async fn callback(
    request: HttpRequest,
    body: web::Bytes,
    secret: web::Data<ChannelSecret>,
    engine: web::Data<LedgerEngine>,
    messenger: web::Data<dyn Messenger>,
) -> Result<HttpResponse, WebhookError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = verify_signature(&secret.0, &body, signature) {
        tracing::warn!(error = %err, "rejected webhook");
        return Err(err);
    }
    let webhook = WebhookBody::parse(&body)?;

    let replies: Vec<_> = webhook
        .text_messages()
        .into_iter()
        .filter_map(|inbound| {
            let payload = engine.process_message(&inbound.user_id, &inbound.text)?;
            let ctx = ReplyContext {
                user_id: inbound.user_id,
                reply_token: inbound.reply_token,
            };
            Some((ctx, payload))
        })
        .collect();

    let results = join_all(
        replies
            .iter()
            .map(|(ctx, payload)| messenger.send(ctx, payload)),
    )
    .await;
    for ((ctx, _), result) in replies.iter().zip(results) {
        if let Err(err) = result {
            tracing::error!(user_id = %ctx.user_id, error = %err, "failed to send reply");
        }
    }

    Ok(HttpResponse::Ok().body("OK"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finbot=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    tracing::info!(?config, "starting FinBot");

    let engine = web::Data::new(LedgerEngine::new(
        config.trigger.clone(),
        SessionStore::new(),
        DebtLedger::new(),
    ));
    let messenger: Arc<dyn Messenger> = Arc::new(LineMessenger::new(
        &config.api_base,
        config.access_token.clone(),
    ));
    let messenger = web::Data::from(messenger);
    let secret = web::Data::new(ChannelSecret(config.channel_secret.clone()));

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(engine.clone())
            .app_data(messenger.clone())
            .app_data(secret.clone())
            .service(home)
            .service(callback)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
