use std::sync::Arc;
use tokio::signal;

use accordbot::config::{Config, ReplySource};
use accordbot::gateway::GatewayConnection;
use accordbot::reply::{CannedReplies, GeminiReplies, ReplyGenerator};
use accordbot::rest::{ChatApi, RestClient};
use accordbot::throttle::ReplyThrottle;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accordbot=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };
    print_banner(&config);

    let api: Arc<dyn ChatApi> = Arc::new(RestClient::new(
        config.api_url.clone(),
        config.token.clone(),
    ));
    let generator: Arc<dyn ReplyGenerator> = match (&config.reply_source, &config.gemini) {
        (ReplySource::Gemini, Some(gemini)) => Arc::new(GeminiReplies::new(
            gemini.api_key.clone(),
            gemini.model.clone(),
        )),
        _ => Arc::new(CannedReplies::default()),
    };

    let throttle = Arc::new(ReplyThrottle::new(config.reply_policy(), api, generator));
    let rotation_handle = throttle.spawn_rotation();

    let mut gateway = GatewayConnection::new(config.gateway(), Arc::clone(&throttle));
    gateway.run(shutdown_signal()).await;

    rotation_handle.abort();
    tracing::info!(
        "shutting down, answered {} user(s) this epoch",
        throttle.responded_count()
    );
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let sha = env!("ACCORDBOT_GIT_SHA");
    let replies = match (&config.reply_source, &config.gemini) {
        (ReplySource::Gemini, Some(gemini)) => format!("gemini ({})", gemini.model),
        _ => "canned".to_string(),
    };

    eprintln!();
    eprintln!("  \x1b[1;36maccordbot\x1b[0m \x1b[2mv{version} ({sha})\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mgateway\x1b[0m      {}", config.gateway_url);
    eprintln!("  \x1b[2mapi\x1b[0m          {}", config.api_url);
    eprintln!("  \x1b[2mchannel\x1b[0m      {}", config.channel_id);
    eprintln!("  \x1b[2mreplies\x1b[0m      {replies}");
    eprintln!(
        "  \x1b[2mlimits\x1b[0m       {} chars, {}s cool-down, {}s epoch",
        config.max_reply_chars,
        config.cooldown.as_secs(),
        config.epoch.as_secs()
    );
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
