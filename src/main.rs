use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use travel_assist::api::{AppState, ProviderInfo, api_routes};
use travel_assist::channels::{ImapSmtpTransport, MailTransport};
use travel_assist::config::{AppConfig, NotificationConfig};
use travel_assist::llm::create_chain;
use travel_assist::notify::{EmailSink, NotificationSink, Notifier, SlackWebhookSink, SmsSink};
use travel_assist::pipeline::EmailPipeline;
use travel_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("✈️  Travel Assist v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── LLM chain ────────────────────────────────────────────────────────
    let chain = create_chain(&config.provider_chain());
    let providers = ProviderInfo {
        selection: config.provider.label().to_string(),
        chain: chain.chain(),
    };
    if chain.is_empty() {
        eprintln!("   AI: rule-based fallback only ({})", providers.selection);
    } else {
        eprintln!("   AI: {} ({})", providers.chain.join(" -> "), providers.selection);
    }

    // ── Mail transport ───────────────────────────────────────────────────
    let transport: Option<Arc<dyn MailTransport>> = config.email.clone().map(|email| {
        eprintln!("   Email: IMAP {}, SMTP {}", email.imap_host, email.smtp_host);
        Arc::new(ImapSmtpTransport::new(email, config.timeouts.mail)) as Arc<dyn MailTransport>
    });
    if transport.is_none() {
        eprintln!("   Email: disabled (EMAIL_IMAP_HOST not set)");
    }

    // ── Notifications ────────────────────────────────────────────────────
    let sinks = notification_sinks(&config.notifications, transport.as_ref());
    let notifier = Notifier::new(sinks, config.timeouts.notification);
    let sink_names = notifier.sink_names();
    eprintln!(
        "   Notifications: {}",
        if sink_names.is_empty() { "none".to_string() } else { sink_names.join(", ") }
    );

    // ── Pipeline ─────────────────────────────────────────────────────────
    let mut pipeline = EmailPipeline::new(Arc::clone(&store), Arc::new(chain), config.timeouts.inference)
        .with_notifier(notifier)
        .with_fetch_window(config.fetch_window);
    if let Some(transport) = transport {
        pipeline = pipeline.with_transport(transport);
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = api_routes(AppState::new(store, Arc::new(pipeline), providers));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    eprintln!("   API: http://0.0.0.0:{}/api\n", config.port);
    tracing::info!(port = config.port, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

/// Stderr logging, plus a daily-rotated file when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "travel-assist.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn notification_sinks(
    config: &NotificationConfig,
    transport: Option<&Arc<dyn MailTransport>>,
) -> Vec<Arc<dyn NotificationSink>> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();
    if let Some(transport) = transport {
        if let Some(to) = &config.human_agent_email {
            sinks.push(Arc::new(EmailSink::human_agent(to.clone(), Arc::clone(transport))));
        }
        if let Some(to) = &config.sales_team_email {
            sinks.push(Arc::new(EmailSink::sales_team(to.clone(), Arc::clone(transport))));
        }
    } else if config.human_agent_email.is_some() || config.sales_team_email.is_some() {
        tracing::warn!("Email notification recipients set but no mail transport configured");
    }
    if let Some(url) = &config.slack_webhook_url {
        sinks.push(Arc::new(SlackWebhookSink::new(url.clone())));
    }
    if let Some(sms) = &config.sms {
        sinks.push(Arc::new(SmsSink::new(sms)));
    }
    sinks
}
