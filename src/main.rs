use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use log::{error, info, warn};

mod cli;
mod cloud;
mod config;
mod detector;
mod manager;
mod messages;
mod notify;
mod recovery;

use crate::cloud::{CloudError, LoginSummary, TuyaClient};
use crate::config::AppConfig;
use crate::manager::{Manager, MonitorSettings};
use crate::notify::{NotificationDispatcher, SpeechSink};
use crate::recovery::TieredDelay;

fn initialize_logging() {
    // Timestamped output; RUST_LOG overrides the default level
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Warn)
        .filter_module(module_path!(), log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    initialize_logging();

    let cli = cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_overrides(&cli);

    let speech = &config.speech;
    let dispatcher = NotificationDispatcher::spawn(
        SpeechSink::from_config(speech),
        speech.queue_capacity.unwrap_or(notify::DEFAULT_QUEUE_CAPACITY),
    );
    let settings = MonitorSettings {
        device_id: config.cloud.device_id.clone(),
        alert_text: speech
            .alert_text
            .clone()
            .unwrap_or_else(|| notify::DEFAULT_ALERT_TEXT.to_string()),
        drain_timeout: speech
            .drain_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(notify::DEFAULT_DRAIN_TIMEOUT),
    };

    // Listen for ctrl-c from here on, so an interrupt during login is clean too
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for interrupt: {err}");
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(shutdown);

    let mut client = TuyaClient::new(config.cloud)?;
    if startup_login(client.connect(), shutdown.as_mut()).await == Startup::Interrupted {
        info!("Stopped by user.");
        dispatcher.shutdown(settings.drain_timeout).await;
        return Ok(());
    }

    let core = Manager::new(client, TieredDelay::default(), dispatcher, settings);
    core.run_loop(shutdown).await;

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Startup {
    Proceed,
    Interrupted,
}

/// Log in once, unless `shutdown` resolves first.
///
/// A failed login is only logged; the loop retries it on its own.
async fn startup_login<L, S>(login: L, shutdown: Pin<&mut S>) -> Startup
where
    L: Future<Output = Result<LoginSummary, CloudError>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => Startup::Interrupted,
        login = login => {
            match login {
                Ok(login) => info!(
                    "Logged in as {} (token valid for {:?})",
                    login.uid, login.expires_in
                ),
                Err(err) => error!("Authentication error: {err}"),
            }
            Startup::Proceed
        }
    }
}
