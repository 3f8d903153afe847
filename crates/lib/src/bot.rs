//! Bot runner: build the service clients from config, connect Slack, and dispatch until shutdown.

use crate::channels::{ChannelHandle, InboundMessage, SlackChannel};
use crate::config::{self, Config};
use crate::dispatcher::{DispatchOptions, Dispatcher};
use crate::intent::WitClient;
use crate::knowledge::WolframClient;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Inbound queue between the Slack connector and the dispatcher.
const INBOUND_QUEUE: usize = 64;

/// The three client handles, constructed once and shared read-only.
pub struct Clients {
    pub slack: Arc<SlackChannel>,
    pub wit: Arc<WitClient>,
    pub wolfram: Arc<WolframClient>,
}

/// Build clients from resolved credentials and optional base URL overrides.
pub fn build_clients(config: &Config) -> Result<Clients> {
    let creds = config::resolve_credentials(config)?;
    Ok(Clients {
        slack: Arc::new(SlackChannel::new(
            creds.slack_token,
            config.slack.api_base.clone(),
        )),
        wit: Arc::new(WitClient::new(
            creds.wit_token,
            config.wit.api_base.clone(),
            config.wit.api_version.clone(),
        )),
        wolfram: Arc::new(WolframClient::new(
            creds.wolfram_app_id,
            config.wolfram.api_base.clone(),
        )),
    })
}

/// Run the bot. Blocks until SIGINT/SIGTERM, then stops the Slack connector and waits for
/// in-flight messages to finish.
pub async fn run_bot(config: Config) -> Result<()> {
    let clients = build_clients(&config)?;
    let options = DispatchOptions::from(&config.dispatch);
    match options.max_in_flight {
        Some(n) => log::info!("dispatcher: at most {} message(s) in flight", n),
        None => log::info!("dispatcher: unbounded concurrency"),
    }
    let dispatcher = Dispatcher::new(
        clients.wit.clone(),
        clients.wolfram.clone(),
        clients.slack.clone(),
        options,
    );

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
    let mut slack_task = clients.slack.clone().start_inbound(inbound_tx);
    let dispatch_task = tokio::spawn(async move {
        dispatcher.run(inbound_rx).await;
    });

    let connector_exit = tokio::select! {
        _ = shutdown_signal() => None,
        res = &mut slack_task => Some(res),
    };
    let result = match connector_exit {
        None => {
            log::info!("shutdown signal received, stopping {} channel", clients.slack.id());
            clients.slack.stop();
            if let Err(e) = slack_task.await {
                log::warn!("{} connector ended abnormally: {}", clients.slack.id(), e);
            }
            Ok(())
        }
        Some(res) => {
            let err = connector_exit_error(clients.slack.id(), res);
            log::error!("{}", err);
            Err(err)
        }
    };
    // The connector owns the only sender; once it exits the dispatcher drains and returns.
    let _ = dispatch_task.await;
    log::info!("bot stopped");
    result
}

/// Error for a connector task that ended while the bot was still meant to be running.
fn connector_exit_error(channel_id: &str, res: Result<(), JoinError>) -> anyhow::Error {
    match res {
        Ok(()) => anyhow::anyhow!("{} connector exited unexpectedly", channel_id),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            anyhow::anyhow!("{} connector panicked: {}", channel_id, msg)
        }
        Err(e) => anyhow::anyhow!("{} connector task failed: {}", channel_id, e),
    }
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
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
}
