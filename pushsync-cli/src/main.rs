mod cli;
mod console;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use pushsync::feed::ContentFeed;
use pushsync::flags::{FeatureFlag, ImpressionSink};
use pushsync::logging::{LoggingOptions, init_logging};
use pushsync::push::{AgentConfig, AgentHandle, NotificationData, PushInterceptionAgent, RawPush};
use pushsync::{EngineConfig, EventLog, Session};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{Args, Commands, RefreshArg};
use crate::console::{ConsoleHost, ConsoleSource};

/// Prints every impression.
struct ConsoleImpressions;

impl ImpressionSink for ConsoleImpressions {
    fn log_impression(&self, flag_id: &str) {
        println!("[impression] {flag_id}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.quiet {
        Some("error".to_string())
    } else if args.verbose {
        Some("pushsync=debug".to_string())
    } else {
        None
    };
    let (logging, _guard) = init_logging(&LoggingOptions {
        filter,
        log_dir: args.log_dir.clone(),
        json: false,
    })?;
    debug!(filter = %logging.get_filter(), log_dir = ?args.log_dir, "Logging initialized");

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::from_env()?,
    };
    debug!(?config, "Configuration loaded");

    let log = run(&args, config).await?;
    if args.show_log {
        println!("--- event log ({} entries) ---", log.len());
        for entry in log.snapshot() {
            println!("{}", serde_json::to_string(&entry)?);
        }
    }
    Ok(())
}

async fn run(args: &Args, config: EngineConfig) -> Result<EventLog> {
    match &args.command {
        Commands::Push { input, click } => {
            let body = read_input(input).await?;
            let (agent, host, log) = spawn_agent(args, &config)?;

            let disposition = agent.push(RawPush::new(Some(body))).await?;
            println!("disposition: {disposition}");

            if let (Some(action), Some(id)) = (click, disposition.rendered_id()) {
                let data = host
                    .last_shown()
                    .map(|(_, options)| options.data)
                    .unwrap_or_default();
                let action = (action.as_str() != "default").then_some(action.as_str());
                let outcome = agent.click(id, action, data).await?;
                println!("click: {outcome:?}");
            }

            agent.terminate().await;
            Ok(log)
        }

        Commands::Replay { input } => {
            let text = String::from_utf8(read_input(input).await?).context("input is not UTF-8")?;
            let (agent, _host, log) = spawn_agent(args, &config)?;

            let pushes = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| agent.push(RawPush::text(line)));
            for (i, result) in join_all(pushes).await.into_iter().enumerate() {
                match result {
                    Ok(disposition) => println!("#{}: {disposition}", i + 1),
                    Err(e) => println!("#{}: not delivered ({e})", i + 1),
                }
            }

            agent.terminate().await;
            Ok(log)
        }

        Commands::Click { url, action } => {
            let (agent, _host, log) = spawn_agent(args, &config)?;
            let data = NotificationData {
                url: url.clone(),
                ..NotificationData::default()
            };
            let outcome = agent
                .click("cli-notification", action.as_deref(), data)
                .await?;
            println!("click: {outcome:?}");

            agent.terminate().await;
            Ok(log)
        }

        Commands::TestNotification => {
            let (agent, _host, log) = spawn_agent(args, &config)?;
            let id = agent.show_test_notification().await?;
            println!("test notification: {id}");

            agent.terminate().await;
            Ok(log)
        }

        Commands::Refresh {
            kind,
            deliver,
            delay_ms,
            fail,
            user,
        } => {
            let source = Arc::new(ConsoleSource::new(fail.map(Into::into)));
            let session = Session::new(config, source, Arc::new(ConsoleImpressions))?;

            if let Some(user) = user {
                session.identify(Some(user.as_str())).await;
            }
            session.start().await?;

            if let Some(path) = deliver {
                spawn_delivery(&session, *kind, path, Duration::from_millis(*delay_ms)).await?;
            }

            let outcome = match kind {
                RefreshArg::Feed => session.refresh_feed().await?,
                RefreshArg::Flags => session.refresh_flags().await?,
            };
            println!("outcome: {outcome:?}");
            match kind {
                RefreshArg::Feed => println!("feed: {}", session.feed_status()),
                RefreshArg::Flags => {
                    println!("{}", serde_json::to_string_pretty(&session.ui_state())?)
                }
            }

            session.shutdown().await;
            Ok(session.log().clone())
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(EventLog::with_capacity(config.event_log_capacity))
        }
    }
}

fn spawn_agent(
    args: &Args,
    config: &EngineConfig,
) -> Result<(AgentHandle, Arc<ConsoleHost>, EventLog)> {
    let host = Arc::new(ConsoleHost::new(args.permission.into(), &args.clients));
    let log = EventLog::with_capacity(config.event_log_capacity);
    let push_host = pushsync::PushHost::new(host.clone(), host.clone(), host.clone(), host.clone());

    let agent = PushInterceptionAgent::spawn(
        AgentConfig::from_engine(config)?,
        push_host,
        log.clone(),
        CancellationToken::new(),
    );
    info!(origin = agent.origin(), "Push agent spawned");
    Ok((agent, host, log))
}

/// Deliver the file's state on the subscription channel after `delay`.
async fn spawn_delivery(
    session: &Session,
    kind: RefreshArg,
    path: &Path,
    delay: Duration,
) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    match kind {
        RefreshArg::Feed => {
            let feed: ContentFeed = serde_json::from_str(&text)?;
            let sender = session.feed_sender();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sender.deliver(feed).await
            });
        }
        RefreshArg::Flags => {
            let flags: Vec<FeatureFlag> = serde_json::from_str(&text)?;
            let sender = session.flag_sender();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sender.deliver(flags).await
            });
        }
    }
    Ok(())
}

async fn read_input(input: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    if input == "-" {
        tokio::io::stdin().read_to_end(&mut body).await?;
    } else {
        body = tokio::fs::read(input)
            .await
            .with_context(|| format!("reading {input}"))?;
    }
    Ok(body)
}
