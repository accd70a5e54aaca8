mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use grabrss_core::feed::USER_AGENT;
use grabrss_core::{
    shared_config, spawn_scheduler, Collaborators, HttpFeedSource, JsonFilePersistence, RssConfig,
    RssEngine, RunOptions, SchedulerConfig,
};
use reqwest::{redirect, ClientBuilder};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn config_dir() -> PathBuf {
    // Linux: ~/.config/grabrss
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grabrss")
}

async fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.unwrap_or_else(|| config_dir().join("config.json"));
    let data_dir = args.data_dir.unwrap_or_else(config_dir);
    let config = RssConfig::load_from(&config_path);

    if args.command == Command::Feeds {
        for (name, feed) in &config.feeds {
            let state = if feed.enabled { "" } else { " (disabled)" };
            println!("{name}\t{}{state}", feed.uri);
        }
        return Ok(());
    }

    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))?;
    let collaborators = Collaborators::logging(&config.categories);
    let scheduler_config = SchedulerConfig::from_settings(&config.settings);
    let engine = Arc::new(
        RssEngine::new(
            shared_config(config),
            Arc::new(HttpFeedSource::with_client(client)),
            collaborators,
            Arc::new(JsonFilePersistence::in_dir(&data_dir)),
        )
        .await,
    );

    let result = match args.command {
        Command::Run => {
            let handle = spawn_scheduler(Arc::clone(&engine), scheduler_config);
            info!(interval = ?scheduler_config.interval, "RSS scheduler started");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("stopping RSS scheduler");
            handle.stop().await.map_err(|e| e.to_string())
        }
        Command::Poll {
            feed,
            no_download,
            ignore_first,
            force,
        } => {
            let options = RunOptions {
                download: !no_download,
                ignore_first,
                force,
            };
            match engine.run_feed(&feed, options).await {
                Ok(outcome) => {
                    let queued = outcome.new_downloads.len();
                    println!("{} entries, {queued} queued", outcome.entries_seen);
                    for title in &outcome.new_downloads {
                        println!("  {title}");
                    }
                    Ok(())
                }
                Err(err) => Err(err.to_string()),
            }
        }
        Command::Show { feed } => {
            for (link, job) in engine.show_result(&feed).await {
                println!("{}\t{}\t{}\t{link}", job.order, job.status, job.title);
            }
            return Ok(());
        }
        Command::Flag { feed, id } => {
            let flagged = engine.flag_downloaded(&feed, &id).await;
            println!("{flagged} record(s) marked downloaded");
            Ok(())
        }
        Command::Delete { feed } => {
            if !engine.delete_feed(&feed).await {
                println!("nothing tracked for {feed}");
            }
            Ok(())
        }
        Command::Clear { feed } => {
            engine.clear_feed(&feed).await;
            Ok(())
        }
        Command::Feeds => return Ok(()),
    };

    // a failed poll may still have written records
    let saved = engine
        .save()
        .await
        .map_err(|e| format!("failed to save RSS data: {e}"));
    if let (Err(_), Err(save_err)) = (&result, &saved) {
        error!(error = %save_err, "RSS data not saved");
    }
    result.and(saved)
}
