//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Polls RSS feeds, filters their entries and queues the matches.
#[derive(Parser, Debug)]
#[command(name = "grabrss")]
#[command(author, version, about)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/grabrss/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the job store (defaults to <config dir>/grabrss)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Poll every enabled feed on the configured interval until Ctrl-C
    Run,
    /// Poll one feed now
    Poll {
        feed: String,
        /// Classify only, never queue downloads
        #[arg(long)]
        no_download: bool,
        /// Remember entries without acting if the feed was never polled
        #[arg(long)]
        ignore_first: bool,
        /// Queue accepted entries even when marked as first batch
        #[arg(long)]
        force: bool,
    },
    /// Print the tracked entries of a feed
    Show { feed: String },
    /// Mark the entries of a feed with this url or message id as downloaded
    Flag { feed: String, id: String },
    /// Drop the tracked state of a feed
    Delete { feed: String },
    /// Forget a feed's entries so the next poll starts fresh
    Clear { feed: String },
    /// List configured feeds
    Feeds,
}
