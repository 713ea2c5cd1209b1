use clap::{Parser, Subcommand};

use crate::semantic::SearchMode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service.
    Daemon {},

    /// Report length, preview and normalized form of a text
    Analyze {
        text: String,

        /// Include the embedding dimension in the report
        #[clap(short, long, default_value = "false")]
        embedding: bool,
    },

    /// Print the embedding of a text
    Embed {
        #[clap(allow_hyphen_values = true)]
        text: String,
    },

    /// Store a new content record
    Add {
        /// Content body
        #[clap(allow_hyphen_values = true)]
        body: String,

        /// Content title
        #[clap(short, long)]
        title: Option<String>,
    },

    /// Print one content record by id
    Get { id: String },

    /// List stored content, newest first
    List {},

    /// Search stored content or the fixed corpus
    Search {
        #[clap(allow_hyphen_values = true)]
        query: String,

        /// Maximum number of results. Defaults to `default_top_k` from config.yaml
        #[clap(short = 'k', long, allow_hyphen_values = true)]
        top_k: Option<i64>,

        /// memory (dot product over the fixed corpus) or store (L2 distance over
        /// stored content). Defaults to `search_mode` from config.yaml
        #[clap(short, long)]
        mode: Option<SearchMode>,
    },
}
