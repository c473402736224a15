//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    author = "neur0map",
    about = "Ask questions about a single document",
    long_about = "Folio loads one document, splits it into overlapping chunks, embeds them into an \
                  in-memory vector index and answers questions with a generative model grounded in \
                  the most similar chunks. Run `folio serve` once and ask from anywhere over its \
                  Unix socket."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/folio/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the document and answer questions over the socket
    Serve {
        /// Document to load (defaults to document.path from the config)
        #[arg(short, long, value_name = "FILE")]
        document: Option<PathBuf>,
    },

    /// Ask a question about the document
    Ask {
        /// Question to ask
        question: String,

        /// Load the document in this process instead of asking a running server
        #[arg(long)]
        local: bool,

        /// Document to load in local mode
        #[arg(short, long, value_name = "FILE")]
        document: Option<PathBuf>,

        /// Print the retrieved chunks instead of an answer (implies --local)
        #[arg(long)]
        show_context: bool,

        /// Show the reply in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the state of a running server
    Status,

    /// Split a text file into chunks and print them
    Chunk {
        /// Text file to split
        file: PathBuf,

        /// Chunk size in characters (defaults to chunking.chunk_size)
        #[arg(short, long)]
        size: Option<usize>,

        /// Overlap in characters (defaults to chunking.chunk_overlap)
        #[arg(short, long)]
        overlap: Option<usize>,

        /// Show chunks in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section (e.g. "llm")
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
