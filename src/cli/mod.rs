use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "accessify",
    about = "Accessify - Turn audio, images and PDFs into accessible content",
    version,
    long_about = "A CLI tool that makes content accessible: transcribes and narrates audio, writes alt text for images and rewrites PDFs in plain language. Uses an OpenAI-compatible inference API."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// API key for the inference service
    #[arg(long, env = "ACCESSIFY_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a local file or a URL
    Process {
        /// File path or http(s) URL (audio, image or PDF)
        #[arg(value_name = "FILE_OR_URL")]
        input: String,

        /// User charged for processing when a quota store is configured
        #[arg(short, long, env = "ACCESSIFY_USER_ID")]
        user: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Ask a question about an image once it has been analyzed
        #[arg(long, value_name = "QUESTION")]
        question: Option<String>,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Show remaining processing quota
    Quota {
        /// User whose quota to show
        #[arg(short, long, env = "ACCESSIFY_USER_ID")]
        user: String,
    },

    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported content formats
    Formats,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// Delete every cached result
    Clear,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON including the full analysis
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
