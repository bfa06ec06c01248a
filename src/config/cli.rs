use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the kmlmap binary.
#[derive(Debug, Parser)]
#[command(
    name = "kmlmap",
    version,
    about = "Render map requests as KML documents and KMZ archives"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "KMLMAP_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render one map request to a file or stdout.
    Render(RenderArgs),
    /// List the layers of the configured catalog.
    Layers,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Map request as a key-value-pair query string (`layers=...&bbox=...`).
    #[arg(long, value_name = "KVP")]
    pub query: String,

    /// Write the response body here instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the catalog file.
    #[arg(long = "catalog", value_name = "PATH", value_hint = ValueHint::FilePath, global = true)]
    pub catalog: Option<PathBuf>,

    /// Override the base URL used for overlay and pagination links.
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Override the server side placemark cap per layer.
    #[arg(long = "max-features", value_name = "COUNT", global = true)]
    pub max_features: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
