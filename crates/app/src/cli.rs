//! Command line arguments.

use std::path::PathBuf;

use apixt_domain::ThemeMode;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Apixt command line arguments.
#[derive(Parser, Debug)]
#[command(name = "apixt", version)]
#[command(about = "Streams command responses from an API and renders them as a tree")]
pub struct Cli {
    /// Settings file (default: $APIXT_SETTINGS, then the platform config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub settings: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a request to the active API environment and render the stream
    Stream(StreamArgs),

    /// Render a recorded stream
    Replay(ReplayArgs),

    /// Show or edit the settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug, Default)]
pub struct StreamArgs {
    /// Path appended to the base URL; may reference `{{constants}}`
    #[arg(required_unless_present = "saved")]
    pub path: Option<String>,

    /// Run a saved request, by key or name; other options override it
    #[arg(long, value_name = "KEY")]
    pub saved: Option<String>,

    /// HTTP method (default: GET, or the saved request's)
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Request body; may reference `{{constants}}`
    #[arg(short = 'd', long, value_name = "BODY")]
    pub data: Option<String>,

    /// Extra header
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Answer to a prompted assignment
    #[arg(short = 'p', long = "prompt", value_name = "NAME=VALUE")]
    pub prompts: Vec<String>,

    /// Base URL overriding the active API environment (or $APIXT_BASE_URL)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Print every intermediate tree as a JSON line
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Recording: a JSON array of commands, or one command per line
    pub file: PathBuf,

    /// Delay between lines (default: the stream settings)
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Print every intermediate tree as a JSON line
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the settings
    Show,

    /// Print the settings file path
    Path,

    /// Add or update an API environment
    Env {
        /// Environment key
        key: String,
        /// Base URL
        url: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// List the saved requests and their assignments
    Requests {
        /// Also list assignments left to the backend default
        #[arg(long)]
        all: bool,
    },

    /// Make an API environment the active one
    Use {
        /// Environment key
        key: String,
    },

    /// Set a constant, or its override for one environment
    Const {
        /// Constant name
        name: String,
        /// Value
        value: String,
        /// Environment the value overrides the constant for
        #[arg(long)]
        env: Option<String>,
    },

    /// Bind a hot key to an action, taking it from any other action
    Bind {
        /// Action name
        action: String,
        /// Hot key, e.g. `ctrl+enter`
        hot_key: String,
    },

    /// Set the theme mode
    Theme {
        /// Mode
        mode: ThemeArg,
    },
}

/// Theme mode argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ThemeArg {
    Light,
    Dark,
    System,
}

impl From<ThemeArg> for ThemeMode {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Self::Light,
            ThemeArg::Dark => Self::Dark,
            ThemeArg::System => Self::System,
        }
    }
}
