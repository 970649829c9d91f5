//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use dsu_types::{ColorChoice, CompressionCodec};
use std::path::PathBuf;

/// dsu - Dynamic system update installer
#[derive(Parser)]
#[command(name = "dsu")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dynamic system update installer")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Image and partition selection shared by all commands
#[derive(Args, Clone)]
pub struct ImageArgs {
    /// System image to install
    pub image: PathBuf,

    /// Decompressed image size in bytes (omit if unknown)
    #[arg(long, value_name = "BYTES")]
    pub size: Option<u64>,

    /// Target partition name
    #[arg(short, long)]
    pub partition: Option<String>,

    /// Userdata allocation in GiB
    #[arg(short, long, value_name = "GIB")]
    pub userdata: Option<u32>,

    /// Image compression (default: from the file extension)
    #[arg(long, value_enum)]
    pub codec: Option<CompressionCodec>,

    /// Leave the partition inactive after finalizing
    #[arg(long)]
    pub no_activate: bool,

    /// Extra installation preference
    #[arg(long = "pref", value_name = "KEY=VALUE", value_parser = parse_preference)]
    pub preferences: Vec<(String, String)>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the operations an installation would issue
    Plan {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// Write an installation script instead of installing
    #[command(alias = "gen")]
    Script {
        #[command(flatten)]
        image: ImageArgs,

        /// Script location (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run the script with the configured shell once written
        #[arg(long)]
        exec: bool,
    },

    /// Install through the privileged executor
    #[command(alias = "i")]
    Install {
        #[command(flatten)]
        image: ImageArgs,

        /// Directory backing the local privileged executor
        #[arg(long, value_name = "DIR")]
        image_root: Option<PathBuf>,

        /// Write a script instead of failing when the executor lacks root
        #[arg(long)]
        script_fallback: bool,
    },
}

fn parse_preference(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
