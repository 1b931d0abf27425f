use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "netdesc", version, about = "Network descriptor inspector")]
pub struct Cli {
    /// Log level (RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the network's inputs, outputs and layers
    Info {
        /// Path to the topology file
        model: PathBuf,

        /// Path to the weights file
        weights: PathBuf,
    },

    /// Reshape inputs and write the network back out
    Reshape {
        /// Path to the topology file
        model: PathBuf,

        /// Path to the weights file
        weights: PathBuf,

        /// New input shape, as name=d0,d1,... (repeatable)
        #[arg(long = "set", value_name = "NAME=DIMS")]
        set: Vec<String>,

        /// New batch size, applied after --set
        #[arg(long)]
        batch: Option<usize>,

        /// Where to write the reshaped topology
        #[arg(long, value_name = "PATH")]
        out_model: PathBuf,

        /// Where to write the reshaped weights
        #[arg(long, value_name = "PATH")]
        out_weights: PathBuf,
    },
}
