use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the snapshot phase of a transfer into a target directory.
    Snapshot {
        /// Transfer config (json).
        #[arg(long)]
        config: PathBuf,

        /// Directory the copied tables are written to.
        #[arg(long)]
        target_dir: PathBuf,

        /// Durable coordinator state directory; in-memory when omitted.
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Operation id to record progress under; generated when omitted.
        #[arg(long)]
        operation: Option<String>,
    },

    /// Validate the transfer's include directives against the source.
    Validate {
        /// Transfer config (json).
        #[arg(long)]
        config: PathBuf,
    },

    /// Show persisted per-part progress for an operation.
    State {
        /// Durable coordinator state directory.
        #[arg(long)]
        state_dir: PathBuf,

        /// Operation id to inspect.
        #[arg(long)]
        operation: String,
    },
}
