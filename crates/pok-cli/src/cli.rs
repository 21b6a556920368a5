use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pok",
    about = "Proof-of-knowledge ledger: offline, hash-chained learning records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the ledger, cursors and pok.toml
    #[arg(long, global = true, default_value = ".pok")]
    pub data_dir: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the data directory with a default pok.toml
    Init(InitArgs),
    /// Append a learning-cycle record
    Record(RecordArgs),
    /// List entries
    Log(LogArgs),
    /// Verify hash chain integrity
    Verify(VerifyArgs),
    /// Print the next delta for a peer as hex
    Export(ExportArgs),
    /// Merge a hex delta received from a peer
    Import(ImportArgs),
    /// Record that a peer holds entries through an index
    Ack(AckArgs),
    /// Show ledger and peer status
    Status(StatusArgs),
    /// Erase the ledger and all peer cursors
    Reset(ResetArgs),
    /// Lift a sync-conflict block once local history verifies
    ClearBlock(ClearBlockArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing pok.toml
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct RecordArgs {
    pub payload: String,
    /// Treat the payload as hex-encoded bytes
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(long, default_value = "0")]
    pub from: u64,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct ExportArgs {
    pub peer: String,
}

#[derive(Args)]
pub struct ImportArgs {
    pub peer: String,
    /// Delta bytes, hex-encoded
    pub delta: String,
}

#[derive(Args)]
pub struct AckArgs {
    pub peer: String,
    pub index: u64,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct ClearBlockArgs {}

#[derive(Args)]
pub struct ResetArgs {
    /// Must be exactly "reset"
    #[arg(long)]
    pub confirm: Option<String>,
}
