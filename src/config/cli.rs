use crate::core::report::OutputFormat;
use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "patron-portal")]
#[command(about = "Library patron self-service: checkouts, requests, fines and payments")]
pub struct CliConfig {
    #[arg(long, default_value = "portal.toml")]
    pub config: String,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Verify a library ID and PIN and print the patron key
    Login {
        #[arg(long)]
        library_id: String,
        #[arg(long)]
        pin: String,
    },
    /// Account standing and counts
    Summary {
        #[arg(long)]
        patron: String,
    },
    Checkouts {
        #[arg(long)]
        patron: String,
        #[arg(long, default_value = "own")]
        view: String,
        #[arg(long, default_value = "due_date")]
        sort: String,
    },
    Renew {
        #[arg(long)]
        patron: String,
        #[arg(long, help = "Checkout or item key")]
        item: String,
    },
    /// Renew every checkout that is currently eligible
    RenewAll {
        #[arg(long)]
        patron: String,
    },
    Requests {
        #[arg(long)]
        patron: String,
        #[arg(long, default_value = "own")]
        view: String,
        #[arg(long, default_value = "date")]
        sort: String,
    },
    CancelRequest {
        #[arg(long)]
        patron: String,
        #[arg(long)]
        request: String,
    },
    UpdateRequest {
        #[arg(long)]
        patron: String,
        #[arg(long)]
        request: String,
        #[arg(long)]
        pickup: Option<String>,
        #[arg(long, help = "YYYY-MM-DD")]
        not_needed_after: Option<String>,
    },
    Fines {
        #[arg(long)]
        patron: String,
        #[arg(long, default_value = "own")]
        view: String,
    },
    /// Print the signed payment form for the visible fines
    Pay {
        #[arg(long)]
        patron: String,
        #[arg(long, default_value = "own")]
        view: String,
    },
    /// Verify a gateway callback saved as a JSON object of form fields
    VerifyPayment {
        #[arg(long)]
        params: String,
    },
}
