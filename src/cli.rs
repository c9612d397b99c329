use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "memebase-stats",
    version,
    about = "Memebase on-chain event statistics bot"
)]
pub struct Cli {
    /// Override RPC_URLS; repeat for fallbacks, in priority order
    #[arg(long = "rpc-url", global = true)]
    pub rpc_urls: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count and sum events for addresses over the recent block range
    Stats {
        /// Comma-separated addresses
        #[arg(long)]
        addresses: String,
        /// Event selection: "all", a key (1-5), a name, or a comma-separated list
        #[arg(long, default_value = "all")]
        events: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive console conversation (/start, /getstats, /cancel)
    Chat,
    /// Run the HTTP API server
    Serve {
        /// Override bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,
    },
    /// Report the latest block seen by each RPC endpoint
    CheckEndpoints,
    /// List tracked events and their topic hashes
    Events,
}
