use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
}

impl From<Currency> for bwk_wallet::prices::Fiat {
    fn from(currency: Currency) -> Self {
        match currency {
            Currency::Usd => bwk_wallet::prices::Fiat::Usd,
            Currency::Eur => bwk_wallet::prices::Fiat::Eur,
        }
    }
}

/// Inspect bitcoin transactions served by a remote transaction service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Network
    #[arg(short, long, default_value = "testnet", env = "BWK_NETWORK")]
    pub network: Network,

    /// Base url of the remote transaction service
    #[arg(long, env = "BWK_SERVER_URL")]
    pub url: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// The sub command
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// A transaction with its inputs resolved: fee, originating and receiving addresses
    Tx {
        txid: String,

        /// Addresses of the wallet, used to compute the balance change
        #[arg(long = "wallet-address")]
        wallet_addresses: Vec<String>,
    },

    /// Transactions touching an address
    History {
        address: String,

        /// Skip transactions confirmed below this height
        #[arg(long, default_value_t = 0)]
        from_height: u32,
    },

    /// The current chain tip
    Tip,

    /// Broadcast a hex encoded transaction
    Broadcast { hex: String },

    /// The current price of bitcoin
    Price { currency: Currency },

    #[clap(hide = true)]
    GenerateCompletion { shell: Shell },
}

impl CliCommand {
    pub(crate) fn requires_server(&self) -> bool {
        !matches!(
            self,
            CliCommand::Price { .. } | CliCommand::GenerateCompletion { .. }
        )
    }
}
