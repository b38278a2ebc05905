mod commands;

use clap::{Parser, Subcommand};

use picochain_node::{DEFAULT_HTTP_PORT, DEFAULT_IP};

#[derive(Parser)]
#[command(name = "picochain", about = "Picochain node CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launches the node and its HTTP API
    Run {
        /// Absolute path to the node data dir where the DB will be stored
        #[arg(long)]
        datadir: String,
        /// Miner account of this node to receive block rewards
        #[arg(long, default_value = "")]
        miner: String,
        /// Exposed IP for communication with peers
        #[arg(long, default_value = DEFAULT_IP)]
        ip: String,
        /// Exposed HTTP port for communication with peers
        #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
        port: u64,
        #[arg(long, default_value = "")]
        bootstrap_ip: String,
        #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
        bootstrap_port: u64,
        #[arg(long, default_value = "")]
        bootstrap_account: String,
        /// Serve plain HTTP instead of terminating TLS on 443
        #[arg(long)]
        disable_ssl: bool,
        /// Contact email for the external ACME certificate agent
        #[arg(long, default_value = "")]
        ssl_email: String,
    },
    /// Interact with balances (list, ...)
    Balances {
        #[command(subcommand)]
        subcommand: BalancesCommands,
    },
    /// Manages accounts, keys, cryptography
    Wallet {
        #[command(subcommand)]
        subcommand: WalletCommands,
    },
    /// Describes version
    Version,
}

#[derive(Subcommand)]
enum BalancesCommands {
    /// Lists all balances and nonces
    List {
        #[arg(long)]
        datadir: String,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Creates a new account with a new set of elliptic-curve private + public keys
    NewAccount {
        #[arg(long)]
        datadir: String,
    },
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            datadir,
            miner,
            ip,
            port,
            bootstrap_ip,
            bootstrap_port,
            bootstrap_account,
            disable_ssl,
            ssl_email,
        } => commands::run(
            &datadir,
            &miner,
            &ip,
            port,
            &bootstrap_ip,
            bootstrap_port,
            &bootstrap_account,
            disable_ssl,
            &ssl_email,
        ),
        Commands::Balances {
            subcommand: BalancesCommands::List { datadir },
        } => commands::balances_list(&datadir),
        Commands::Wallet {
            subcommand: WalletCommands::NewAccount { datadir },
        } => commands::wallet_new_account(&datadir),
        Commands::Version => {
            println!("Version: {}", picochain_node::version());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
