use anyhow::Context;
use tokio_util::sync::CancellationToken;

use picochain_config::config::expand_path;
use picochain_core::{wallet, Account, State, DEFAULT_MINING_DIFFICULTY};
use picochain_node::{Node, PeerNode};

#[allow(clippy::too_many_arguments)]
pub fn run(
    datadir: &str,
    miner: &str,
    ip: &str,
    port: u64,
    bootstrap_ip: &str,
    bootstrap_port: u64,
    bootstrap_account: &str,
    disable_ssl: bool,
    ssl_email: &str,
) -> anyhow::Result<()> {
    let data_dir = expand_path(datadir);

    let miner: Account = if miner.is_empty() {
        Account::default()
    } else {
        miner.parse().context("invalid --miner address")?
    };
    let bootstrap_account: Account = if bootstrap_account.is_empty() {
        Account::default()
    } else {
        bootstrap_account
            .parse()
            .context("invalid --bootstrap-account address")?
    };

    let bootstrap = PeerNode::new(
        bootstrap_ip,
        bootstrap_port,
        true,
        bootstrap_account,
        false,
        "",
    );

    println!("Launching picochain node and its HTTP API...");

    let node = Node::new(
        data_dir,
        ip,
        port,
        miner,
        bootstrap,
        DEFAULT_MINING_DIFFICULTY,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let cancel = CancellationToken::new();

        // ctrl-c cascades through the sync ticker, the mining round and the
        // HTTP listener
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("shutdown signal received");
                    cancel.cancel();
                }
            }
        });

        node.run(cancel, disable_ssl, ssl_email).await
    })
}

pub fn balances_list(datadir: &str) -> anyhow::Result<()> {
    let data_dir = expand_path(datadir);
    let state = State::new_from_disk(&data_dir, DEFAULT_MINING_DIFFICULTY)?;

    println!("Account balances at {}:", state.latest_block_hash());
    println!("__________________");
    for (account, balance) in state.balances() {
        println!("{}: {}", account, balance);
    }

    println!();
    println!("Account nonces:");
    println!("__________________");
    for (account, nonce) in state.account_nonces() {
        println!("{}: {}", account, nonce);
    }

    Ok(())
}

pub fn wallet_new_account(datadir: &str) -> anyhow::Result<()> {
    let data_dir = expand_path(datadir);

    println!("Please enter a password to encrypt the new wallet:");
    let password = rpassword::prompt_password("Password: ")?;
    let confirmation = rpassword::prompt_password("Repeat password: ")?;
    if password != confirmation {
        anyhow::bail!("passwords do not match");
    }

    let account = wallet::new_keystore_account(&data_dir, &password)?;

    println!("New account created: {}", account);
    println!(
        "Saved in: {}",
        wallet::keystore_dir_path(&data_dir).display()
    );

    Ok(())
}
