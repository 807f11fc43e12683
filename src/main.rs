//! powchain node
//!
//! Opens (or creates) the chain under the configured data directory,
//! mines one demo transfer, and re-validates the whole chain.
//!
//! Usage: `powchain-node [config.toml]`

use powchain::crypto::PrivateKey;
use powchain::validation::Transaction;
use powchain::{Chain, ChainConfig};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "powchain.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ChainConfig::load(&config_path)?;
    info!(
        path = %config_path,
        data_dir = %config.data_dir.display(),
        difficulty = config.difficulty_bits,
        workers = config.mining.workers,
        "configuration loaded"
    );

    let mut chain = Chain::open_path(&config)?;
    if let Err(failure) = chain.validate() {
        error!(%failure, "stored chain is invalid; refusing to extend it");
        return Err(failure.into());
    }

    let sender = PrivateKey::generate();
    let recipient = PrivateKey::generate().public_key();
    info!(
        from = %sender.public_key().to_address(),
        to = %recipient.to_address(),
        "sending demo transfer"
    );

    let mut tx = Transaction::new(sender.public_key().0, recipient.address_bytes(), 1.0)?;
    tx.sign_with(chain.suite(), &sender.to_bytes())?;
    chain.submit_transaction(tx)?;

    let block = chain.mine_pending_with_timeout(None).await?;
    info!(header = %serde_json::to_string(&block.header)?, "mined block");

    let report = chain.validate()?;
    let stats = chain.get_stats();
    info!(
        height = stats.height,
        tip = %stats.tip_hash,
        blocks = report.blocks_checked,
        total_work = %report.total_work,
        "chain valid"
    );

    Ok(())
}
