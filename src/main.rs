//! Simple Bank - command line entry point
//!
//! ```text
//! simple-bank [--env <env>] migrate
//! simple-bank [--env <env>] open <owner> <currency>
//! simple-bank [--env <env>] account <id>
//! simple-bank [--env <env>] transfer <owner> <from> <to> <amount> <currency>
//! ```
//!
//! Configuration is read from `config/<env>.yaml` (default `dev`).

use anyhow::{Context, bail};
use std::sync::Arc;

use simple_bank::LedgerTx;
use simple_bank::config::AppConfig;
use simple_bank::db::Database;
use simple_bank::ledger::LedgerStore;
use simple_bank::logging::init_logging;
use simple_bank::service::{BankService, TransferRequest};

const USAGE: &str = "usage: simple-bank [--env <env>] \
    <migrate | open <owner> <currency> | account <id> | transfer <owner> <from> <to> <amount> <currency>>";

/// Split `--env <env>` / `-e <env>` out of the arguments.
fn parse_args(args: Vec<String>) -> (String, Vec<String>) {
    let mut env = "dev".to_string();
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--env" || arg == "-e" {
            if let Some(value) = iter.next() {
                env = value;
            }
        } else {
            rest.push(arg);
        }
    }
    (env, rest)
}

fn parse_i64(value: &str, name: &str) -> anyhow::Result<i64> {
    value
        .parse()
        .with_context(|| format!("{} must be an integer: '{}'", name, value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (env, command) = parse_args(std::env::args().skip(1).collect());

    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);
    tracing::info!(env = %env, git = env!("GIT_HASH"), "simple-bank starting");

    let db = Database::connect(&config.database)
        .await
        .context("Cannot connect to db")?;
    let store = Arc::new(db.ledger_store());
    let service = BankService::new(store.clone(), config.transfer.clone());

    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["migrate"] => {
            db.migrate().await.context("Migration failed")?;
            println!("schema ready");
        }
        ["open", owner, currency] => {
            let account = service.open_account(owner, currency).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        ["account", id] => {
            let mut tx = store.begin().await?;
            let account = tx.get_account(parse_i64(id, "id")?).await?;
            tx.commit().await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        ["transfer", owner, from, to, amount, currency] => {
            let req = TransferRequest {
                from_account_id: parse_i64(from, "from")?,
                to_account_id: parse_i64(to, "to")?,
                amount: parse_i64(amount, "amount")?,
                currency: currency.to_string(),
            };
            let result = service.transfer(owner, &req).await.map_err(|e| {
                tracing::error!(code = e.code(), error = %e, "Transfer failed");
                e
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
