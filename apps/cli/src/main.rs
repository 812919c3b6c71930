#![deny(warnings)]

//! Headless CLI for inspecting and driving the economy ledger.

use anyhow::{bail, Context, Result};
use economy_core::{validate_state, Price, ShopItem, StatePatch, COIN_PACKS};
use economy_ledger::{Clock, EconomyLedger, LedgerConfig, StateStore};
use persistence::{open_store, Backend, StorageConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: hanu-economy [--config <yaml>] [--data-dir <dir>] <command>

commands:
  show | progress | check | packs | version | reset
  add-xp <n> [source]      add-coins <n> [source]    add-gems <n> [source]
  spend-coins <n> [purpose] spend-gems <n> [purpose]
  buy <item-id> <coins> <gems>   use <item-id> [qty]   pack <pack-id>
  unlock <achievement>     sync <json>";

/// Settings read from the `--config` YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    storage: StorageConfig,
    ledger: LedgerConfig,
    log_filter: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<String>,
    data_dir: Option<String>,
    words: Vec<String>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Args {
    let mut parsed = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => parsed.config = it.next(),
            "--data-dir" => parsed.data_dir = it.next(),
            _ => parsed.words.push(arg),
        }
    }
    parsed
}

#[derive(Debug, PartialEq)]
enum Command {
    Show,
    Progress,
    Check,
    Packs,
    Version,
    Reset,
    AddXp(u64, String),
    AddCoins(u64, String),
    AddGems(u64, String),
    SpendCoins(u64, String),
    SpendGems(u64, String),
    Buy(ShopItem),
    Use(String, u64),
    Pack(String),
    Unlock(String),
    Sync(StatePatch),
}

fn amount(words: &[String], idx: usize) -> Result<u64> {
    let raw = words
        .get(idx)
        .with_context(|| format!("missing amount for `{}`", words[0]))?;
    raw.parse()
        .with_context(|| format!("`{raw}` is not a non-negative integer"))
}

fn word(words: &[String], idx: usize, what: &str) -> Result<String> {
    words
        .get(idx)
        .cloned()
        .with_context(|| format!("missing {what} for `{}`", words[0]))
}

fn optional(words: &[String], idx: usize, default: &str) -> String {
    words.get(idx).cloned().unwrap_or_else(|| default.to_string())
}

fn parse_command(words: &[String]) -> Result<Command> {
    let Some(name) = words.first() else {
        bail!("no command given\n\n{USAGE}");
    };
    Ok(match name.as_str() {
        "show" => Command::Show,
        "progress" => Command::Progress,
        "check" => Command::Check,
        "packs" => Command::Packs,
        "version" => Command::Version,
        "reset" => Command::Reset,
        "add-xp" => Command::AddXp(amount(words, 1)?, optional(words, 2, "cli")),
        "add-coins" => Command::AddCoins(amount(words, 1)?, optional(words, 2, "cli")),
        "add-gems" => Command::AddGems(amount(words, 1)?, optional(words, 2, "cli")),
        "spend-coins" => Command::SpendCoins(amount(words, 1)?, optional(words, 2, "cli")),
        "spend-gems" => Command::SpendGems(amount(words, 1)?, optional(words, 2, "cli")),
        "buy" => {
            let id = word(words, 1, "item id")?;
            Command::Buy(ShopItem {
                name: id.clone(),
                id,
                cost: Price {
                    coins: amount(words, 2)?,
                    gems: amount(words, 3)?,
                },
            })
        }
        "use" => {
            let qty = if words.len() > 2 { amount(words, 2)? } else { 1 };
            Command::Use(word(words, 1, "item id")?, qty)
        }
        "pack" => Command::Pack(word(words, 1, "pack id")?),
        "unlock" => Command::Unlock(word(words, 1, "achievement id")?),
        "sync" => {
            let raw = word(words, 1, "JSON patch")?;
            Command::Sync(serde_json::from_str(&raw).context("invalid sync payload")?)
        }
        other => bail!("unknown command `{other}`\n\n{USAGE}"),
    })
}

fn load_config(path: Option<&str>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing config {path}"))
}

/// Commands that need no ledger.
fn run_static(cmd: &Command) -> Option<Value> {
    match cmd {
        Command::Version => Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "git_sha": env!("GIT_SHA"),
            "build_date": env!("BUILD_DATE"),
        })),
        Command::Packs => Some(json!(COIN_PACKS)),
        _ => None,
    }
}

fn run<S: StateStore, C: Clock>(ledger: &mut EconomyLedger<S, C>, cmd: Command) -> Result<Value> {
    if let Some(value) = run_static(&cmd) {
        return Ok(value);
    }
    let out = match cmd {
        Command::Show => json!(ledger.state()),
        Command::Progress => {
            let p = ledger.level_progress();
            json!({ "progress": p, "fraction": p.fraction() })
        }
        Command::Check => {
            validate_state(&ledger.state())?;
            json!({ "valid": true })
        }
        Command::Reset => {
            ledger.reset();
            json!(ledger.state())
        }
        Command::AddXp(n, source) => json!(ledger.add_xp(n, &source)?),
        Command::AddCoins(n, source) => json!({ "coins": ledger.add_coins(n, &source)? }),
        Command::AddGems(n, source) => json!({ "gems": ledger.add_gems(n, &source)? }),
        Command::SpendCoins(n, purpose) => json!({ "coins": ledger.spend_coins(n, &purpose)? }),
        Command::SpendGems(n, purpose) => json!({ "gems": ledger.spend_gems(n, &purpose)? }),
        Command::Buy(item) => json!({ "item": item.id, "held": ledger.purchase(&item)? }),
        Command::Use(id, qty) => json!({ "item": id, "remaining": ledger.consume_item(&id, qty)? }),
        Command::Pack(id) => json!({ "coins": ledger.grant_coin_pack(&id)? }),
        Command::Unlock(id) => json!({ "achievement": id, "new": ledger.unlock_achievement(&id)? }),
        Command::Sync(patch) => {
            ledger.sync_with_server_data(patch);
            json!(ledger.state())
        }
        Command::Version | Command::Packs => Value::Null,
    };
    Ok(out)
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1));
    let mut config = load_config(args.config.as_deref())?;

    // Logging setup
    let fallback = config.log_filter.clone().unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cmd = parse_command(&args.words)?;
    let output = match run_static(&cmd) {
        Some(value) => value,
        None => {
            if let Some(dir) = args.data_dir {
                config.storage.location = match config.storage.backend {
                    Backend::Sqlite => format!("{dir}/economy.db"),
                    Backend::File | Backend::Memory => dir,
                };
            }
            info!(command = ?cmd, "running");
            let store = open_store(&config.storage)?;
            let mut ledger = EconomyLedger::with_config(
                store,
                economy_ledger::SystemClock,
                config.ledger.clone(),
            );
            run(&mut ledger, cmd)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
