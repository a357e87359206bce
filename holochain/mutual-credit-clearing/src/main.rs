//! Mutual Credit Clearing CLI
//!
//! Interactive client for an in-process conductor running one instance per
//! agent. Entries stay on the instance that wrote them until `sync` gossips
//! them to the others.
//!
//! ## Usage
//!
//! ```bash
//! # Two in-memory instances, amy and brad
//! mcc-cli
//!
//! # Custom instances, persisted under a data directory
//! mcc-cli --instance alice --instance bob --data-dir /tmp/mcc --persist
//! ```
//!
//! ```text
//! > register amy Amy
//! > users brad
//! > sync
//! > call brad get_users {}
//! ```

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use mutual_credit_clearing::{Config, Conductor, ZOME_NAME};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

static COMMANDS: &[(&str, &str)] = &[
    ("help", "Displays this help page"),
    ("instances", "List instances and their agents"),
    ("register", "register <instance> <name> - Register a user"),
    ("users", "users <instance> - List users visible to an instance"),
    ("me", "me <instance> - Show the instance's own user address"),
    ("call", "call <instance> <function> [json] - Call a zome function"),
    ("sync", "Gossip published entries to every instance"),
    ("exit", "Exit this CLI."),
];

#[derive(Parser, Debug)]
#[command(name = "mcc-cli")]
#[command(about = "CLI for the mutual credit clearing user registry")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "MCC_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for agent keys and shards
    #[arg(long, env = "MCC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Persist agent keys and shards under the data directory
    #[arg(long)]
    persist: bool,

    /// Instance to start (repeatable; replaces the configured list)
    #[arg(short, long = "instance")]
    instances: Vec<String>,

    /// Longest accepted user name, in characters
    #[arg(long)]
    max_name_length: Option<usize>,
}

enum Flow {
    Continue,
    Exit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mutual_credit_clearing=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if args.persist {
        config.persist = true;
    }
    if !args.instances.is_empty() {
        config.instances = args.instances;
    }
    if let Some(max) = args.max_name_length {
        config.registry.user_name_max_length = max;
    }
    config.validate()?;

    info!(
        instances = ?config.instances,
        persist = config.persist,
        data_dir = %config.data_dir.display(),
        "Starting conductor"
    );
    let conductor = Conductor::from_config(config).await?;

    let banner = "#".repeat(70);
    println!();
    println!("{}", banner);
    println!("CLI example for holochain mutual credit clearing library.");
    println!("Enter \"help\" for a list of commands.");
    println!("Press Ctrl-D or enter \"exit\" to exit.");
    println!("{}", banner);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match execute(&conductor, &line).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => println!("Error: {}", e),
        }
    }

    println!("Bye!");
    Ok(())
}

async fn execute(conductor: &Conductor, line: &str) -> anyhow::Result<Flow> {
    let (cmd, args) = split_first_word(line);

    match cmd {
        "" => {}
        "help" => {
            println!("Mutual credit clearing CLI commands:");
            println!();
            for &(cmd, help) in COMMANDS {
                println!("  {:15} - {}", cmd, help);
            }
            println!();
        }
        "exit" | "quit" => return Ok(Flow::Exit),
        "instances" => {
            for name in conductor.instance_names() {
                let agent = conductor
                    .agent_of(name)
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                println!("  {:15} {}", name, agent);
            }
        }
        "register" => {
            let (instance, name) = split_first_word(args);
            require(instance, "register <instance> <name>")?;
            print_result(zome_call(conductor, instance, "create_user", json!({ "name": name })).await?);
        }
        "users" => {
            require(args, "users <instance>")?;
            print_result(zome_call(conductor, args, "get_users", json!({})).await?);
        }
        "me" => {
            require(args, "me <instance>")?;
            print_result(zome_call(conductor, args, "get_my_user", json!({})).await?);
        }
        "call" => {
            let (instance, rest) = split_first_word(args);
            let (function, payload) = split_first_word(rest);
            require(function, "call <instance> <function> [json]")?;
            let payload: Value = if payload.is_empty() {
                json!({})
            } else {
                serde_json::from_str(payload).context("payload is not valid JSON")?
            };
            print_result(zome_call(conductor, instance, function, payload).await?);
        }
        "sync" => {
            let applied = conductor.converge().await;
            println!("Delivered {} entries", applied);
        }
        _ => bail!("Invalid command!"),
    }

    Ok(Flow::Continue)
}

async fn zome_call(
    conductor: &Conductor,
    instance: &str,
    function: &str,
    payload: Value,
) -> anyhow::Result<Value> {
    Ok(conductor.call(instance, ZOME_NAME, function, payload).await?)
}

fn print_result(value: Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!("{}", value),
    }
}

fn require(arg: &str, usage: &str) -> anyhow::Result<()> {
    if arg.is_empty() {
        return Err(anyhow!("usage: {}", usage));
    }
    Ok(())
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();

    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}
