//! CourseChain CLI: command-line client for the course market contract.
//!
//! # Commands
//! ```text
//! coursechain count
//! coursechain create        --title <t> --description <d> --price <eth>
//! coursechain purchase      <id> --payment <eth>
//! coursechain course        <id>
//! coursechain buyers        <id>
//! coursechain purchased     <account>
//! coursechain has-purchased <id> <account>
//! coursechain balance       [account]
//! coursechain list          [--page N] [--limit N]
//! coursechain watch         [--kind created|purchased|all]
//! ```

use std::path::PathBuf;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use coursechain_core::{
    parse_account, parse_course_id, CourseEvent, CoursePage, CourseRecord, EventKind, PageRequest,
    TransactionOutcome,
};
use coursechain_service::{CourseService, ServiceConfig};

mod logging;

#[derive(Parser)]
#[command(
    name = "coursechain",
    about = "Course market contract client",
    long_about = "Create, buy and inspect courses on the course market contract.\n\
                  Connection settings fall back to RPC_URL, WS_URL, CONTRACT_ADDRESS,\n\
                  PRIVATE_KEY and CHAIN_ID, then to the deployment record.",
    version
)]
struct Cli {
    /// JSON-RPC HTTP endpoint
    #[arg(long, global = true, env = "RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

    /// WebSocket endpoint for `watch` (polls over HTTP when omitted)
    #[arg(long, global = true, env = "WS_URL")]
    ws_url: Option<String>,

    /// Contract address (read from the deployment record when omitted)
    #[arg(long, global = true, env = "CONTRACT_ADDRESS", value_parser = account_arg)]
    contract: Option<Address>,

    /// Hex private key used to sign writes
    #[arg(long, global = true, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Chain id to sign for (queried from the node when omitted)
    #[arg(long, global = true, env = "CHAIN_ID")]
    chain_id: Option<u64>,

    /// Deployment record holding `contractAddress`
    #[arg(long, global = true, default_value = "deployment.json")]
    deployment: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Number of courses created so far
    Count,

    /// Publish a new course
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Price in ETH, e.g. 0.1
        #[arg(long)]
        price: String,
    },

    /// Buy a course
    Purchase {
        #[arg(value_parser = course_id_arg)]
        id: u64,
        /// Amount sent in ETH; must cover the course price
        #[arg(long)]
        payment: String,
    },

    /// Show one course
    Course {
        #[arg(value_parser = course_id_arg)]
        id: u64,
    },

    /// List the buyers of a course
    Buyers {
        #[arg(value_parser = course_id_arg)]
        id: u64,
    },

    /// List the course ids an account has bought
    Purchased {
        #[arg(value_parser = account_arg)]
        account: Address,
    },

    /// Check whether an account owns a course
    #[command(name = "has-purchased")]
    HasPurchased {
        #[arg(value_parser = course_id_arg)]
        id: u64,
        #[arg(value_parser = account_arg)]
        account: Address,
    },

    /// Native balance of an account (the signer when omitted)
    Balance {
        #[arg(value_parser = account_arg)]
        account: Option<Address>,
    },

    /// Page through all courses
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// Print contract events as they happen until Ctrl-C
    Watch {
        #[arg(long, value_enum, default_value_t = WatchKind::All)]
        kind: WatchKind,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WatchKind {
    Created,
    Purchased,
    All,
}

fn account_arg(s: &str) -> Result<Address, String> {
    parse_account(s).map_err(|e| e.to_string())
}

fn course_id_arg(s: &str) -> Result<u64, String> {
    parse_course_id(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_json);

    let config = build_config(&cli)?;
    let service = CourseService::connect(config)
        .await
        .context("failed to connect to the node")?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Count => {
            let count = service.course_count().await?;
            out.value(&serde_json::json!({ "count": count }), || count.to_string())?;
        }
        Commands::Create {
            title,
            description,
            price,
        } => {
            let outcome = service.create_course(&title, &description, &price).await;
            return out.outcome(&outcome);
        }
        Commands::Purchase { id, payment } => {
            let outcome = service.purchase_course(id, &payment).await;
            return out.outcome(&outcome);
        }
        Commands::Course { id } => {
            let course = service.course(id).await?;
            out.value(&course, || course_line(&course))?;
        }
        Commands::Buyers { id } => {
            let buyers = service.course_buyers(id).await?;
            out.value(&buyers, || lines(buyers.iter()))?;
        }
        Commands::Purchased { account } => {
            let ids = service.purchased_courses(account).await?;
            out.value(&ids, || lines(ids.iter()))?;
        }
        Commands::HasPurchased { id, account } => {
            let owned = service.has_purchased(id, account).await?;
            out.value(&serde_json::json!({ "hasPurchased": owned }), || owned.to_string())?;
        }
        Commands::Balance { account } => {
            let balance = service.balance(account).await?;
            out.value(&balance, || {
                format!("{} ETH ({})", balance.amount.decimal, balance.account)
            })?;
        }
        Commands::List { page, limit } => {
            let page = service.list_courses(PageRequest::new(page, limit)).await?;
            out.value(&page, || page_text(&page))?;
        }
        Commands::Watch { kind } => watch(&service, kind, cli.json).await?,
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let contract = match cli.contract {
        Some(addr) => addr,
        None => ServiceConfig::deployment_address(&cli.deployment).with_context(|| {
            format!(
                "no --contract / CONTRACT_ADDRESS and no usable {}",
                cli.deployment.display()
            )
        })?,
    };

    let mut config = ServiceConfig::new(cli.rpc_url.clone(), contract);
    config.ws_url = cli.ws_url.clone();
    config.private_key = cli.private_key.clone();
    config.chain_id = cli.chain_id;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn watch(service: &CourseService, kind: WatchKind, json: bool) -> Result<()> {
    let print = move |ev: CourseEvent| {
        if json {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "could not serialise event"),
            }
        } else {
            println!("{}", event_line(&ev));
        }
    };

    if kind != WatchKind::Purchased {
        service.on_course_created(print).await?;
    }
    if kind != WatchKind::Created {
        service.on_course_purchased(print).await?;
    }
    tracing::info!(contract = %service.contract_address(), "watching for course events");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    let stopped = service.stop_all_subscriptions().await;
    tracing::info!(stopped, "subscriptions stopped");
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn value<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }

    /// Prints the outcome and turns a failed transaction into a non-zero exit.
    fn outcome(&self, outcome: &TransactionOutcome) -> Result<()> {
        self.value(outcome, || outcome_text(outcome))?;
        match &outcome.error {
            Some(err) if !outcome.success => {
                anyhow::bail!("transaction failed ({}): {}", err.kind, err.message)
            }
            _ => Ok(()),
        }
    }
}

fn outcome_text(outcome: &TransactionOutcome) -> String {
    let mut out = format!(
        "status:  {}",
        if outcome.success { "confirmed" } else { "failed" }
    );
    if let Some(hash) = outcome.tx_hash {
        out.push_str(&format!("\ntx:      {hash}"));
    }
    if let Some(c) = &outcome.confirmation {
        out.push_str(&format!("\nblock:   {} (gas used {})", c.block_number, c.gas_used));
    }
    if let Some(id) = outcome.course_id {
        out.push_str(&format!("\ncourse:  {id}"));
    }
    for ev in &outcome.events {
        out.push_str(&format!("\nevent:   {}", event_line(ev)));
    }
    out
}

fn course_line(c: &CourseRecord) -> String {
    format!(
        "#{} {}\n  {}\n  author:  {}\n  price:   {} ETH\n  created: {}",
        c.id, c.title, c.description, c.author, c.price.decimal, c.created_at_iso
    )
}

fn event_line(ev: &CourseEvent) -> String {
    match ev.kind {
        EventKind::Created => format!(
            "[block {}] course #{} '{}' created by {} for {} ETH",
            ev.block_number,
            ev.course_id,
            ev.title.as_deref().unwrap_or(""),
            ev.actor,
            ev.price.decimal
        ),
        EventKind::Purchased => format!(
            "[block {}] course #{} bought by {} for {} ETH",
            ev.block_number, ev.course_id, ev.actor, ev.price.decimal
        ),
    }
}

fn page_text(page: &CoursePage) -> String {
    let mut out = format!(
        "page {}/{} ({} courses)",
        page.page, page.total_pages, page.total
    );
    for c in &page.items {
        out.push_str(&format!("\n  #{:<4} {:<32} {} ETH", c.id, c.title, c.price.decimal));
    }
    out
}

fn lines<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join("\n")
}
