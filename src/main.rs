//! L2 Rebalancer - Main Entry Point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use l2_rebalancer::bridge::{
    Authorization, HopQuoteClient, PaperBridge, RpcBalanceReader, TransferCapability,
};
use l2_rebalancer::catalog::{Catalog, Chain};
use l2_rebalancer::config::Config;
use l2_rebalancer::rebalance::{
    Amount, BalanceSet, RebalancePlan, RebalanceReport, Rebalancer, TargetAllocation,
};
use l2_rebalancer::utils::{format_bps, format_units};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Account used for paper runs when none is configured.
const PAPER_ACCOUNT: &str = "0x0000000000000000000000000000000000000001";

/// L2 Rebalancer CLI
#[derive(Parser)]
#[command(name = "l2-rebalancer")]
#[command(version, about = "Rebalance token holdings across L1/L2 chains")]
struct Cli {
    /// Override the configured network (mainnet, kovan)
    #[arg(short, long, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bridgeable tokens and routes of the network
    Catalog,

    /// Read live balances, quote transfers and print the plan without sending
    Plan {
        /// Path to the target allocation JSON file
        #[arg(short, long)]
        targets: String,
    },

    /// Run the full pipeline against an in-memory paper bridge
    Simulate {
        /// Path to the target allocation JSON file
        #[arg(short, long)]
        targets: String,

        /// Path to the starting balances JSON file
        #[arg(short, long)]
        balances: String,

        /// Bridge fee charged by the paper bridge, in basis points
        #[arg(long, default_value = "25")]
        fee_bps: u32,

        /// Make sends on a route revert (e.g. "optimism:xdai")
        #[arg(long)]
        fail_route: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let mut config = Config::load()?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    config.validate()?;
    let catalog = Catalog::for_network(&config.network)?;

    match cli.command {
        Commands::Catalog => {
            show_catalog(&catalog);
            Ok(())
        }
        Commands::Plan { targets } => run_plan(config, catalog, &targets).await,
        Commands::Simulate {
            targets,
            balances,
            fee_bps,
            fail_route,
        } => run_simulation(config, catalog, &targets, &balances, fee_bps, &fail_route).await,
    }
}

/// Quote a rebalance against live balances.
async fn run_plan(config: Config, catalog: Catalog, targets_path: &str) -> Result<()> {
    info!("🔎 Planning rebalance on {}", catalog.network());
    log_config(&config);

    if config.account.is_empty() {
        bail!("No account configured (set REBAL__ACCOUNT)");
    }
    let targets: TargetAllocation = read_json(targets_path)?;

    let reader = Arc::new(RpcBalanceReader::new(&config.rpc, &config.tokens)?);
    let oracle = Arc::new(HopQuoteClient::new(&config.quote)?);
    let rebalancer = Rebalancer::new(catalog, config.rebalance.clone(), reader, oracle);

    let plan = rebalancer.plan(&targets, &config.account).await;
    print_plan(&config, &plan);

    Ok(())
}

/// Run plan and execution end to end on paper.
async fn run_simulation(
    config: Config,
    catalog: Catalog,
    targets_path: &str,
    balances_path: &str,
    fee_bps: u32,
    fail_routes: &[String],
) -> Result<()> {
    info!("📝 PAPER MODE - no funds are moved");
    log_config(&config);

    let targets: TargetAllocation = read_json(targets_path)?;
    let balances: BalanceSet = read_json(balances_path)?;

    let mut bridge = PaperBridge::new(balances, fee_bps);
    for route in fail_routes {
        let (from, to) = parse_route(route)?;
        warn!("⚠️  Sends {} -> {} will revert", from, to);
        bridge = bridge.with_failing_route(from, to);
    }
    let bridge = Arc::new(bridge);

    let account = if config.account.is_empty() {
        PAPER_ACCOUNT.to_string()
    } else {
        config.account.clone()
    };
    let authorization = Authorization::new(account);

    let rebalancer = Rebalancer::new(
        catalog,
        config.rebalance.clone(),
        bridge.clone(),
        bridge.clone(),
    );
    let transfers: &dyn TransferCapability = bridge.as_ref();
    let report = rebalancer.rebalance(&targets, transfers, &authorization).await;

    print_plan(&config, &report.plan);
    print_report(&config, &report);

    println!("\n💰 Final Balances");
    print_balances(&config, &bridge.balances().await);

    if report.is_complete() {
        info!("✅ Rebalance complete");
    } else {
        warn!(
            failed = report.failed.len(),
            unknown = report.unknown.len(),
            "⚠️  Rebalance incomplete"
        );
    }

    Ok(())
}

fn parse_route(route: &str) -> Result<(Chain, Chain)> {
    let (from, to) = route
        .split_once(':')
        .with_context(|| format!("Route '{route}' is not of the form from:to"))?;
    Ok((from.parse()?, to.parse()?))
}

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Human amount when the token's decimals are configured, raw otherwise.
fn display_amount(config: &Config, token: &str, amount: Amount) -> String {
    match config.decimals(token) {
        Some(decimals) => format!("{} {}", format_units(amount, decimals), token),
        None => format!("{} {}", amount, token),
    }
}

fn show_catalog(catalog: &Catalog) {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              BRIDGE CATALOG: {:<30}║", catalog.network());
    println!("╚════════════════════════════════════════════════════════════╝");

    for (token, routes) in catalog.tokens() {
        println!("\n🪙 {}", token);
        for chain in routes.chains() {
            let destinations: Vec<String> =
                routes.destinations(chain).map(|c| c.to_string()).collect();
            println!("   ├─ {:<10} -> {}", chain, destinations.join(", "));
        }
    }
}

fn print_balances(config: &Config, balances: &BalanceSet) {
    for (token, chains) in balances {
        println!("   ┌─ {}", token);
        for (chain, amount) in chains {
            println!("   │  ├─ {:<10} {}", chain, display_amount(config, token, *amount));
        }
    }
}

fn print_plan(config: &Config, plan: &RebalancePlan) {
    println!("\n📊 Balances");
    print_balances(config, &plan.balances);

    println!("\n🎯 Needs");
    for (token, needs) in &plan.needs {
        if needs.is_empty() {
            println!("   ├─ {}: balanced", token);
            continue;
        }
        for (chain, need) in needs {
            let magnitude = display_amount(config, token, need.unsigned_abs());
            let sign = if *need < 0 { "-" } else { "+" };
            println!("   ├─ {} {:<10} {}{}", token, chain, sign, magnitude);
        }
    }

    println!("\n🌉 Transfers");
    for transfer in &plan.approved {
        let instruction = &transfer.instruction;
        println!(
            "   ✅ {} {} -> {}  receive {}  cost {}",
            display_amount(config, &instruction.token, instruction.amount),
            instruction.from,
            instruction.to,
            display_amount(config, &instruction.token, transfer.estimated_received),
            format_bps(transfer.cost_bps()),
        );
    }
    for rejected in &plan.rejected {
        println!("   ⏭️  {}: {}", rejected.instruction, rejected.reason);
    }
    if plan.approved.is_empty() && plan.rejected.is_empty() {
        println!("   └─ nothing to do");
    }

    for skipped in &plan.skipped {
        println!("   ⚠️  {}", skipped);
    }
}

fn print_report(config: &Config, report: &RebalanceReport) {
    println!("\n🧾 Receipts");
    for receipt in &report.receipts {
        println!("   ├─ {}", receipt);
    }
    for failed in &report.failed {
        println!(
            "   ❌ {} {}: {}",
            display_amount(config, &failed.instruction.token, failed.instruction.amount),
            failed.instruction,
            failed.reason
        );
    }
    for unknown in &report.unknown {
        println!("   ❓ {} (outcome unknown)", unknown);
    }
    println!(
        "   └─ {} settled in {}ms",
        report.receipts.len(),
        (report.finished_at - report.plan.started_at).num_milliseconds()
    );
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "rebalancer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("l2_rebalancer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Network: {}", config.network);
    info!("   Tolerance: ±{}%", config.rebalance.tolerance_pct);
    info!(
        "   Max Cost: {}",
        format_bps(i128::from(config.rebalance.max_cost_bps))
    );
    info!("   Quote Timeout: {}s", config.rebalance.quote_timeout_secs);
    info!("   Send Timeout: {}s", config.rebalance.send_timeout_secs);
    info!(
        "   Revalidate Before Send: {}",
        config.rebalance.revalidate_before_send
    );
    info!("   Quote API: {}", config.quote.base_url);
}
