//! Command-line surface of the `wager-advisor` binary.
//!
//! Supports two output modes: human-readable tables (default) and JSON (--json).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

use crate::config::EngineConfig;
use crate::domain::Sport;
use crate::engine::{self, AdvisoryEngine, EngineResult};
use crate::normalizer::parse_price_text;
use crate::staking::{self, check_calibration, optimize_stake, ComboAnalysis, ComboLeg};
use crate::vig::{arbitrage_stakes, remove_vig, DeVigMethod};

#[derive(Parser)]
#[command(name = "wager-advisor")]
#[command(version)]
#[command(about = "De-vig, model and size sports wagers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and {WAGER_ENV}.toml
    #[arg(short, long, default_value = "config", global = true)]
    pub config: PathBuf,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Override the configured bankroll
    #[arg(long, global = true, env = "WAGER_BANKROLL")]
    pub bankroll: Option<Decimal>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate one match (JSON object) or a batch (JSON array) from a file
    Evaluate {
        /// Path to the match JSON; "-" reads stdin
        file: PathBuf,
    },
    /// Remove the margin from a set of prices
    Devig {
        /// Prices in decimal, fractional (5/2) or American (+150) form
        #[arg(required = true, num_args = 2.., allow_negative_numbers = true)]
        prices: Vec<String>,
        #[arg(long, default_value = "proportional", value_parser = ["proportional", "power", "auto", "raw"])]
        method: String,
    },
    /// Size a single bet
    Stake {
        /// Model win probability
        #[arg(long)]
        prob: f64,
        /// Decimal price
        #[arg(long)]
        odds: f64,
        /// Market probability to calibrate against (defaults to 1 / odds)
        #[arg(long)]
        market_prob: Option<f64>,
    },
    /// Price and size a combination of legs
    Combo {
        /// Legs as PRICE:PROB or PRICE:PROB:MATCH; legs sharing MATCH are correlated.
        /// Options go before the legs, since a leg may start with '-' (American odds).
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        legs: Vec<String>,
        /// Correlation penalty per extra leg, overriding the same-match default
        #[arg(long)]
        penalty: Option<f64>,
    },
    /// List the formula catalog
    Catalog {
        /// Only formulas usable for this sport
        #[arg(long, conflicts_with = "id")]
        sport: Option<String>,
        /// Show a single formula by id
        #[arg(long)]
        id: Option<String>,
    },
}

// ============================================================================
// Output
// ============================================================================

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

#[derive(Debug, Tabled, Serialize)]
struct RecommendationRow {
    #[tabled(rename = "Market")]
    market: String,
    #[tabled(rename = "Pick")]
    selection: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Fair")]
    fair: String,
    #[tabled(rename = "EV")]
    ev: String,
    #[tabled(rename = "Stake")]
    stake: String,
    #[tabled(rename = "Amount")]
    amount: Decimal,
    #[tabled(rename = "Tier")]
    tier: String,
}

#[derive(Debug, Tabled, Serialize)]
struct DevigRow {
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Implied")]
    implied: String,
    #[tabled(rename = "Fair")]
    fair: String,
    #[tabled(rename = "Fair price")]
    fair_price: String,
}

#[derive(Debug, Tabled, Serialize)]
struct ComboRow {
    #[tabled(rename = "Leg")]
    label: String,
    #[tabled(rename = "Match")]
    match_id: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Model")]
    model: String,
}

#[derive(Debug, Tabled, Serialize)]
struct CatalogRow {
    #[tabled(rename = "ID")]
    id: &'static str,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Sport")]
    sport: String,
    #[tabled(rename = "Name")]
    name: &'static str,
}

fn pct(x: f64) -> String {
    format!("{:.2}%", x * 100.0)
}

fn print_result(res: &EngineResult) -> anyhow::Result<()> {
    println!("{} [{} / {}] {}", res.title, res.sport.display_name(), res.formula_id, res.match_id);
    let rows: Vec<RecommendationRow> = res
        .recommendations
        .iter()
        .map(|r| RecommendationRow {
            market: match &r.player {
                Some(p) => format!("{p} {}", r.market),
                None => r.market.to_string(),
            },
            selection: r.selection.clone(),
            price: format!("{:.2}", r.price),
            model: pct(r.model_probability),
            fair: pct(r.fair_probability),
            ev: format!("{:+.2}%", r.ev * 100.0),
            stake: pct(r.stake_fraction),
            amount: r.stake_amount,
            tier: r.tier.to_string(),
        })
        .collect();
    print_items(&rows, OutputMode::Table)?;

    for e in &res.validation.errors {
        println!("\x1b[31merror: {e}\x1b[0m");
    }
    for w in res.warnings.iter().chain(res.validation.warnings.iter()) {
        println!("\x1b[33mwarning: {w}\x1b[0m");
    }
    if let Some(p) = &res.portfolio {
        println!(
            "total stake {} | portfolio EV {:+.4} | scale {:.3}",
            pct(p.total_stake),
            p.expected_value,
            p.scale
        );
    }
    println!();
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

pub fn run(command: &Commands, config: EngineConfig, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Evaluate { file } => evaluate(file, config, mode),
        Commands::Devig { prices, method } => devig(prices, method, &config, mode),
        Commands::Stake {
            prob,
            odds,
            market_prob,
        } => stake(*prob, *odds, *market_prob, &config, mode),
        Commands::Combo { legs, penalty } => combo(legs, *penalty, config, mode),
        Commands::Catalog { sport, id } => match id {
            Some(id) => catalog_entry(id, mode),
            None => catalog(sport.as_deref(), mode),
        },
    }
}

fn evaluate(file: &Path, config: EngineConfig, mode: OutputMode) -> anyhow::Result<()> {
    let text = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", file.display()))?;

    let engine = AdvisoryEngine::new(config)?;
    let results = match &value {
        Value::Array(items) => engine.evaluate_batch(items),
        other => vec![engine.evaluate_value(other)],
    };

    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for res in &results {
        print_result(res)?;
    }
    Ok(())
}

fn devig(prices: &[String], method: &str, config: &EngineConfig, mode: OutputMode) -> anyhow::Result<()> {
    let parsed = prices
        .iter()
        .map(|p| parse_price_text(p).map(|q| q.price()).with_context(|| format!("bad price {p:?}")))
        .collect::<anyhow::Result<Vec<f64>>>()?;

    let method = match method {
        "power" => DeVigMethod::Power,
        "auto" => DeVigMethod::Auto,
        "raw" => DeVigMethod::Raw,
        _ => DeVigMethod::Proportional,
    };
    let Some(res) = remove_vig(&parsed, method, &config.vig) else {
        bail!("could not de-vig {} prices", parsed.len());
    };

    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&res)?);
        return Ok(());
    }

    let rows: Vec<DevigRow> = parsed
        .iter()
        .zip(res.implied.iter().zip(res.fair.iter()))
        .map(|(price, (implied, fair))| DevigRow {
            price: format!("{price:.3}"),
            implied: pct(*implied),
            fair: pct(*fair),
            fair_price: format!("{:.3}", 1.0 / fair),
        })
        .collect();
    print_items(&rows, mode)?;
    println!("method {} | margin {:.2}%", res.method, res.overround_pct());
    if let Some(alpha) = res.exponent {
        println!("exponent {alpha:.6} (converged: {})", res.converged.unwrap_or(false));
    }
    if res.is_arbitrage {
        println!("\x1b[32marbitrage: {:.2}% guaranteed\x1b[0m", res.arbitrage_profit_pct());
        if let Some(plan) = arbitrage_stakes(&parsed, config.bankroll) {
            for (price, amount) in parsed.iter().zip(plan.stakes.iter()) {
                println!("  back {price:.3} for {amount}");
            }
            println!("  payout {}", plan.payout);
        }
    }
    Ok(())
}

fn stake(prob: f64, odds: f64, market_prob: Option<f64>, config: &EngineConfig, mode: OutputMode) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&prob) {
        bail!("--prob must be in [0, 1], got {prob}");
    }
    if !(odds > 1.0) {
        bail!("--odds must exceed 1.0, got {odds}");
    }

    let decision = optimize_stake(prob, odds, &config.staking);
    let verdict = check_calibration(prob, market_prob.unwrap_or(1.0 / odds), &config.calibration);
    let fraction = verdict.dampen(
        decision.stake * config.kelly_fraction,
        &config.calibration,
        config.staking.effective_cap(),
    );
    let amount = staking::stake_amount(config.bankroll, fraction);

    if mode == OutputMode::Json {
        let out = serde_json::json!({
            "decision": decision,
            "calibration": verdict,
            "stake_fraction": fraction,
            "stake_amount": amount,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("EV             {:+.2}%", decision.ev * 100.0);
    println!("Kelly          {}", pct(decision.kelly_fraction));
    println!("optimal stake  {}", pct(decision.stake));
    println!("log growth     {:.6}", decision.expected_log_growth);
    println!("CVaR penalty   {:.6}", decision.cvar_penalty);
    println!("friction       {:.6}", decision.friction_cost);
    println!("KL divergence  {:.4}", verdict.kl_divergence);
    println!("final stake    {} = {amount}", pct(fraction));
    if let Some(msg) = &verdict.message {
        println!("\x1b[33m{msg}\x1b[0m");
    }
    Ok(())
}

/// `PRICE:PROB[:MATCH]`; the price accepts every notation `devig` does
fn parse_leg(text: &str, index: usize) -> anyhow::Result<ComboLeg> {
    let mut parts = text.splitn(3, ':');
    let (Some(price), Some(prob)) = (parts.next(), parts.next()) else {
        bail!("leg {text:?} is not PRICE:PROB[:MATCH]");
    };
    let price = parse_price_text(price)
        .map(|q| q.price())
        .with_context(|| format!("bad price in leg {text:?}"))?;
    let probability: f64 = prob
        .trim()
        .parse()
        .with_context(|| format!("bad probability in leg {text:?}"))?;

    let leg = ComboLeg::new(format!("leg {}", index + 1), price, probability);
    Ok(match parts.next().map(str::trim).filter(|m| !m.is_empty()) {
        Some(m) => leg.in_match(m),
        None => leg,
    })
}

fn combo(legs: &[String], penalty: Option<f64>, config: EngineConfig, mode: OutputMode) -> anyhow::Result<()> {
    let legs = legs
        .iter()
        .enumerate()
        .map(|(i, l)| parse_leg(l, i))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let analysis: ComboAnalysis = AdvisoryEngine::new(config)?.evaluate_combo(&legs, penalty)?;

    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let rows: Vec<ComboRow> = analysis
        .legs
        .iter()
        .map(|l| ComboRow {
            label: l.label.clone(),
            match_id: l.match_id.clone().unwrap_or_else(|| "-".into()),
            price: format!("{:.2}", l.price),
            model: pct(l.probability),
        })
        .collect();
    print_items(&rows, mode)?;
    println!(
        "price {:.2} | model {} (raw {}, penalty {}) | EV {:+.2}%",
        analysis.combined_price,
        pct(analysis.probability),
        pct(analysis.raw_probability),
        pct(analysis.penalty),
        analysis.ev * 100.0
    );
    println!("stake {} = {}", pct(analysis.stake_fraction), analysis.stake_amount);
    for w in &analysis.warnings {
        println!("\x1b[33mwarning: {w}\x1b[0m");
    }
    Ok(())
}

fn catalog_entry(id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let entry = engine::registry::require(id)?;
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }
    println!("{} ({}) {}", entry.id, entry.kind, entry.name);
    println!("sport   {}", entry.sport.map_or("any", |s| s.as_str()));
    println!("inputs  {}", entry.inputs.join(", "));
    println!("{}", entry.description);
    Ok(())
}

fn catalog(sport: Option<&str>, mode: OutputMode) -> anyhow::Result<()> {
    let sport = match sport {
        Some(tag) => Some(Sport::from_tag(tag).with_context(|| format!("unknown sport {tag:?}"))?),
        None => None,
    };
    let entries = engine::registry::list(sport);

    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    let rows: Vec<CatalogRow> = entries
        .iter()
        .map(|e| CatalogRow {
            id: e.id,
            kind: e.kind.to_string(),
            sport: e.sport.map_or("any", |s| s.as_str()).to_string(),
            name: e.name,
        })
        .collect();
    print_items(&rows, mode)
}
