// fraudsig/src/main.rs
//
// fraudsig: explainable fraud signatures over a live transaction graph.
//
// Two operational modes:
//   batch  load a JSONL transaction file, refresh analytics once, print
//          signatures for the requested accounts (or every ring member)
//   tail   follow a growing JSONL feed, commit + refresh on a cadence and
//          print signatures for accounts that newly join a ring
//
// Usage:
//   fraudsig --mode batch --path tx.jsonl --account ACC1 --weights weights.json
//   fraudsig --mode tail  --path /var/log/payments/tx.jsonl --config engine.json

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fraudsig::events::{RiskOutput, SignatureOutcome, Transaction};
use fraudsig::ingest::{load_jsonl, tail_jsonl};
use fraudsig::{EngineConfig, RiskWeights, SignaturePipeline};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "fraudsig",
    about   = "Explainable fraud signatures from transaction graph analytics",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "batch")]
    mode: Mode,

    #[arg(long, default_value = "/tmp/fraudsig_transactions.jsonl",
          help = "JSONL transaction feed")]
    path: PathBuf,

    #[arg(long = "account", help = "Account to score (repeatable; default: all ring members)")]
    accounts: Vec<String>,

    #[arg(long, help = "JSON file with centrality_weight, cycle_weight, community_weight")]
    weights: Option<PathBuf>,

    #[arg(long, help = "Engine config JSON (missing fields use defaults)")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "1000", help = "Commit the graph every N records (tail mode)")]
    commit_every: u64,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Batch,  // one-shot scoring of a static file
    Tail,   // follow a live feed
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_signature(account_id: &str, outcome: &SignatureOutcome, risk: Option<&RiskOutput>) {
    let sig = &outcome.signature;
    let color = if outcome.is_degraded() {
        "\x1b[90m"
    } else if sig.risk_vector.is_empty() {
        "\x1b[92m"
    } else if sig.risk_vector.iter().any(|(_, v)| v > 0.8) {
        "\x1b[91;1m"
    } else {
        "\x1b[93;1m"
    };
    let reset = "\x1b[0m";
    let vector = sig
        .risk_vector
        .iter()
        .map(|(k, v)| format!("{}={:.3}", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    println!("\n{}{}{}  [{}]", color, sig.fraud_tag, reset, outcome.source);
    println!("  Account : {}{}{}", color, account_id, reset);
    println!("  Vector  : {}", if vector.is_empty() { "-".to_string() } else { vector });
    for f in &sig.contributing_factors {
        println!("  Factor  : {}", f);
    }
    if let Some(r) = risk {
        println!("  Network : {:.4}  ({})", r.network_risk(), r.fraud_tag);
    }
}

async fn print_stats_loop(p: Arc<SignaturePipeline>, start: Instant) {
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
        let elapsed = start.elapsed().as_secs_f64();
        let txs     = p.graph.total_transactions.load(Ordering::Relaxed);
        let (accounts, rings) = match p.analytics.current() {
            Some(a) => (p.graph.snapshot().map(|s| s.node_count()).unwrap_or(0), a.ring_members().len()),
            None    => (0, 0),
        };
        println!(
            "\n\x1b[1m── stats  uptime={:.0}s  tx={}  tps={:.1}  accounts={}  ring_members={}  cache={} hit={} miss={} ──\x1b[0m",
            elapsed, txs, txs as f64 / elapsed, accounts, rings,
            p.cache.len(),
            p.cache.hits.load(Ordering::Relaxed),
            p.cache.misses.load(Ordering::Relaxed),
        );
    }
}

async fn housekeeping_loop(p: Arc<SignaturePipeline>) {
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        ticker.tick().await;
        let purged = p.cache.purge_expired();
        if purged > 0 {
            info!("Housekeeping purged {} expired signatures", purged);
        }
    }
}

/// Score accounts that newly joined a ring after each analytics refresh.
async fn ring_alert_loop(p: Arc<SignaturePipeline>) {
    let mut ticker       = tokio::time::interval(p.refresh_interval());
    let mut seen_version = 0u64;
    let mut alerted: HashSet<String> = HashSet::new();
    loop {
        ticker.tick().await;
        let version = p.analytics.current().map(|a| a.graph_version).unwrap_or(0);
        if version == seen_version {
            continue;
        }
        seen_version = version;

        match p.score_new_ring_members(&mut alerted).await {
            Ok(scored) => {
                for (account, outcome) in &scored {
                    print_signature(account, outcome, None);
                }
            }
            Err(e) => error!("Ring scoring failed: {}", e),
        }
    }
}

// ── Modes ─────────────────────────────────────────────────────────────────────

async fn run_batch(p: Arc<SignaturePipeline>, cli: &Cli, weights: Option<RiskWeights>) -> Result<()> {
    let txs = load_jsonl(&cli.path)
        .await
        .with_context(|| format!("loading {}", cli.path.display()))?;
    let snapshot = p.graph.ingest_batch(&txs);

    let refresher = Arc::clone(&p.analytics);
    let analytics = tokio::task::spawn_blocking(move || refresher.refresh()).await??;

    println!(
        "  Graph   : {} accounts, {} edges, {} transactions (rejected {})",
        snapshot.node_count(),
        snapshot.edge_count(),
        snapshot.transaction_count(),
        p.graph.rejected.load(Ordering::Relaxed),
    );
    println!("  Louvain : {} communities, modularity {:.4}", analytics.n_communities(), analytics.modularity);

    let accounts: Vec<String> = if cli.accounts.is_empty() {
        analytics.ring_members().into_iter().map(|(id, _)| id).collect()
    } else {
        cli.accounts.clone()
    };
    if accounts.is_empty() {
        println!("\n  No circular fund flows found. Pass --account to score specific accounts.");
        return Ok(());
    }

    for account in &accounts {
        let outcome = p.composer.resolve_signature(account).await?;
        let risk = match &weights {
            Some(w) => match p.risk.evaluate_risk(account, w) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Risk evaluation failed for {}: {}", account, e);
                    None
                }
            },
            None => None,
        };
        print_signature(account, &outcome, risk.as_ref());
    }
    Ok(())
}

async fn run_tail(p: Arc<SignaturePipeline>, cli: &Cli) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Transaction>(16384);
    let path = cli.path.clone();
    tokio::spawn(async move {
        if let Err(e) = tail_jsonl(path, tx, false).await {
            error!("Feed reader stopped: {}", e);
        }
    });

    tokio::spawn(Arc::clone(&p.analytics).refresh_loop(p.refresh_interval()));
    tokio::spawn(print_stats_loop(Arc::clone(&p), Instant::now()));
    tokio::spawn(housekeeping_loop(Arc::clone(&p)));
    tokio::spawn(ring_alert_loop(Arc::clone(&p)));

    println!("  Press Ctrl+C to stop.\n");

    let commit_every = cli.commit_every.max(1);
    let mut pending = 0u64;
    while let Some(record) = rx.recv().await {
        if let Err(e) = p.graph.upsert_transaction(&record) {
            warn!("Rejected record: {}", e);
            continue;
        }
        pending += 1;
        if pending >= commit_every || !p.graph.is_initialized() {
            p.graph.commit();
            pending = 0;
        }
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("fraudsig=info".parse()?))
        .compact().init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None       => EngineConfig::default(),
    };
    config.validate()?;
    let weights = cli.weights.as_deref().map(RiskWeights::from_file).transpose()?;

    let pipeline = Arc::new(SignaturePipeline::new(config));

    println!("\n  \x1b[1mfraudsig\x1b[0m \x1b[90mv{}\x1b[0m", env!("CARGO_PKG_VERSION"));
    match cli.mode {
        Mode::Batch => {
            println!("  Mode: \x1b[96mBATCH\x1b[0m  |  {}", cli.path.display());
            run_batch(pipeline, &cli, weights).await
        }
        Mode::Tail => {
            println!("  Mode: \x1b[93mTAIL\x1b[0m  |  {}  commit_every={}", cli.path.display(), cli.commit_every);
            run_tail(pipeline, &cli).await
        }
    }
}
