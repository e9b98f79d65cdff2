//! `backtest` — run a multi-symbol perpetual-futures backtest from CSV bar
//! history and print/persist the aggregated result.
//!
//! ```text
//! backtest run --symbols BTCUSDT,ETHUSDT --data-path ./data --interval 4h \
//!   --initial-equity 10000 --fee-pct 0.0006 --execution-model realistic \
//!   --slippage-pct 0.0005 --random-seed 42 --out-dir ./out \
//!   --strategy-name trend_pullback [--start-time ...] [--end-time ...]
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use backtest_engine::config::{BacktestRunConfig, ExecutionConfig, ExecutionModelKind};
use backtest_engine::data;
use backtest_engine::ledger::BacktestLedger;
use backtest_engine::model::{FundingEvent, Interval};
use backtest_engine::replay::ReplayLoop;
use backtest_engine::rulebook::RuleBook;
use backtest_engine::{ReplayError, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "backtest", about = "Event-driven perpetual-futures backtest runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest over historical bar/funding CSVs.
    Run(RunArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum CliInterval {
    #[value(name = "4h")]
    FourHour,
    #[value(name = "1d")]
    Daily,
}

impl From<CliInterval> for Interval {
    fn from(value: CliInterval) -> Self {
        match value {
            CliInterval::FourHour => Interval::FourHour,
            CliInterval::Daily => Interval::Daily,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliExecutionModel {
    Ideal,
    Realistic,
    SpreadAware,
}

impl From<CliExecutionModel> for ExecutionModelKind {
    fn from(value: CliExecutionModel) -> Self {
        match value {
            CliExecutionModel::Ideal => ExecutionModelKind::Ideal,
            CliExecutionModel::Realistic => ExecutionModelKind::Realistic,
            CliExecutionModel::SpreadAware => ExecutionModelKind::SpreadAware,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Comma-separated symbol universe, e.g. BTCUSDT,ETHUSDT.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Directory containing `<symbol>.csv` bars and optional `<symbol>_funding.csv`.
    #[arg(long)]
    data_path: PathBuf,

    /// Bar interval of the data files.
    #[arg(long, value_enum, default_value = "4h")]
    interval: CliInterval,

    /// Starting account equity.
    #[arg(long, default_value_t = 10_000.0)]
    initial_equity: f64,

    /// Taker commission rate, as a fraction of notional.
    #[arg(long, default_value_t = 0.0004)]
    fee_pct: f64,

    /// Fill simulation model.
    #[arg(long, value_enum, default_value = "realistic")]
    execution_model: CliExecutionModel,

    /// Fixed slippage fraction.
    #[arg(long, default_value_t = 0.0005)]
    slippage_pct: f64,

    /// Seed for the realistic fill simulator's RNG.
    #[arg(long, default_value_t = 42)]
    random_seed: u64,

    /// Directory to write the run ledger and result summary into.
    #[arg(long)]
    out_dir: PathBuf,

    /// Label recorded alongside the result summary; does not itself select
    /// between strategy variants (the crate ships one configurable pipeline).
    #[arg(long, default_value = "default")]
    strategy_name: String,

    /// Inclusive RFC 3339 start of the replay window (defaults to the earliest loaded bar).
    #[arg(long)]
    start_time: Option<String>,

    /// Inclusive RFC 3339 end of the replay window (defaults to the latest loaded bar).
    #[arg(long)]
    end_time: Option<String>,
}

fn parse_rfc3339_ms(value: &str) -> std::result::Result<i64, ReplayError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| {
            backtest_engine::error::ConfigError::invalid("start_time/end_time", e.to_string()).into()
        })
}

fn run(args: RunArgs) -> Result<()> {
    let interval: Interval = args.interval.into();

    let mut bars_by_symbol = HashMap::new();
    let mut funding_by_symbol: HashMap<String, Vec<FundingEvent>> = HashMap::new();

    for symbol in &args.symbols {
        let bar_path = args.data_path.join(format!("{symbol}.csv"));
        let mut bars = data::read_bars(&bar_path, interval)?;

        if let (Some(start), Some(end)) = (&args.start_time, &args.end_time) {
            let start_ms = parse_rfc3339_ms(start)?;
            let end_ms = parse_rfc3339_ms(end)?;
            bars.retain(|b| b.close_time >= start_ms && b.close_time <= end_ms);
        }
        info!(symbol, bars = bars.len(), "loaded bar history");
        bars_by_symbol.insert(symbol.clone(), bars);

        let funding_path = args.data_path.join(format!("{symbol}_funding.csv"));
        if funding_path.exists() {
            funding_by_symbol.insert(symbol.clone(), data::read_funding(&funding_path)?);
        }
    }

    let execution = ExecutionConfig {
        model: args.execution_model.into(),
        slippage_pct: args.slippage_pct,
        random_seed: args.random_seed,
        commission_pct: args.fee_pct,
        ..ExecutionConfig::default()
    };

    let config: BacktestRunConfig = BacktestRunConfig::builder()
        .symbols(args.symbols.clone())
        .initial_equity(args.initial_equity)
        .execution(execution)
        .build()?;

    std::fs::create_dir_all(&args.out_dir).map_err(|source| backtest_engine::error::DataError::Io {
        path: args.out_dir.display().to_string(),
        source,
    })?;

    let ledger_path = args.out_dir.join("ledger.jsonl");
    let ledger = BacktestLedger::open(&ledger_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to open ledger file, degrading to null ledger");
        BacktestLedger::null()
    });

    let mut replay = ReplayLoop::new(config, bars_by_symbol, funding_by_symbol.clone(), RuleBook::default(), ledger)?;
    let result = replay.run(funding_by_symbol)?;

    info!(
        strategy = args.strategy_name,
        final_equity = result.final_equity,
        total_return = result.total_return,
        total_trades = result.total_trades,
        "backtest complete"
    );

    let summary_path = args.out_dir.join("result.json");
    let summary = serde_json::json!({
        "strategy_name": args.strategy_name,
        "symbols": args.symbols,
        "initial_equity": result.initial_equity,
        "final_equity": result.final_equity,
        "total_return": result.total_return,
        "win_rate": result.win_rate,
        "max_drawdown": result.max_drawdown,
        "total_trades": result.total_trades,
        "fill_rate": result.fill_rate,
        "avg_slippage_bps": result.avg_slippage_bps,
        "total_funding_paid": result.total_funding_paid,
    });
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary).unwrap_or_default())
        .map_err(|source| backtest_engine::error::DataError::Io {
            path: summary_path.display().to_string(),
            source,
        })?;

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let Commands::Run(args) = cli.command else {
        unreachable!("only one subcommand is defined")
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "backtest run failed");
            ExitCode::FAILURE
        }
    }
}
