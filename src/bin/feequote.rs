//! Offline fee quotes against a captured chain snapshot.
//!
//! Every command prices through the same cache, pricing source and formulas
//! the orchestrator uses, so a quote printed here matches what a publisher
//! would be shown for the same chain state.

use alloy_primitives::Address;
use futures::future::{BoxFuture, FutureExt};
use openstore_fees::{
    compute_summary, formulas, snapshot::ChainSnapshot, Clock, EngineConfig, EstimationResult,
    FeeClient, FeeEngine, FeeError, ManualClock, StorageAuth, SummaryRequest, SystemClock,
    TtlCache, UserAction, Wei, GB, MONTH_SECS, WEI_PER_TOKEN,
};
use std::{env, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: feequote <params|quota|store|settle|summary> --snapshot <chain.json> [flags]");
    println!("  params");
    println!("  quota   --gb <N> [--secs <N>]");
    println!("  store   --bytes <N> [--secs <N>] [--as-is]");
    println!("  settle  --account <addr>");
    println!("  summary --account <addr> --action <json> [--publisher <addr>] [--bucket <name>]");
    println!("          [--gas <wei>]");
    println!("Common flags: --config <engine.json> --now <unix_secs>");
    println!("OSF_* environment variables override the configuration; RUST_LOG sets verbosity.");
}

#[derive(Default)]
struct Options {
    snapshot: Option<PathBuf>,
    config: Option<PathBuf>,
    now: Option<u64>,
    gb: Option<u64>,
    bytes: Option<u64>,
    secs: Option<u64>,
    as_is: bool,
    account: Option<Address>,
    publisher: Option<Address>,
    bucket: Option<String>,
    action: Option<UserAction>,
    gas: Option<Wei>,
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> String {
    iter.next()
        .unwrap_or_else(|| fatal(&format!("{flag} expects a value")))
}

fn parsed<T: std::str::FromStr>(iter: &mut impl Iterator<Item = String>, flag: &str) -> T {
    value(iter, flag)
        .parse()
        .unwrap_or_else(|_| fatal(&format!("invalid {flag} value")))
}

fn parse_options(args: Vec<String>) -> Options {
    let mut options = Options::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--snapshot" => options.snapshot = Some(PathBuf::from(value(&mut iter, "--snapshot"))),
            "--config" => options.config = Some(PathBuf::from(value(&mut iter, "--config"))),
            "--now" => options.now = Some(parsed(&mut iter, "--now")),
            "--gb" => options.gb = Some(parsed(&mut iter, "--gb")),
            "--bytes" => options.bytes = Some(parsed(&mut iter, "--bytes")),
            "--secs" => options.secs = Some(parsed(&mut iter, "--secs")),
            "--as-is" => options.as_is = true,
            "--account" => options.account = Some(parsed(&mut iter, "--account")),
            "--publisher" => options.publisher = Some(parsed(&mut iter, "--publisher")),
            "--bucket" => options.bucket = Some(value(&mut iter, "--bucket")),
            "--gas" => options.gas = Some(parsed(&mut iter, "--gas")),
            "--action" => {
                let json = value(&mut iter, "--action");
                let action = serde_json::from_str(&json)
                    .unwrap_or_else(|err| fatal(&format!("invalid --action value: {err}")));
                options.action = Some(action);
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    options
}

fn load_config(options: &Options) -> EngineConfig {
    let loaded = match &options.config {
        Some(path) => EngineConfig::from_json_path(path).and_then(|mut cfg| {
            cfg.apply_env()?;
            Ok(cfg)
        }),
        None => EngineConfig::from_env(),
    };
    loaded.unwrap_or_else(|err| fatal(&err.to_string()))
}

fn format_tokens(wei: Wei) -> String {
    let fraction = format!("{:018}", wei % WEI_PER_TOKEN);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}", wei / WEI_PER_TOKEN)
    } else {
        format!("{}.{fraction}", wei / WEI_PER_TOKEN)
    }
}

fn print_amount(label: &str, wei: Wei) {
    println!("{label:<12} {wei} wei ({})", format_tokens(wei));
}

struct Quoter {
    snapshot: Arc<ChainSnapshot>,
    fees: FeeClient,
    config: EngineConfig,
}

impl Quoter {
    fn new(options: &Options) -> Self {
        let path = options
            .snapshot
            .as_deref()
            .unwrap_or_else(|| fatal("--snapshot is required"));
        let snapshot =
            Arc::new(ChainSnapshot::load(path).unwrap_or_else(|err| fatal(&err.to_string())));
        let config = load_config(options);
        let clock: Arc<dyn Clock> = match options.now {
            Some(now) => Arc::new(ManualClock::new(now)),
            None => Arc::new(SystemClock),
        };
        let fees = FeeClient::new(
            snapshot.clone(),
            snapshot.clone(),
            Arc::new(TtlCache::new()),
            clock,
            &config,
        );
        Self {
            snapshot,
            fees,
            config,
        }
    }

    async fn run(self, command: &str, options: Options) -> Result<(), FeeError> {
        match command {
            "params" => {
                let params = self.fees.pricing_parameters().await?;
                let json = serde_json::to_string_pretty(&params)
                    .map_err(|err| FeeError::Parse(err.to_string()))?;
                println!("{json}");
            }
            "quota" => {
                let gb = options.gb.unwrap_or_else(|| fatal("--gb is required"));
                let secs = options.secs.unwrap_or(MONTH_SECS);
                let fee = self.fees.quota_netflow_rate(gb.saturating_mul(GB), secs).await?;
                print_amount("quota", fee);
            }
            "store" => {
                let bytes = options.bytes.unwrap_or_else(|| fatal("--bytes is required"));
                let secs = options.secs.unwrap_or(MONTH_SECS);
                let params = self.fees.pricing_parameters().await?;
                let fee = formulas::storage_netflow_rate(&params, bytes, secs, options.as_is)?;
                let reserve = formulas::storage_netflow_rate(
                    &params,
                    bytes,
                    params.reserve_time_seconds,
                    false,
                )?;
                print_amount("store", fee);
                print_amount("reserve", reserve);
            }
            "settle" => {
                let account = options
                    .account
                    .unwrap_or_else(|| fatal("--account is required"));
                let fee = self.fees.settlement_fee(account).await?;
                print_amount("settlement", fee);
            }
            "summary" => self.summary(options).await?,
            other => fatal(&format!("Unknown command: {other}")),
        }
        Ok(())
    }

    async fn summary(self, options: Options) -> Result<(), FeeError> {
        let account = options
            .account
            .unwrap_or_else(|| fatal("--account is required"));
        let action = options
            .action
            .unwrap_or_else(|| fatal("--action is required"));
        let mut request = SummaryRequest::new(account, action);
        request.publisher = options.publisher;
        request.bucket = options.bucket;
        request.auth = Some(StorageAuth {
            account,
            seed: String::new(),
        });
        let gas = options.gas.unwrap_or(0);
        let estimator = move || -> BoxFuture<'static, openstore_fees::Result<EstimationResult>> {
            async move { Ok(EstimationResult::fee(gas)) }.boxed()
        };
        let engine = FeeEngine {
            fees: self.fees,
            wallet: self.snapshot.clone(),
            storage: self.snapshot.clone(),
            quota: self.snapshot,
            prices: self.config.prices,
        };
        let summary = compute_summary(&engine, &request, &estimator).await?;
        info!(shortfall = summary.has_shortfall(), "summary computed");
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|err| FeeError::Parse(err.to_string()))?;
        println!("{json}");
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = match args.next() {
        Some(command) if command == "-h" || command == "--help" => {
            print_help();
            return;
        }
        Some(command) => command,
        None => {
            print_help();
            std::process::exit(1);
        }
    };
    let options = parse_options(args.collect());
    let quoter = Quoter::new(&options);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|err| fatal(&format!("failed to start runtime: {err}")));
    if let Err(err) = runtime.block_on(quoter.run(&command, options)) {
        fatal(&format!("{command} failed: {err}"));
    }
}
