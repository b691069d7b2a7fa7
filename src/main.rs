use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tor_scan_rs::aggregator::ReportAggregator;
use tor_scan_rs::artifacts::{ArtifactKind, FsArtifactStore};
use tor_scan_rs::config::{self, ScanConfig};
use tor_scan_rs::pipeline::TargetPipeline;
use tor_scan_rs::render::ChromeCapturer;
use tor_scan_rs::transport::{TorTransport, Transport};
use tor_scan_rs::types::{ScanOutcome, ScanReport};
use tor_scan_rs::{logging, report, scanner, targets, timestamp};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

/// tor-scan-rs — Fetch and screenshot a list of targets through the Tor SOCKS proxy.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tor-scan-rs",
    version,
    about = "Fetch and screenshot a list of targets through the Tor SOCKS proxy.",
    long_about = None
)]
struct Cli {
    /// Path to the target list (one address per line, blank lines ignored).
    #[arg(long, default_value = "configs/targets.txt")]
    targets: PathBuf,

    /// Max targets scanned at the same time.
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// SOCKS proxy every request and the browser are routed through.
    #[arg(long, default_value = config::DEFAULT_PROXY)]
    proxy: String,

    /// Endpoint used to confirm the route is anonymized.
    #[arg(long = "check-url", default_value = config::DEFAULT_CHECK_URL)]
    check_url: String,

    /// Directory for the report, log file, screenshots and page sources.
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Headless Chromium binary used for screenshots.
    #[arg(long, default_value = "chromium")]
    browser: PathBuf,

    /// Overall screenshot deadline per target, in seconds.
    #[arg(long = "render-timeout-secs", default_value_t = 30)]
    render_timeout_secs: u64,

    /// Proxy request timeout, in seconds.
    #[arg(long = "request-timeout-secs", default_value_t = 15)]
    request_timeout_secs: u64,
}

impl Cli {
    fn into_config(self) -> (PathBuf, ScanConfig) {
        let config = ScanConfig {
            proxy_url: self.proxy,
            check_url: self.check_url,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            concurrency: self.concurrency,
            output_dir: self.output,
            browser: self.browser,
            ..ScanConfig::default()
        };
        (self.targets, config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (targets_path, config) = Cli::parse().into_config();
    let stamp = timestamp::now_compact();

    let (_log_guard, log_path) = match logging::init(&config.output_dir, &stamp) {
        Ok((guard, path)) => (Some(guard), Some(path)),
        Err(e) => {
            logging::init_console().context("failed to initialize logging")?;
            warn!("file logging disabled: {e}");
            (None, None)
        }
    };

    println!("tor-scan-rs configuration:");
    println!("  targets      : {}", targets_path.display());
    println!("  concurrency  : {}", config.concurrency);
    println!("  proxy        : {}", config.proxy_url);
    println!("  check_url    : {}", config.check_url);
    println!("  output       : {}", config.output_dir.display());
    println!("  browser      : {}", config.browser.display());

    let target_list = targets::load_targets_from_path(&targets_path).map_err(|e| {
        error!("Failed to read targets: {e:#}");
        e
    })?;
    let transport: Arc<dyn Transport> = Arc::new(TorTransport::new(&config).map_err(|e| {
        error!("Failed to create TOR client: {e:#}");
        e
    })?);

    info!("Starting TOR scan with {} targets", target_list.len());

    let capturer = Arc::new(ChromeCapturer::new(&config));
    let pipeline = Arc::new(TargetPipeline::new(transport, capturer, &config));
    let store = FsArtifactStore::new(&config.output_dir);
    let aggregator = Arc::new(ReportAggregator::new(target_list.len()));

    let results = scanner::scan_targets(
        &target_list,
        config.concurrency,
        pipeline,
        Arc::new(store.clone()),
        aggregator,
    )
    .await;

    let report_path = report::report_path(&config.output_dir, &stamp);
    match report::write_report(&report_path, &results) {
        Ok(()) => info!("Report saved: {}", report_path.display()),
        Err(e) => error!("Failed to save report: {e:#}"),
    }

    info!("========================================");
    info!(
        "Total: {}, Success: {}, Failed: {}",
        results.total_targets, results.success_count, results.fail_count
    );
    info!("Screenshots: {}", store.dir_for(ArtifactKind::Render).display());
    info!("HTML files: {}", store.dir_for(ArtifactKind::Content).display());
    if let Some(path) = &log_path {
        info!("Log file: {}", path.display());
    }
    info!("JSON Report: {}", report_path.display());
    info!("========================================");

    print_results_table(&results);
    Ok(())
}

const TARGET_COLUMN_MAX: usize = 60;

/// Target text as shown in the table, cut to [`TARGET_COLUMN_MAX`] characters.
fn table_target(target: &str) -> String {
    target.chars().take(TARGET_COLUMN_MAX).collect()
}

fn print_results_table(results: &ScanReport) {
    let mut target_w = "target".len();
    let mut addr_w = "exit_ip".len();
    for o in &results.outcomes {
        target_w = target_w.max(table_target(o.target()).chars().count());
        if let ScanOutcome::Success(s) = o {
            addr_w = addr_w.max(s.observed_address.chars().count());
        }
    }
    let status_w = "status".len().max("FAILED".len());
    let code_w = "code".len();

    println!(
        "\nSucceeded: {} Failed: {} (targets: {})",
        results.success_count, results.fail_count, results.total_targets
    );
    println!(
        "{:<target_w$}  {:<status_w$}  {:>code_w$}  {:<addr_w$}  detail",
        "target", "status", "code", "exit_ip",
    );
    println!(
        "{:-<target_w$}  {:-<status_w$}  {:-<code_w$}  {:-<addr_w$}  ------",
        "", "", "", "",
    );
    for o in &results.outcomes {
        let target = table_target(o.target());
        match o {
            ScanOutcome::Success(s) => println!(
                "{:<target_w$}  {:<status_w$}  {:>code_w$}  {:<addr_w$}  {}",
                target,
                "OK",
                s.status_code,
                s.observed_address,
                s.render_path.as_deref().unwrap_or("<no screenshot saved>"),
            ),
            ScanOutcome::Failure(f) => println!(
                "{:<target_w$}  {:<status_w$}  {:>code_w$}  {:<addr_w$}  {}: {}",
                target, "FAILED", "-", "-", f.stage, f.error_detail,
            ),
        }
    }
}
