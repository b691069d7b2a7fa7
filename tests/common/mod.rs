#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tor_scan_rs::aggregator::ReportAggregator;
use tor_scan_rs::artifacts::{ArtifactKind, ArtifactStore};
use tor_scan_rs::config::ScanConfig;
use tor_scan_rs::pipeline::TargetPipeline;
use tor_scan_rs::render::RenderCapturer;
use tor_scan_rs::scanner;
use tor_scan_rs::transport::{HttpRequest, HttpResponse, Transport};
use tor_scan_rs::types::ScanReport;

/// Tracks how many calls are in flight at once and the highest value seen.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    pub check_url: String,
    pub check_fails: bool,
    pub page_status: HashMap<String, u16>,
    pub unreachable: HashSet<String>,
    pub delay: Duration,
    pub gauge: Arc<Gauge>,
    pub calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(gauge: Arc<Gauge>) -> Self {
        Self {
            check_url: ScanConfig::default().check_url,
            check_fails: false,
            page_status: HashMap::new(),
            unreachable: HashSet::new(),
            delay: Duration::ZERO,
            gauge,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(request.url.clone());
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();

        if request.url == self.check_url {
            if self.check_fails {
                bail!("SOCKS connect to 127.0.0.1:9050 refused");
            }
            return Ok(HttpResponse {
                status: 200,
                body: br#"{"IsTor":true,"IP":"185.220.101.33"}"#.to_vec(),
            });
        }
        if self.unreachable.contains(&request.url) {
            bail!("host unreachable: {}", request.url);
        }
        let status = self.page_status.get(&request.url).copied().unwrap_or(200);
        Ok(HttpResponse {
            status,
            body: format!("<html>{}</html>", request.url).into_bytes(),
        })
    }
}

pub struct MockCapturer {
    pub fail: HashSet<String>,
    pub panic_on: HashSet<String>,
    pub stall: HashSet<String>,
    pub delay: Duration,
    pub gauge: Arc<Gauge>,
    pub calls: Mutex<Vec<String>>,
}

impl MockCapturer {
    pub fn new(gauge: Arc<Gauge>) -> Self {
        Self {
            fail: HashSet::new(),
            panic_on: HashSet::new(),
            stall: HashSet::new(),
            delay: Duration::ZERO,
            gauge,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderCapturer for MockCapturer {
    async fn capture(&self, target: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(target.to_string());
        if self.panic_on.contains(target) {
            panic!("renderer crashed on {target}");
        }
        if self.stall.contains(target) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();
        if self.fail.contains(target) {
            bail!("timed out waiting for an HTTP status");
        }
        Ok(b"\x89PNG fake".to_vec())
    }
}

/// Store that keeps artifacts in memory and can be told to refuse some kinds
/// or to panic for some targets.
#[derive(Default)]
pub struct MemoryStore {
    pub refuse: Vec<ArtifactKind>,
    pub panic_on: HashSet<String>,
    pub saved: Mutex<Vec<(String, ArtifactKind, usize)>>,
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(&self, bytes: &[u8], target: &str, kind: ArtifactKind) -> Result<PathBuf> {
        if self.panic_on.contains(target) {
            panic!("store crashed on {target}");
        }
        if self.refuse.contains(&kind) {
            bail!("disk full");
        }
        self.saved
            .lock()
            .unwrap()
            .push((target.to_string(), kind, bytes.len()));
        Ok(PathBuf::from(format!("mem/{}/{}", kind.dir_name(), target.len())))
    }
}

pub fn targets(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://site{i}.onion/")).collect()
}

pub async fn run(
    targets: &[String],
    concurrency: usize,
    transport: Arc<MockTransport>,
    capturer: Arc<MockCapturer>,
    store: Arc<dyn ArtifactStore>,
    config: &ScanConfig,
) -> ScanReport {
    let pipeline = Arc::new(TargetPipeline::new(transport, capturer, config));
    let aggregator = Arc::new(ReportAggregator::new(targets.len()));
    scanner::scan_targets(targets, concurrency, pipeline, store, aggregator).await
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Subscriber that writes WARN and above into this capture, without ANSI colors.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || sink.clone())
            .finish()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
