use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROXY: &str = "socks5h://127.0.0.1:9050";
pub const DEFAULT_CHECK_URL: &str = "https://check.torproject.org/api/ip";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Runtime settings shared by the transport, pipeline and capturer.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// SOCKS proxy URL. `socks5h` keeps name resolution inside Tor.
    pub proxy_url: String,
    pub check_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Overall deadline for one render capture.
    pub render_timeout: Duration,
    pub status_poll_interval: Duration,
    /// Cap on waiting for the navigation to report an HTTP status.
    pub status_wait: Duration,
    pub concurrency: usize,
    pub output_dir: PathBuf,
    pub browser: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY.to_string(),
            check_url: DEFAULT_CHECK_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(30),
            status_poll_interval: Duration::from_millis(100),
            status_wait: Duration::from_secs(5),
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("output"),
            browser: PathBuf::from("chromium"),
        }
    }
}

impl ScanConfig {
    /// Browser-facing form of the proxy (`--proxy-server` does not accept `socks5h`).
    pub fn browser_proxy_server(&self) -> String {
        match self.proxy_url.strip_prefix("socks5h://") {
            Some(rest) => format!("socks5://{rest}"),
            None => self.proxy_url.clone(),
        }
    }
}
