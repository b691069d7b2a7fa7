use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::debug;

use crate::config::ScanConfig;

const WINDOW_WIDTH: u32 = 1366;
const WINDOW_HEIGHT: u32 = 768;

/// Share of the capture deadline kept back for closing the browser.
const TEARDOWN_MARGIN: Duration = Duration::from_secs(2);

/// Produces a visual snapshot of a target within `timeout`.
#[async_trait]
pub trait RenderCapturer: Send + Sync {
    async fn capture(&self, target: &str, timeout: Duration) -> Result<Vec<u8>>;
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("timed out after {0:?} waiting for an HTTP status")]
    StatusTimeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("page has no body element: {0}")]
    MissingBody(String),
    #[error("invalid browser configuration: {0}")]
    Config(String),
    #[error("failed to launch browser {path}: {detail}")]
    Launch { path: PathBuf, detail: String },
    #[error("devtools protocol error: {0}")]
    Cdp(String),
    #[error("capture did not finish within {0:?}")]
    Deadline(Duration),
    #[error("failed to prepare browser profile directory: {0}")]
    Scratch(std::io::Error),
}

fn cdp(e: CdpError) -> RenderError {
    RenderError::Cdp(e.to_string())
}

/// Poll `status` every `poll` until a navigation has stored a non-zero HTTP status.
///
/// Gives up after `cap`.
pub async fn wait_for_status(
    status: &AtomicU16,
    poll: Duration,
    cap: Duration,
) -> Result<u16, RenderError> {
    let waiting = async {
        loop {
            let code = status.load(Ordering::Acquire);
            if code != 0 {
                return code;
            }
            time::sleep(poll).await;
        }
    };
    time::timeout(cap, waiting)
        .await
        .map_err(|_| RenderError::StatusTimeout(cap))
}

/// Status of a response event if it answers the page's own top-level document.
///
/// Subresources, responses for child frames and status `0` are ignored.
fn main_document_status(is_document: bool, in_main_frame: bool, status: i64) -> Option<u16> {
    if !is_document || !in_main_frame {
        return None;
    }
    u16::try_from(status).ok().filter(|code| *code != 0)
}

/// Captures full-page screenshots with headless Chromium driven over the DevTools protocol.
///
/// The browser is routed through the proxy and the capture only proceeds once
/// the browser's own navigation has received the document's HTTP response.
/// Each capture runs in a fresh browser with a throwaway profile.
pub struct ChromeCapturer {
    browser: PathBuf,
    proxy_server: String,
    user_agent: String,
    poll_interval: Duration,
    status_wait: Duration,
}

impl ChromeCapturer {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            proxy_server: config.browser_proxy_server(),
            user_agent: config.user_agent.clone(),
            poll_interval: config.status_poll_interval,
            status_wait: config.status_wait,
        }
    }

    fn browser_args(&self) -> Vec<String> {
        vec![
            "--disable-gpu".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-extensions".to_string(),
            "--hide-scrollbars".to_string(),
            format!("--proxy-server={}", self.proxy_server),
            format!("--user-agent={}", self.user_agent),
        ]
    }

    fn browser_config(&self, profile: &Path) -> Result<BrowserConfig, RenderError> {
        BrowserConfig::builder()
            .chrome_executable(&self.browser)
            .user_data_dir(profile)
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(None::<Viewport>)
            .args(self.browser_args())
            .build()
            .map_err(RenderError::Config)
    }

    /// Navigate a new tab to `target` and screenshot it once the document answered.
    async fn capture_page(
        &self,
        browser: &Browser,
        target: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let page = browser.new_page("about:blank").await.map_err(cdp)?;
        page.execute(EnableParams::default()).await.map_err(cdp)?;
        let main_frame = page.mainframe().await.map_err(cdp)?;

        let status = Arc::new(AtomicU16::new(0));
        let recorder = status.clone();
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp)?;
        let listener = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let in_main_frame = match (&main_frame, &event.frame_id) {
                    (Some(main), Some(frame)) => main == frame,
                    _ => true,
                };
                let is_document = event.r#type == ResourceType::Document;
                if let Some(code) =
                    main_document_status(is_document, in_main_frame, event.response.status)
                {
                    // First document response wins.
                    recorder
                        .compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire)
                        .ok();
                }
            }
        });

        let captured = async {
            page.goto(target)
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
            let code = wait_for_status(&status, self.poll_interval, self.status_wait).await?;
            debug!(target, status = code, "document response received");
            page.find_element("body")
                .await
                .map_err(|e| RenderError::MissingBody(e.to_string()))?;
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            page.screenshot(params).await.map_err(cdp)
        }
        .await;
        listener.abort();
        captured
    }
}

#[async_trait]
impl RenderCapturer for ChromeCapturer {
    async fn capture(&self, target: &str, timeout: Duration) -> Result<Vec<u8>> {
        let profile = tempfile::tempdir().map_err(RenderError::Scratch)?;
        let (mut browser, mut handler) = Browser::launch(self.browser_config(profile.path())?)
            .await
            .map_err(|e| RenderError::Launch {
                path: self.browser.clone(),
                detail: e.to_string(),
            })?;
        let connection = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools connection event failed");
                }
            }
        });

        let budget = timeout.saturating_sub(TEARDOWN_MARGIN);
        let captured = time::timeout(budget, self.capture_page(&browser, target))
            .await
            .unwrap_or(Err(RenderError::Deadline(budget)));

        let teardown = async {
            if let Err(e) = browser.close().await {
                debug!(error = %e, "browser did not close cleanly");
            }
            if let Err(e) = browser.wait().await {
                debug!(error = %e, "browser process wait failed");
            }
        };
        if time::timeout(TEARDOWN_MARGIN, teardown).await.is_err() {
            debug!(target, "browser teardown exceeded {:?}", TEARDOWN_MARGIN);
        }
        connection.abort();
        Ok(captured?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_already_set_returns_immediately() {
        let status = AtomicU16::new(404);
        let code = wait_for_status(&status, Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code, 404);
    }

    #[tokio::test(start_paused = true)]
    async fn status_set_later_is_observed() {
        let status = Arc::new(AtomicU16::new(0));
        let setter = status.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(350)).await;
            setter.store(200, Ordering::Release);
        });
        let code = wait_for_status(&status, Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn status_wait_is_capped() {
        let status = AtomicU16::new(0);
        let err = wait_for_status(&status, Duration::from_millis(100), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::StatusTimeout(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn only_top_level_document_responses_count() {
        assert_eq!(main_document_status(true, true, 200), Some(200));
        assert_eq!(main_document_status(true, true, 404), Some(404));
        assert_eq!(main_document_status(false, true, 200), None);
        assert_eq!(main_document_status(true, false, 200), None);
        assert_eq!(main_document_status(true, true, 0), None);
        assert_eq!(main_document_status(true, true, 70_000), None);
    }

    #[tokio::test]
    async fn missing_browser_fails_capture() {
        let config = ScanConfig {
            browser: PathBuf::from("/nonexistent/browser"),
            ..ScanConfig::default()
        };
        let err = ChromeCapturer::new(&config)
            .capture("http://x.onion", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::Launch { .. }) | Some(RenderError::Config(_))
        ));
    }

    #[test]
    fn browser_args_route_through_proxy() {
        let capturer = ChromeCapturer::new(&ScanConfig::default());
        let args = capturer.browser_args();
        assert!(args.contains(&"--proxy-server=socks5://127.0.0.1:9050".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=Mozilla/5.0")));
    }
}
