use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::info;

use crate::config::ScanConfig;
use crate::render::RenderCapturer;
use crate::transport::{parse_anonymity_check, HttpRequest, Transport};
use crate::types::{ScanSuccess, Stage, StageError};

/// Runs VerifyAnonymity -> FetchContent -> CaptureRender for one target.
///
/// Each stage gates the next: the first failure ends the run with a
/// [`StageError`] naming that stage. The HTTP status of the fetched page is
/// recorded but never gates progression; only transport errors do.
pub struct TargetPipeline {
    transport: Arc<dyn Transport>,
    capturer: Arc<dyn RenderCapturer>,
    check_url: String,
    user_agent: String,
    render_timeout: Duration,
}

impl TargetPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        capturer: Arc<dyn RenderCapturer>,
        config: &ScanConfig,
    ) -> Self {
        Self {
            transport,
            capturer,
            check_url: config.check_url.clone(),
            user_agent: config.user_agent.clone(),
            render_timeout: config.render_timeout,
        }
    }

    pub async fn run(&self, target: &str) -> Result<ScanSuccess, StageError> {
        self.run_observed(target, &|_: Stage| {}).await
    }

    /// Like [`run`](Self::run), reporting each stage to `on_stage` as it is entered.
    pub async fn run_observed(
        &self,
        target: &str,
        on_stage: &(dyn Fn(Stage) + Send + Sync),
    ) -> Result<ScanSuccess, StageError> {
        on_stage(Stage::VerifyAnonymity);
        let observed_address = self.verify_anonymity().await?;
        info!(target, exit = %observed_address, "anonymized route verified");

        on_stage(Stage::FetchContent);
        let (content, status_code) = self.fetch_content(target).await?;

        on_stage(Stage::CaptureRender);
        let render = self.capture_render(target).await?;

        Ok(ScanSuccess {
            target: target.to_string(),
            status_code,
            observed_address,
            render,
            content,
        })
    }

    async fn verify_anonymity(&self) -> Result<String, StageError> {
        let fail = |detail: String| StageError::new(Stage::VerifyAnonymity, detail);
        let response = self
            .transport
            .execute(HttpRequest::get(&self.check_url))
            .await
            .map_err(|e| fail(format!("{e:#}")))?;
        if !response.is_success() {
            return Err(fail(format!(
                "anonymity check returned HTTP {}",
                response.status
            )));
        }
        parse_anonymity_check(&response.body).map_err(|e| fail(format!("{e:#}")))
    }

    async fn fetch_content(&self, target: &str) -> Result<(Vec<u8>, u16), StageError> {
        let request = HttpRequest::get(target).header("User-Agent", self.user_agent.as_str());
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| StageError::new(Stage::FetchContent, format!("{e:#}")))?;
        Ok((response.body, response.status))
    }

    async fn capture_render(&self, target: &str) -> Result<Vec<u8>, StageError> {
        let fail = |detail: String| StageError::new(Stage::CaptureRender, detail);
        match time::timeout(
            self.render_timeout,
            self.capturer.capture(target, self.render_timeout),
        )
        .await
        {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(fail(format!("{e:#}"))),
            Err(_) => Err(fail(format!(
                "render capture timed out after {:?}",
                self.render_timeout
            ))),
        }
    }
}
