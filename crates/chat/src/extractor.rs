//! Submit a prompt into a chat tab and harvest the assistant's reply.

use chatbridge_browser::{html_to_markdown, ResponseWatch, Tab, WaitCondition};
use chatbridge_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::site::SiteProfile;

/// One prompt/reply round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Assistant reply as Markdown.
    pub reply: String,
    /// Body of the inference request; diagnostic only.
    pub raw_signal: String,
}

/// A failed exchange. When the inference request was sent but did not
/// finish in time, `pending` still holds the armed observer so the caller
/// can wait out the late response.
pub struct ExtractFailure {
    pub error: Error,
    pub pending: Option<ResponseWatch>,
}

impl From<Error> for ExtractFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            pending: None,
        }
    }
}

impl std::fmt::Debug for ExtractFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractFailure")
            .field("error", &self.error)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

pub struct ReplyExtractor {
    site: Arc<SiteProfile>,
    timeout: Duration,
}

impl ReplyExtractor {
    /// `timeout` bounds each wait independently.
    pub fn new(site: Arc<SiteProfile>, timeout: Duration) -> Self {
        Self { site, timeout }
    }

    pub async fn submit_and_harvest(
        &self,
        tab: &dyn Tab,
        prompt: &str,
    ) -> std::result::Result<Exchange, ExtractFailure> {
        let site = self.site.config();
        let input = site.prompt_input.as_str();
        let submit = site.submit_button.as_str();
        let assistant = site.assistant_message.as_str();

        tab.wait_for(input, WaitCondition::Visible, self.timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout(_) => Error::InputNotFound(format!(
                    "Prompt input '{}' not visible within {:?}",
                    input, self.timeout
                )),
                other => other,
            })?;

        tab.clear(input).await?;
        tab.type_text(input, prompt).await?;

        let entered = tab.value(input).await?.unwrap_or_default();
        if entered != prompt {
            return Err(Error::InputMismatch {
                expected: prompt.to_string(),
                actual: entered,
            }
            .into());
        }

        let replies_before = tab.count(assistant).await?;
        let mut signal = tab.observe_response(self.site.inference_filter()).await?;

        tab.wait_for(submit, WaitCondition::Enabled, self.timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout(_) => Error::InputNotFound(format!(
                    "Submit control '{}' not enabled within {:?}",
                    submit, self.timeout
                )),
                other => other,
            })?;
        tab.click(submit).await?;
        debug!(target = %tab.target_id(), chars = prompt.len(), "Prompt submitted");

        let outcome = signal.wait(self.timeout).await;
        let response = match outcome {
            Ok(response) => response,
            Err(Error::Timeout(_)) => {
                return Err(ExtractFailure {
                    error: Error::CompletionTimeout(format!(
                        "No inference response within {:?}",
                        self.timeout
                    )),
                    pending: Some(signal),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if response.status >= 400 {
            warn!(status = response.status, url = %response.url, "Inference request returned an error status");
        }

        tab.wait_for(assistant, WaitCondition::CountAbove(replies_before), self.timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout(_) => Error::CompletionTimeout(format!(
                    "No new assistant message within {:?}",
                    self.timeout
                )),
                other => other,
            })?;

        let html = tab
            .last_inner_html(assistant)
            .await?
            .ok_or_else(|| Error::Extraction("No assistant message found".to_string()))?;
        let reply = html_to_markdown(&html).trim().to_string();
        if reply.is_empty() {
            return Err(Error::Extraction("Assistant message was empty".to_string()).into());
        }

        Ok(Exchange {
            reply,
            raw_signal: response.body,
        })
    }
}
