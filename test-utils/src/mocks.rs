//! Stand-ins for the verification engine and its output sink.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pact_provider::{BoxError, OutputWriter, VerificationEngine, VerifyRequest};
use serde_json::Value;

/// One HTTP call the scripted engine makes against the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// HTTP method
    pub method: String,
    /// Path on the proxy, query included
    pub path: String,
    /// Raw request body
    pub body: Option<String>,
    /// Status the step must receive; anything else fails the run
    pub expect_status: Option<u16>,
}

impl ScriptStep {
    /// A `GET` request.
    #[must_use]
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            body: None,
            expect_status: None,
        }
    }

    /// A `POST` request with a raw body.
    #[must_use]
    pub fn post(path: &str, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
            body: Some(body.into()),
            expect_status: None,
        }
    }

    /// A state change posted to the setup path.
    #[must_use]
    pub fn state_change(payload: &Value) -> Self {
        Self::post(pact_provider::PROVIDER_STATES_SETUP_PATH, payload.to_string())
    }

    /// Require a status.
    #[must_use]
    pub const fn expect_status(mut self, status: u16) -> Self {
        self.expect_status = Some(status);
        self
    }
}

/// What a step got back.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The step
    pub step: ScriptStep,
    /// Response status
    pub status: u16,
    /// Response content type
    pub content_type: Option<String>,
    /// Response body
    pub body: String,
}

/// Everything the engine observed.
#[derive(Debug, Clone, Default)]
pub struct EngineRecord {
    /// Number of `validate` calls
    pub validate_calls: usize,
    /// Number of `run` calls
    pub run_calls: usize,
    /// Request as seen by the last `run` (or `validate`)
    pub last_request: Option<VerifyRequest>,
    /// Outcome of every executed step
    pub outcomes: Vec<StepOutcome>,
}

/// Verification engine that replays scripted HTTP calls.
///
/// Clones share their record, so a test can keep one and hand the other to
/// the verifier.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    steps: Vec<ScriptStep>,
    reject_with: Option<String>,
    fail_with: Option<String>,
    record: Arc<Mutex<EngineRecord>>,
}

impl ScriptedEngine {
    /// Create an engine without steps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step.
    #[must_use]
    pub fn with_step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Fail validation with `message`.
    #[must_use]
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject_with = Some(message.to_string());
        self
    }

    /// Fail the run with `message` after all steps.
    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Snapshot of what has been observed so far.
    #[must_use]
    pub fn record(&self) -> EngineRecord {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, EngineRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(
        client: &reqwest::Client,
        base_url: &str,
        step: &ScriptStep,
    ) -> Result<StepOutcome, BoxError> {
        let method = reqwest::Method::from_bytes(step.method.as_bytes())?;
        let mut call = client.request(method, format!("{base_url}{}", step.path));
        if let Some(body) = &step.body {
            call = call.body(body.clone());
        }

        let response = call.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        Ok(StepOutcome {
            step: step.clone(),
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl VerificationEngine for ScriptedEngine {
    fn validate(&self, request: &VerifyRequest) -> Result<(), BoxError> {
        let mut record = self.lock();
        record.validate_calls += 1;
        record.last_request = Some(request.clone());
        match &self.reject_with {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    async fn run(
        &self,
        request: &VerifyRequest,
        output: &mut dyn OutputWriter,
    ) -> Result<(), BoxError> {
        {
            let mut record = self.lock();
            record.run_calls += 1;
            record.last_request = Some(request.clone());
        }

        let base_url = request
            .proxy_base_url()
            .ok_or("verification proxy is not running")?;
        let client = reqwest::Client::new();

        for step in &self.steps {
            let outcome = Self::execute(&client, &base_url, step).await?;
            output.log(&format!("{} {} -> {}", step.method, step.path, outcome.status));
            let expected = step.expect_status;
            let status = outcome.status;
            self.lock().outcomes.push(outcome);

            if let Some(expected) = expected.filter(|expected| *expected != status) {
                return Err(format!(
                    "{} {}: expected status {expected} but got {status}",
                    step.method, step.path
                )
                .into());
            }
        }

        match &self.fail_with {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

/// Output writer that keeps every line.
#[derive(Debug, Clone, Default)]
pub struct CollectingOutput {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectingOutput {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OutputWriter for CollectingOutput {
    fn log(&mut self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
