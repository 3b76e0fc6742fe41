//! HTTP client for the external, read-only health data service.
//!
//! Each domain capability is one GET: `{base_url}/metrics`, `/sleep` or
//! `/workouts`, with `user_id` and the capability arguments as query
//! parameters. The JSON body is handed back to the model unchanged.

use std::time::Duration;

use serde::Serialize;

use pulse_core::agent::capability::{HealthMetricsArgs, SleepArgs, WorkoutArgs};
use pulse_core::agent::health::HealthDataSource;
use pulse_types::config::HealthConfig;
use pulse_types::error::CapabilityError;

pub struct HttpHealthDataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHealthDataSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.base_url.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get<A: Serialize>(
        &self,
        capability: &str,
        path: &str,
        user_id: &str,
        args: &A,
    ) -> Result<serde_json::Value, CapabilityError> {
        let failed = |message: String| CapabilityError::Execution {
            name: capability.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.endpoint(path))
            .query(&[("user_id", user_id)])
            .query(args)
            .send()
            .await
            .map_err(|e| failed(format!("health service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("health service returned HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| failed(format!("invalid health service response: {e}")))
    }
}

impl HealthDataSource for HttpHealthDataSource {
    async fn health_metrics(
        &self,
        user_id: &str,
        args: &HealthMetricsArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.get("get_health_metrics", "metrics", user_id, args).await
    }

    async fn sleep_data(&self, user_id: &str, args: &SleepArgs) -> Result<serde_json::Value, CapabilityError> {
        self.get("get_sleep_data", "sleep", user_id, args).await
    }

    async fn workouts(&self, user_id: &str, args: &WorkoutArgs) -> Result<serde_json::Value, CapabilityError> {
        self.get("get_workouts", "workouts", user_id, args).await
    }
}
