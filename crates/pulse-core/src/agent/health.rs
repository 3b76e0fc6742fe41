//! HealthDataSource trait: the external, read-only health data service.
//!
//! The orchestrator treats every domain capability uniformly: typed arguments
//! in, a JSON value out. `BoxHealthDataSource` provides dynamic dispatch using
//! the same blanket-impl pattern as `BoxModelProvider`.

use std::future::Future;
use std::pin::Pin;

use pulse_types::error::CapabilityError;

use super::capability::{HealthMetricsArgs, SleepArgs, WorkoutArgs};

type ValueFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, CapabilityError>> + Send + 'a>>;

/// Read-only access to a user's health data.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// The HTTP implementation lives in pulse-infra.
pub trait HealthDataSource: Send + Sync {
    fn health_metrics(
        &self,
        user_id: &str,
        args: &HealthMetricsArgs,
    ) -> impl Future<Output = Result<serde_json::Value, CapabilityError>> + Send;

    fn sleep_data(
        &self,
        user_id: &str,
        args: &SleepArgs,
    ) -> impl Future<Output = Result<serde_json::Value, CapabilityError>> + Send;

    fn workouts(
        &self,
        user_id: &str,
        args: &WorkoutArgs,
    ) -> impl Future<Output = Result<serde_json::Value, CapabilityError>> + Send;
}

/// Object-safe version of [`HealthDataSource`] with boxed futures.
pub trait HealthDataSourceDyn: Send + Sync {
    fn health_metrics_boxed<'a>(&'a self, user_id: &'a str, args: &'a HealthMetricsArgs) -> ValueFuture<'a>;

    fn sleep_data_boxed<'a>(&'a self, user_id: &'a str, args: &'a SleepArgs) -> ValueFuture<'a>;

    fn workouts_boxed<'a>(&'a self, user_id: &'a str, args: &'a WorkoutArgs) -> ValueFuture<'a>;
}

impl<T: HealthDataSource> HealthDataSourceDyn for T {
    fn health_metrics_boxed<'a>(&'a self, user_id: &'a str, args: &'a HealthMetricsArgs) -> ValueFuture<'a> {
        Box::pin(self.health_metrics(user_id, args))
    }

    fn sleep_data_boxed<'a>(&'a self, user_id: &'a str, args: &'a SleepArgs) -> ValueFuture<'a> {
        Box::pin(self.sleep_data(user_id, args))
    }

    fn workouts_boxed<'a>(&'a self, user_id: &'a str, args: &'a WorkoutArgs) -> ValueFuture<'a> {
        Box::pin(self.workouts(user_id, args))
    }
}

/// Type-erased health data source.
pub struct BoxHealthDataSource {
    inner: Box<dyn HealthDataSourceDyn + Send + Sync>,
}

impl BoxHealthDataSource {
    pub fn new<T: HealthDataSource + 'static>(source: T) -> Self {
        Self {
            inner: Box::new(source),
        }
    }

    pub async fn health_metrics(
        &self,
        user_id: &str,
        args: &HealthMetricsArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.inner.health_metrics_boxed(user_id, args).await
    }

    pub async fn sleep_data(
        &self,
        user_id: &str,
        args: &SleepArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.inner.sleep_data_boxed(user_id, args).await
    }

    pub async fn workouts(
        &self,
        user_id: &str,
        args: &WorkoutArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.inner.workouts_boxed(user_id, args).await
    }
}
