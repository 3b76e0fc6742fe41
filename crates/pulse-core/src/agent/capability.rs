//! The closed set of capabilities the model may invoke.
//!
//! Each capability has a name, a description, and a typed argument struct
//! whose JSON schema (generated with `schemars`) is sent to the model. A
//! static lookup table maps names to decoders; the orchestrator never
//! dispatches on anything but a [`CapabilityCall`] variant.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pulse_types::config::AssistantVariant;
use pulse_types::error::CapabilityError;
use pulse_types::llm::{ToolCall, ToolSchema};

/// How a metric series is summarized by the data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Average,
    Min,
    Max,
    Sum,
    /// One value per day.
    Daily,
}

/// Arguments for `get_health_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthMetricsArgs {
    /// Metric name, e.g. "heart_rate", "resting_heart_rate", "steps", "weight", "hrv".
    pub metric: String,
    /// First day of the range, YYYY-MM-DD.
    pub start_date: String,
    /// Last day of the range (inclusive), YYYY-MM-DD.
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
}

/// Arguments for `get_sleep_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SleepArgs {
    /// First night of the range, YYYY-MM-DD.
    pub start_date: String,
    /// Last night of the range (inclusive), YYYY-MM-DD.
    pub end_date: String,
}

/// Arguments for `get_workouts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkoutArgs {
    /// First day of the range, YYYY-MM-DD.
    pub start_date: String,
    /// Last day of the range (inclusive), YYYY-MM-DD.
    pub end_date: String,
    /// Restrict to one workout type, e.g. "running", "cycling", "strength".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<String>,
}

/// Arguments for `fetch_goals`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FetchGoalsArgs {
    /// Only goals related to this topic. Omit to get all goals, newest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Arguments for `suggest_tool_pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuggestPatternArgs {
    /// The user's question, or a paraphrase of it.
    pub query: String,
}

/// Arguments for `recall_conversation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecallArgs {
    /// How many of the most recent messages to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// A decoded, validated capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityCall {
    GetHealthMetrics(HealthMetricsArgs),
    GetSleepData(SleepArgs),
    GetWorkouts(WorkoutArgs),
    FetchGoals(FetchGoalsArgs),
    SuggestToolPattern(SuggestPatternArgs),
    RecallConversation(RecallArgs),
}

impl CapabilityCall {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityCall::GetHealthMetrics(_) => "get_health_metrics",
            CapabilityCall::GetSleepData(_) => "get_sleep_data",
            CapabilityCall::GetWorkouts(_) => "get_workouts",
            CapabilityCall::FetchGoals(_) => "fetch_goals",
            CapabilityCall::SuggestToolPattern(_) => "suggest_tool_pattern",
            CapabilityCall::RecallConversation(_) => "recall_conversation",
        }
    }
}

/// Whether a capability reads external health data or the assistant's own memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Domain,
    Memory,
}

/// One row of the capability lookup table.
pub struct CapabilitySpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: CapabilityKind,
    schema: fn() -> serde_json::Value,
    decode: fn(serde_json::Value) -> Result<CapabilityCall, String>,
}

impl CapabilitySpec {
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: (self.schema)(),
        }
    }
}

static CAPABILITIES: [CapabilitySpec; 6] = [
    CapabilitySpec {
        name: "get_health_metrics",
        description: "Read a health metric (heart rate, steps, weight, HRV, ...) for a date range, optionally aggregated.",
        kind: CapabilityKind::Domain,
        schema: schema_of::<HealthMetricsArgs>,
        decode: |v| {
            let args: HealthMetricsArgs = decode(v)?;
            validate_range(&args.start_date, &args.end_date)?;
            if args.metric.trim().is_empty() {
                return Err("metric must not be empty".to_string());
            }
            Ok(CapabilityCall::GetHealthMetrics(args))
        },
    },
    CapabilitySpec {
        name: "get_sleep_data",
        description: "Read nightly sleep records (duration, stages, efficiency) for a date range.",
        kind: CapabilityKind::Domain,
        schema: schema_of::<SleepArgs>,
        decode: |v| {
            let args: SleepArgs = decode(v)?;
            validate_range(&args.start_date, &args.end_date)?;
            Ok(CapabilityCall::GetSleepData(args))
        },
    },
    CapabilitySpec {
        name: "get_workouts",
        description: "List recorded workouts for a date range, optionally of one type.",
        kind: CapabilityKind::Domain,
        schema: schema_of::<WorkoutArgs>,
        decode: |v| {
            let args: WorkoutArgs = decode(v)?;
            validate_range(&args.start_date, &args.end_date)?;
            Ok(CapabilityCall::GetWorkouts(args))
        },
    },
    CapabilitySpec {
        name: "fetch_goals",
        description: "Fetch the user's saved health goals, newest first, optionally only those related to a topic.",
        kind: CapabilityKind::Memory,
        schema: schema_of::<FetchGoalsArgs>,
        decode: |v| decode(v).map(CapabilityCall::FetchGoals),
    },
    CapabilitySpec {
        name: "suggest_tool_pattern",
        description: "Look up capability sequences that answered similar questions well in the past.",
        kind: CapabilityKind::Memory,
        schema: schema_of::<SuggestPatternArgs>,
        decode: |v| decode(v).map(CapabilityCall::SuggestToolPattern),
    },
    CapabilitySpec {
        name: "recall_conversation",
        description: "Return the most recent messages of the current conversation only.",
        kind: CapabilityKind::Memory,
        schema: schema_of::<RecallArgs>,
        decode: |v| decode(v).map(CapabilityCall::RecallConversation),
    },
];

/// Generate the JSON schema for `T` without the meta-schema header.
fn schema_of<T: JsonSchema>() -> serde_json::Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    let value = match value {
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn validate_range(start: &str, end: &str) -> Result<(), String> {
    let parse = |field: &str, s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("{field} must be a YYYY-MM-DD date, got '{s}'"))
    };
    let (start, end) = (parse("start_date", start)?, parse("end_date", end)?);
    if start > end {
        return Err("start_date is after end_date".to_string());
    }
    Ok(())
}

/// The capabilities exposed to one assistant variant.
pub struct CapabilityTable {
    specs: Vec<&'static CapabilitySpec>,
}

impl CapabilityTable {
    /// The memoryless variant exposes only the domain capabilities.
    pub fn for_variant(variant: AssistantVariant) -> Self {
        let specs = CAPABILITIES
            .iter()
            .filter(|spec| {
                variant == AssistantVariant::Memory || spec.kind == CapabilityKind::Domain
            })
            .collect();
        Self { specs }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.specs.iter().map(|s| s.schema()).collect()
    }

    /// Resolve a model-requested call to a typed invocation.
    pub fn resolve(&self, call: &ToolCall) -> Result<CapabilityCall, CapabilityError> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == call.name)
            .ok_or_else(|| CapabilityError::Unknown(call.name.clone()))?;

        (spec.decode)(call.arguments.clone()).map_err(|reason| CapabilityError::InvalidArguments {
            name: call.name.clone(),
            reason,
        })
    }
}
