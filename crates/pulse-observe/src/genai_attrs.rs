//! OpenTelemetry GenAI Semantic Convention attribute names.
//!
//! `pulse-core` does not depend on this crate, so its spans spell the same
//! names as literal field keys; these constants are the reference list.

// --- Request attributes ---

/// The provider serving the call (e.g., "openai_compat").
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";

/// The name of the operation being performed (e.g., "chat", "execute_tool").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The model ID requested.
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// Number of capability schemas offered to the model.
pub const GEN_AI_REQUEST_TOOLS: &str = "gen_ai.request.tools";

// --- Response attributes ---

pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

pub const GEN_AI_RESPONSE_ID: &str = "gen_ai.response.id";

// --- Tool attributes ---

pub const GEN_AI_TOOL_NAME: &str = "gen_ai.tool.name";

pub const GEN_AI_TOOL_CALL_ID: &str = "gen_ai.tool.call.id";

// --- Operation name values ---

/// One model completion.
pub const OP_CHAT: &str = "chat";

/// One capability invocation.
pub const OP_EXECUTE_TOOL: &str = "execute_tool";

/// A full orchestrator turn.
pub const OP_INVOKE_AGENT: &str = "invoke_agent";

/// Model-backed fact extraction after a turn.
pub const OP_EXTRACT_MEMORY: &str = "extract_memory";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_share_namespace() {
        for attr in [
            GEN_AI_SYSTEM,
            GEN_AI_OPERATION_NAME,
            GEN_AI_REQUEST_MODEL,
            GEN_AI_REQUEST_TEMPERATURE,
            GEN_AI_REQUEST_MAX_TOKENS,
            GEN_AI_REQUEST_TOOLS,
            GEN_AI_USAGE_INPUT_TOKENS,
            GEN_AI_USAGE_OUTPUT_TOKENS,
            GEN_AI_RESPONSE_ID,
            GEN_AI_TOOL_NAME,
            GEN_AI_TOOL_CALL_ID,
        ] {
            assert!(attr.starts_with("gen_ai."), "{attr}");
        }
    }
}
