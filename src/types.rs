use serde::{Deserialize, Serialize};

/// Longest prompt the proxy accepts, counted in characters after trimming.
pub const MAX_PROMPT_CHARS: usize = 2000;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A `{role, content}` pair as it travels over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body the conversation controller posts to the proxy's `/chat`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Normalized payload forwarded to the inference server's `/generate`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpuMemory {
    pub allocated_gb: f64,
    pub reserved_gb: f64,
}

/// What the inference server answers to `/generate`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub tokens_generated: u64,
    #[serde(default)]
    pub inference_time_ms: f64,
    #[serde(default)]
    pub gpu_memory: Option<GpuMemory>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

/// Successful `/chat` response body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub code: String,
    pub tokens_generated: u64,
    pub inference_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory: Option<GpuMemory>,
}

impl From<GenerationResult> for ChatResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            success: true,
            code: result.code,
            tokens_generated: result.tokens_generated,
            inference_time_ms: result.inference_time_ms,
            gpu_memory: result.gpu_memory,
        }
    }
}

/// Failure body shared by every proxy route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
