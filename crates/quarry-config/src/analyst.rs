use std::path::PathBuf;

use serde::Deserialize;

/// Conversation protocol configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalystConfig {
    /// Completion calls allowed while waiting for a delimited query
    #[serde(default = "default_draft_attempts")]
    pub draft_attempts: u32,
    /// Store executions allowed for generated queries in one request
    #[serde(default = "default_execution_attempts")]
    pub execution_attempts: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Dataset rows shown to the backend as context
    #[serde(default = "default_context_rows")]
    pub context_rows: usize,
    /// Name the assistant uses for itself in canned replies
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// Replaces the built-in system instructions
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Static description of the store schema given to the backend
    #[serde(default)]
    pub schema_guide: Option<String>,
    /// Describe the schema from the live store instead of (or in addition to) `schema_guide`
    #[serde(default)]
    pub introspect_schema: bool,
    /// Path to the declared dataset catalog
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Token cost estimates per protocol phase
    #[serde(default)]
    pub estimates: PhaseEstimates,
    /// Questions that a declared dataset cannot answer without certain columns
    #[serde(default = "default_requirements")]
    pub requirements: Vec<DataRequirementConfig>,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            draft_attempts: default_draft_attempts(),
            execution_attempts: default_execution_attempts(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_rows: default_context_rows(),
            assistant_name: default_assistant_name(),
            system_prompt: None,
            schema_guide: None,
            introspect_schema: false,
            catalog: None,
            estimates: PhaseEstimates::default(),
            requirements: default_requirements(),
        }
    }
}

/// Estimated token cost reserved for each kind of completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseEstimates {
    #[serde(default = "default_dataset_narrative")]
    pub dataset_narrative: u64,
    #[serde(default = "default_draft")]
    pub draft: u64,
    #[serde(default = "default_unsafe_correction")]
    pub unsafe_correction: u64,
    #[serde(default = "default_execution_correction")]
    pub execution_correction: u64,
    #[serde(default = "default_narrative")]
    pub narrative: u64,
}

impl Default for PhaseEstimates {
    fn default() -> Self {
        Self {
            dataset_narrative: default_dataset_narrative(),
            draft: default_draft(),
            unsafe_correction: default_unsafe_correction(),
            execution_correction: default_execution_correction(),
            narrative: default_narrative(),
        }
    }
}

/// A data requirement rule
///
/// Fires when the question matches `pattern` and the dataset has none of
/// `columns`, marking the dataset insufficient for that question.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataRequirementConfig {
    /// Case-insensitive regex matched against the question
    pub pattern: String,
    /// Columns any one of which satisfies the requirement
    pub columns: Vec<String>,
    /// Extra instruction given to the backend when the rule fires
    #[serde(default)]
    pub instruction: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_draft_attempts() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_execution_attempts() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_temperature() -> f32 {
    0.2
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_tokens() -> u32 {
    1024
}

#[allow(clippy::missing_const_for_fn)]
fn default_context_rows() -> usize {
    25
}

fn default_assistant_name() -> String {
    "Quarry".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_dataset_narrative() -> u64 {
    2500
}

#[allow(clippy::missing_const_for_fn)]
fn default_draft() -> u64 {
    4000
}

#[allow(clippy::missing_const_for_fn)]
fn default_unsafe_correction() -> u64 {
    3500
}

#[allow(clippy::missing_const_for_fn)]
fn default_execution_correction() -> u64 {
    4000
}

#[allow(clippy::missing_const_for_fn)]
fn default_narrative() -> u64 {
    3000
}

fn default_requirements() -> Vec<DataRequirementConfig> {
    vec![DataRequirementConfig {
        pattern: r"\b(province|city|location|address|region|where)\b".to_string(),
        columns: vec![
            "province".to_string(),
            "city".to_string(),
            "delivery_address".to_string(),
            "location".to_string(),
        ],
        instruction: Some(
            "The provided dataset does not contain location data. Query customer addresses or order \
             delivery addresses directly to answer this question."
                .to_string(),
        ),
    }]
}
