use quarry_config::DataRequirementConfig;
use quarry_store::ExecutionResult;
use regex::{Regex, RegexBuilder};

/// A question topic a dataset can only answer with certain columns
#[derive(Debug, Clone)]
pub struct DataRequirement {
    pattern: Regex,
    columns: Vec<String>,
    instruction: Option<String>,
}

impl DataRequirement {
    pub fn compile(config: &DataRequirementConfig) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(&config.pattern).case_insensitive(true).build()?;

        Ok(Self {
            pattern,
            columns: config.columns.clone(),
            instruction: config.instruction.clone(),
        })
    }

    /// Whether `question` needs columns `dataset` does not have
    pub fn fires(&self, question: &str, dataset: &ExecutionResult) -> bool {
        self.pattern.is_match(question) && !self.columns.iter().any(|column| dataset.has_column(column))
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }
}
