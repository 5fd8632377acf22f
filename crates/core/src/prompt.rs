//! Prompt Templates
//!
//! Formats raw user input into the instructional strings sent to the hosted
//! models. Templates ship with built-in defaults and can be overridden by
//! markdown files in a prompts directory (`therapist.md`,
//! `health_insights.md`).

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, info};

pub const THERAPIST_PROMPT_KEY: &str = "therapist";
pub const INSIGHTS_PROMPT_KEY: &str = "health_insights";

pub const DEFAULT_THERAPIST_TEMPLATE: &str = "You are a caring therapist. Based on {user_query}, give a supportive, unique response that acknowledges the user's feelings and offers specific, actionable advice. Keep it under 200 words, avoiding generic statements.";

pub const DEFAULT_INSIGHTS_TEMPLATE: &str = r#"Analyze the following health data trends:
- Heart rate trend: {heart_rate_trend} (based on recent measurements and averages)
- Sleep trend: {sleep_trend} (considering recent nightly durations and patterns)

Generate a structured analysis in JSON format with the following fields:

1. 'summary': A brief overview of the observed trends in heart rate and sleep data.

2. 'health_implications': Detailed discussion on the potential impact of these trends on the user's physical and mental well-being, including:
   - How changes in heart rate may relate to factors such as physical activity, stress levels, or cardiovascular health.
   - How variations in sleep patterns could affect energy levels, cognitive function, and emotional health.

3. 'recommendations': Specific, actionable advice tailored to the identified trends, focusing on achievable lifestyle adjustments. Include suggestions such as:
   - Relaxation techniques to manage stress.
   - Modifications to sleep hygiene practices.
   - Appropriate levels of physical activity.

4. 'risk_assessment': Evaluation of any potential health risks associated with the observed trends, categorized by severity (e.g., low, moderate, high).

5. 'data_quality': Assessment of the reliability of the provided data, noting any inconsistencies or areas requiring further monitoring.

6. 'additional_notes': Any other pertinent information or observations that could assist healthcare providers in understanding the user's health status.

Ensure the output is a valid JSON object with these fields, providing comprehensive insights to support therapeutic interventions."#;

/// Holds the prompt templates used by the service.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    therapist_template: String,
    insights_template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            therapist_template: DEFAULT_THERAPIST_TEMPLATE.to_string(),
            insights_template: DEFAULT_INSIGHTS_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(therapist_template: String, insights_template: String) -> Self {
        Self {
            therapist_template,
            insights_template,
        }
    }

    /// Loads templates from `prompts_path`, falling back to the built-in
    /// defaults for any template that has no file. A missing directory is not
    /// an error.
    pub fn load(prompts_path: &Path) -> Result<Self> {
        let mut prompts = if prompts_path.is_dir() {
            load_prompts(prompts_path)?
        } else {
            info!(path = %prompts_path.display(), "Prompts directory not found, using built-in templates");
            HashMap::new()
        };

        let mut builder = Self::default();
        if let Some(template) = prompts.remove(THERAPIST_PROMPT_KEY) {
            debug!("Using therapist template from prompts directory");
            builder.therapist_template = template;
        }
        if let Some(template) = prompts.remove(INSIGHTS_PROMPT_KEY) {
            debug!("Using health insights template from prompts directory");
            builder.insights_template = template;
        }
        Ok(builder)
    }

    /// Embeds the user's words in the therapist persona template.
    ///
    /// Input is included verbatim; empty and very long input are both accepted.
    pub fn therapist_prompt(&self, user_query: &str) -> String {
        self.therapist_template.replace("{user_query}", user_query)
    }

    /// Embeds the detected trends in the health insights template.
    pub fn insights_prompt(&self, heart_rate_trend: &str, sleep_trend: &str) -> String {
        self.insights_template
            .replace("{heart_rate_trend}", heart_rate_trend)
            .replace("{sleep_trend}", sleep_trend)
    }
}

/// Reads every `*.md` file in a directory, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content.trim_end().to_string());
        }
    }
    Ok(prompts)
}
