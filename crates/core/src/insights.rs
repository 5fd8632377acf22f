//! Health Data Insights
//!
//! Reduces raw heart-rate and sleep samples to coarse trends and asks a chat
//! model for a structured JSON analysis of those trends.

use crate::{error::UpstreamError, llm_client::JsonCompletionClient, prompt::PromptBuilder};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tracing::info;

const SMOOTHING_WINDOW: usize = 3;

/// A single heart-rate measurement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartRateSample {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub bpm: f64,
}

/// A single sleep interval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SleepSample {
    #[serde(default)]
    pub stage: Option<String>,
    pub start: String,
    pub end: String,
}

/// Direction of a series over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Errors raised while analysing health data.
#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("Invalid health data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Trailing moving average: each point is the mean of itself and up to
/// `window - 1` preceding points.
pub fn smooth(data: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..data.len())
        .map(|i| {
            let slice = &data[i.saturating_sub(window - 1)..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Classifies a series. A non-decreasing series (including one with fewer
/// than two points) is increasing; otherwise a non-increasing series is
/// decreasing; anything else is stable.
pub fn detect_trend(data: &[f64]) -> Trend {
    if data.windows(2).all(|w| w[0] <= w[1]) {
        Trend::Increasing
    } else if data.windows(2).all(|w| w[0] >= w[1]) {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, InsightsError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| InsightsError::InvalidData(format!("unparseable timestamp '{raw}'")))
}

/// Duration of a sleep interval in hours.
pub fn sleep_duration_hours(sample: &SleepSample) -> Result<f64, InsightsError> {
    let start = parse_timestamp(&sample.start)?;
    let end = parse_timestamp(&sample.end)?;
    Ok((end - start).num_milliseconds() as f64 / 3_600_000.0)
}

/// Trends extracted from one batch of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTrends {
    pub heart_rate: Trend,
    pub sleep: Trend,
}

/// Computes the heart-rate and sleep trends. Both series must be non-empty.
pub fn compute_trends(
    heart_rate: &[HeartRateSample],
    sleep: &[SleepSample],
) -> Result<HealthTrends, InsightsError> {
    if heart_rate.is_empty() || sleep.is_empty() {
        return Err(InsightsError::InvalidData(
            "Both 'heart_rate' and 'sleep' data are required.".to_string(),
        ));
    }

    let bpm: Vec<f64> = heart_rate.iter().map(|s| s.bpm).collect();
    let durations = sleep
        .iter()
        .map(sleep_duration_hours)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HealthTrends {
        heart_rate: detect_trend(&smooth(&bpm, SMOOTHING_WINDOW)),
        sleep: detect_trend(&durations),
    })
}

/// Turns health samples into a model-generated insight object.
pub struct HealthInsightsService {
    prompts: Arc<PromptBuilder>,
    client: Arc<dyn JsonCompletionClient>,
}

impl HealthInsightsService {
    pub fn new(prompts: Arc<PromptBuilder>, client: Arc<dyn JsonCompletionClient>) -> Self {
        Self { prompts, client }
    }

    pub async fn analyze(
        &self,
        heart_rate: &[HeartRateSample],
        sleep: &[SleepSample],
    ) -> Result<Map<String, Value>, InsightsError> {
        let trends = compute_trends(heart_rate, sleep)?;
        info!(heart_rate = %trends.heart_rate, sleep = %trends.sleep, "Health trends computed");

        let prompt = self
            .prompts
            .insights_prompt(&trends.heart_rate.to_string(), &trends.sleep.to_string());
        Ok(self.client.complete_json(&prompt).await?)
    }
}
