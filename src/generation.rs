use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub const DEFAULT_MODEL: &str = "command-xlarge-nightly";
pub const DEFAULT_BASE_URL: &str = "https://api.cohere.ai";

const POST_MAX_TOKENS: u32 = 300;
const DESCRIPTION_MAX_TOKENS: u32 = 300;
const ENHANCE_MAX_TOKENS: u32 = 150;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    NotConfigured,
    #[error("text generation request failed: {0}")]
    Upstream(String),
    #[error("text generation returned no text")]
    Empty,
}

/// A single prompt handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Generator used when no API key is configured; every call fails.
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

pub struct CohereGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    generations: Vec<Generation>,
}

#[derive(Deserialize)]
struct Generation {
    text: String,
}

impl CohereGenerator {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build text generation client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/generate", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for CohereGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: &prompt.text,
                max_tokens: prompt.max_tokens,
            })
            .send()
            .await
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;

        let text = parsed
            .generations
            .into_iter()
            .next()
            .map(|generation| generation.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

/// Builds the generator once at startup from configuration.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.cohere_api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(Arc::new(CohereGenerator::new(
            &config.cohere_base_url,
            key.trim(),
            config.cohere_model.clone(),
            Duration::from_secs(config.generation_timeout_seconds),
        )?)),
        _ => Ok(Arc::new(UnconfiguredGenerator)),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobPostInput {
    pub title: String,
    pub description: String,
    pub qualifications: String,
    pub specifications: String,
    pub location: String,
    pub job_type: String,
    /// Accepted in any shape and never used in the prompt.
    #[serde(default)]
    pub posted_by: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDetailsInput {
    pub title: String,
    pub qualifications: String,
    pub experience: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDetails {
    pub description: String,
    pub specifications: String,
    pub qualifications: String,
    pub experience: String,
}

pub fn social_post_prompt(job: &JobPostInput) -> Prompt {
    Prompt {
        text: format!(
            "Create an engaging and professional social media post for a job opening with the \
             following details:\n\nTitle: {}\nSpecifications: {}\nLocation: {}\nType: {}\n\
             Description: {}\nQualifications: {}\n\nThe post should be catchy and encourage people \
             to apply. Respond with the post only and nothing else.",
            job.title,
            job.specifications,
            job.location,
            job.job_type,
            job.description,
            job.qualifications,
        ),
        max_tokens: POST_MAX_TOKENS,
    }
}

pub fn description_prompt(input: &JobDetailsInput) -> Prompt {
    Prompt {
        text: format!(
            "Generate a detailed job description for a job titled '{}' with this experience:\n{}\n\
             and these qualifications: {}. No headings, no qualifications and no labels; only the \
             job description as bullet points.",
            input.title, input.experience, input.qualifications,
        ),
        max_tokens: DESCRIPTION_MAX_TOKENS,
    }
}

pub fn specifications_prompt(input: &JobDetailsInput) -> Prompt {
    Prompt {
        text: format!(
            "Generate detailed job specifications for a job titled '{}'. No headings, no \
             qualifications and no labels; only the job specifications as bullet points.",
            input.title,
        ),
        max_tokens: DESCRIPTION_MAX_TOKENS,
    }
}

pub fn qualifications_prompt(input: &JobDetailsInput) -> Prompt {
    Prompt {
        text: format!(
            "Rewrite the following qualifications in a professional way: '{}'. No headings or \
             labels; only the qualifications.",
            input.qualifications,
        ),
        max_tokens: ENHANCE_MAX_TOKENS,
    }
}

pub fn experience_prompt(input: &JobDetailsInput) -> Prompt {
    Prompt {
        text: format!(
            "Rewrite the following experience in a professional way: '{}'. No headings or labels; \
             only the experience.",
            input.experience,
        ),
        max_tokens: ENHANCE_MAX_TOKENS,
    }
}

pub async fn generate_post(
    generator: &dyn TextGenerator,
    job: &JobPostInput,
) -> Result<String, GenerationError> {
    generator.generate(&social_post_prompt(job)).await
}

/// Each field comes from its own generation call; the first failure aborts the rest.
pub async fn generate_job_details(
    generator: &dyn TextGenerator,
    input: &JobDetailsInput,
) -> Result<JobDetails, GenerationError> {
    let description = generator.generate(&description_prompt(input)).await?;
    let specifications = generator.generate(&specifications_prompt(input)).await?;
    let qualifications = generator.generate(&qualifications_prompt(input)).await?;
    let experience = generator.generate(&experience_prompt(input)).await?;
    Ok(JobDetails {
        description,
        specifications,
        qualifications,
        experience,
    })
}
