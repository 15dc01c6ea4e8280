//! Provider selection by registry key.
//!
//! The key comes from configuration; unknown or missing keys select the
//! default backend. Construction fails fast with a configuration error
//! naming the first missing field.

use std::sync::Arc;

use super::bedrock_kb::BedrockKnowledgeBaseProvider;
use super::content::ContentStore;
use super::provider::EmbeddingProvider;
use super::s3_vectors::S3VectorsProvider;
use super::vectorize::VectorizeProvider;
use crate::aws::{resolve_credentials, AwsCredentials};
use crate::core::config::settings::{RagSettings, DEFAULT_PROVIDER};
use crate::core::errors::RagError;

const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Tenant identity and per-user overrides carried into provider construction.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub tenant_id: Option<String>,
    /// Encoded `accessKey::@@::secretKey` pair from the user's settings.
    pub aws_credentials: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            aws_credentials: None,
        }
    }

    pub fn with_aws_credentials(mut self, encoded: Option<String>) -> Self {
        self.aws_credentials = encoded;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }
}

type Constructor = fn(
    &RagSettings,
    &TenantContext,
    Arc<dyn ContentStore>,
) -> Result<Arc<dyn EmbeddingProvider>, RagError>;

const REGISTRY: &[(&str, Constructor)] = &[
    ("vectorize", build_vectorize),
    ("bedrock", build_bedrock_knowledge_base),
    ("bedrock-knowledge-base", build_bedrock_knowledge_base),
    ("s3vectors", build_s3_vectors),
    ("s3-vectors", build_s3_vectors),
];

fn lookup(name: &str) -> Option<Constructor> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, constructor)| *constructor)
}

/// Registry keys accepted by [`select_provider`].
pub fn provider_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.iter().map(|(key, _)| *key).collect();
    names.sort_unstable();
    names
}

/// Build the provider named `name`, falling back to the default backend.
pub fn select_provider(
    name: Option<&str>,
    settings: &RagSettings,
    tenant: &TenantContext,
    content: Arc<dyn ContentStore>,
) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    let requested = name
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| settings.provider.trim().to_ascii_lowercase());

    let constructor = match lookup(&requested) {
        Some(constructor) => constructor,
        None => {
            if !requested.is_empty() && requested != DEFAULT_PROVIDER {
                tracing::warn!(
                    "Unknown embedding provider '{}', using '{}'",
                    requested,
                    DEFAULT_PROVIDER
                );
            }
            build_vectorize as Constructor
        }
    };

    let provider = constructor(settings, tenant, content)?;
    tracing::info!(
        "Selected embedding provider '{}' for tenant {}",
        provider.name(),
        tenant.id().unwrap_or("-")
    );
    Ok(provider)
}

fn build_vectorize(
    settings: &RagSettings,
    _tenant: &TenantContext,
    content: Arc<dyn ContentStore>,
) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    let block = settings.vectorize.as_ref().ok_or_else(|| {
        RagError::Configuration("Missing required AI binding (vectorize.ai)".into())
    })?;
    Ok(Arc::new(VectorizeProvider::from_settings(block, content)?))
}

fn build_bedrock_knowledge_base(
    settings: &RagSettings,
    tenant: &TenantContext,
    content: Arc<dyn ContentStore>,
) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    let block = settings.bedrock_knowledge_base.clone().unwrap_or_default();
    let credentials = aws_credentials(settings, tenant).map_err(|_| {
        RagError::Configuration(
            "Missing required AWS credentials or knowledge base IDs: aws credentials".into(),
        )
    })?;
    let region = aws_region(block.region.as_deref(), settings);
    Ok(Arc::new(BedrockKnowledgeBaseProvider::from_settings(
        &block,
        credentials,
        &region,
        content,
    )?))
}

fn build_s3_vectors(
    settings: &RagSettings,
    tenant: &TenantContext,
    content: Arc<dyn ContentStore>,
) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    let block = settings.s3_vectors.as_ref().ok_or_else(|| {
        RagError::Configuration("Missing required S3 Vectors setting: s3_vectors".into())
    })?;
    let credentials = aws_credentials(settings, tenant)?;
    let region = aws_region(block.region.as_deref(), settings);
    Ok(Arc::new(S3VectorsProvider::from_settings(
        block,
        credentials,
        &region,
        content,
    )?))
}

fn aws_credentials(settings: &RagSettings, tenant: &TenantContext) -> Result<AwsCredentials, RagError> {
    let tenant_default = settings.aws.as_ref().and_then(AwsCredentials::from_settings);
    resolve_credentials(tenant.aws_credentials.as_deref(), tenant_default.as_ref())
}

fn aws_region(block_region: Option<&str>, settings: &RagSettings) -> String {
    block_region
        .or_else(|| settings.aws.as_ref().and_then(|aws| aws.region.as_deref()))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_AWS_REGION)
        .to_string()
}
