use std::env;
use std::sync::Arc;

use anyhow::Context;

use rag_orchestrator::core::config::{AppPaths, ConfigService};
use rag_orchestrator::llm::{ChatModel, OpenAiCompatibleModel};
use rag_orchestrator::logging;
use rag_orchestrator::rag::{
    select_provider, Augmenter, ContentStore, RagOptions, SqliteContentStore, TenantContext,
};

const USAGE: &str = "usage: rag-orchestrator <tenant-id> <query...>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let tenant_id = args.next().context(USAGE)?;
    let query = args.collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        anyhow::bail!(USAGE);
    }

    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let config = ConfigService::new(paths.clone());
    let settings = config
        .tenant_settings(Some(&tenant_id))
        .context("Failed to load RAG settings")?;

    let db_path = settings
        .content_store
        .as_ref()
        .and_then(|c| c.sqlite_path.clone())
        .unwrap_or_else(|| paths.content_db_path.clone());
    let content: Arc<dyn ContentStore> = Arc::new(
        SqliteContentStore::with_path(db_path.clone())
            .await
            .with_context(|| format!("Failed to open content store {}", db_path.display()))?,
    );

    let tenant = TenantContext::new(tenant_id.clone())
        .with_aws_credentials(config.user_aws_credentials(&tenant_id)?);
    let provider = select_provider(None, &settings, &tenant, content)
        .context("Failed to select embedding provider")?;

    let augmenter = match settings.auxiliary_model.as_ref() {
        Some(aux) => {
            let model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatibleModel::from_settings(aux)?);
            tracing::info!("Using auxiliary model '{}' for rerank and summaries", model.name());
            Augmenter::with_chat_model(settings.defaults.clone(), model)
        }
        None => {
            tracing::info!("No auxiliary model configured; rerank and summaries disabled");
            Augmenter::new(settings.defaults.clone())
        }
    };

    let fragment = augmenter
        .augment_prompt(provider.as_ref(), &query, &RagOptions::default(), Some(&tenant_id))
        .await;

    if fragment.is_empty() {
        tracing::info!("No relevant context for query");
    } else {
        println!("{}", fragment);
    }

    Ok(())
}
