use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod auth;
mod cli;
mod config;
mod contents;
mod eid;
mod errors;
mod lock;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::{Config, StorageKind};
use contents::{BackendCsv, BackendMemory, ContentCreate, ContentStore};
use eid::Eid;
use lock::{DataLock, Holder};
use semantic::{
    embeddings::{embed_checked, Embedder},
    Corpus, HashEmbedder, SearchService,
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Wire embedder, fixed corpus and content store from `config`.
pub fn build_service(config: &Config) -> anyhow::Result<SearchService> {
    let embedder = Arc::new(HashEmbedder::new(config.embedding_dim));

    let corpus = Corpus::embed_documents(
        embedder.as_ref(),
        config
            .corpus
            .iter()
            .map(|doc| (doc.id.clone(), doc.title.clone(), doc.body.clone())),
    )
    .context("failed to embed corpus")?;

    let store: Arc<dyn ContentStore> = match config.storage {
        StorageKind::Csv => Arc::new(
            BackendCsv::load(config.base_path(), embedder.model_id(), config.embedding_dim)
                .context("failed to load content store")?,
        ),
        StorageKind::Memory => Arc::new(BackendMemory::new(config.embedding_dim)),
    };

    Ok(SearchService::new(
        embedder,
        Arc::new(corpus),
        store,
        config.search_mode,
    )?)
}

/// Shared daemon state. Fails when no JWT secret is set and `auth.disabled` is off.
pub fn daemon_state(config: &Config) -> anyhow::Result<Arc<web::SharedState>> {
    let verifier = config.auth.verifier()?;
    let service = build_service(config)?;

    Ok(web::SharedState::new(
        Arc::new(service),
        verifier,
        config.default_top_k,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let config = Config::load_with(&config::base_path()?)?;

    match args.command {
        cli::Command::Daemon {} => {
            let _lock = DataLock::acquire(config.base_path(), Holder::Daemon)
                .context("failed to lock data directory")?;

            let state = daemon_state(&config)?;

            web::start_daemon(state, &config.listen_addr)
        }

        cli::Command::Analyze { text, embedding } => {
            let embedder = HashEmbedder::new(config.embedding_dim);
            let analysis = if embedding {
                semantic::analyze(&text, Some(&embedder))
            } else {
                semantic::analyze(&text, None)
            };
            print_json(&analysis)
        }

        cli::Command::Embed { text } => {
            let embedder = HashEmbedder::new(config.embedding_dim);
            let embedding = embed_checked(&embedder, &semantic::normalize(&text))?;
            print_json(&web::EmbedResponse {
                dimensions: embedding.len(),
                embedding,
            })
        }

        cli::Command::Add { body, title } => {
            errors::validate_body_not_empty(&body)?;

            let _lock = DataLock::acquire(config.base_path(), Holder::Cli)
                .context("failed to lock data directory")?;

            let service = build_service(&config)?;
            let content = service.create_content(ContentCreate {
                title,
                body: body.trim().to_string(),
            })?;
            print_json(&content)
        }

        cli::Command::Get { id } => {
            let service = build_service(&config)?;
            match service.store().get(&Eid::from(id.as_str()))? {
                Some(content) => print_json(&content.without_embedding()),
                None => bail!("content not found: {id}"),
            }
        }

        cli::Command::List {} => {
            let service = build_service(&config)?;
            print_json(&service.store().list()?)
        }

        cli::Command::Search { query, top_k, mode } => {
            let service = build_service(&config)?;
            let mode = mode.unwrap_or(service.mode());
            let top_k = top_k.unwrap_or(config.default_top_k);

            print_json(&service.search_with_mode(&query, top_k, mode)?)
        }
    }
}
