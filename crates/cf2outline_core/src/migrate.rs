use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{MigrateConfig, confluence_web_host, outline_web_host};
use crate::confluence::{ConfluenceClient, ConfluenceClientConfig, SourceApi};
use crate::outline::{DestinationApi, OutlineClient, OutlineClientConfig};
use crate::report::{BROKEN_LINKS_FILE, MARKED_FILE, write_review_list, write_url_map};
use crate::rewrite::{LinkRewriter, ReviewPattern, RewriteHosts};
use crate::runtime::{ResolvedPaths, ensure_staging_dir};
use crate::urlmap::UrlMapBuilder;
use crate::walker::{TreeWalker, WalkTarget};

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub space_key: String,
    pub collection_id: String,
    /// Regex; documents whose rewritten body matches are listed for review.
    pub review_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub space_key: String,
    pub space_name: String,
    pub collection_id: String,
    pub collection_name: String,
    pub imported: usize,
    pub url_map_entries: usize,
    pub rewritten: usize,
    pub changed: usize,
    pub broken_links: usize,
    pub marked: usize,
    pub source_request_count: usize,
    pub destination_request_count: usize,
    pub url_map_path: PathBuf,
    pub broken_links_path: PathBuf,
    pub marked_path: PathBuf,
}

pub fn run_migration(
    paths: &ResolvedPaths,
    config: &MigrateConfig,
    options: &MigrateOptions,
) -> Result<MigrationReport> {
    let hosts = RewriteHosts {
        source: confluence_web_host(&config.require_confluence_base_url()?),
        destination: outline_web_host(&config.require_outline_base_url()?),
    };
    let mut source = ConfluenceClient::new(ConfluenceClientConfig::from_config(config)?)?;
    let mut destination = OutlineClient::new(OutlineClientConfig::from_config(config)?)?;
    run_migration_with_api(paths, options, &hosts, &mut source, &mut destination)
}

pub fn run_migration_with_api<S: SourceApi, D: DestinationApi>(
    paths: &ResolvedPaths,
    options: &MigrateOptions,
    hosts: &RewriteHosts,
    source: &mut S,
    destination: &mut D,
) -> Result<MigrationReport> {
    let space_key = options.space_key.trim();
    if space_key.is_empty() {
        bail!("migrate requires a non-empty Confluence space key");
    }
    let collection_id = options.collection_id.trim();
    if Uuid::parse_str(collection_id).is_err() {
        bail!("migrate requires an Outline collection UUID, got `{collection_id}`");
    }
    let review = options
        .review_pattern
        .as_deref()
        .filter(|pattern| !pattern.is_empty())
        .map(ReviewPattern::new)
        .transpose()?;

    let collection = destination
        .collection_info(collection_id)
        .with_context(|| format!("failed to resolve Outline collection {collection_id}"))?;
    let space = source
        .get_space(space_key)
        .with_context(|| format!("failed to resolve Confluence space {space_key}"))?;
    ensure_staging_dir(paths)?;

    info!(
        space_key,
        space_name = %space.name,
        collection_id,
        collection_name = %collection.name,
        "migrating Confluence pages to Outline collection"
    );

    let target = WalkTarget {
        space_key: space_key.to_string(),
        collection_id: collection_id.to_string(),
        staging_dir: paths.staging_dir.clone(),
    };
    let builder = UrlMapBuilder::new();
    let imported = {
        let mut walker = TreeWalker::new(source, destination, &builder, &target);
        walker.migrate_space()?;
        walker.into_imported()
    };
    let url_map = builder.freeze();
    let url_map_path = write_url_map(&paths.output_dir, &url_map)?;
    info!(
        documents = imported.len(),
        entries = url_map.len(),
        path = %url_map_path.display(),
        "page tree imported"
    );

    let outcome = LinkRewriter::new(destination, hosts.clone(), review.as_ref()).rewrite_all(&url_map)?;
    let broken_links_path =
        write_review_list(&paths.output_dir, BROKEN_LINKS_FILE, &outcome.broken_links)?;
    let marked_path = write_review_list(&paths.output_dir, MARKED_FILE, &outcome.marked)?;

    Ok(MigrationReport {
        space_key: space.key,
        space_name: space.name,
        collection_id: collection.id,
        collection_name: collection.name,
        imported: imported.len(),
        url_map_entries: url_map.len(),
        rewritten: outcome.rewritten,
        changed: outcome.changed,
        broken_links: outcome.broken_links.len(),
        marked: outcome.marked.len(),
        source_request_count: source.request_count(),
        destination_request_count: destination.request_count(),
        url_map_path,
        broken_links_path,
        marked_path,
    })
}
