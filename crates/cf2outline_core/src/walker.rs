//! Depth-first, pre-order import of a Confluence page tree into Outline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::confluence::{PageNode, SourceApi};
use crate::outline::{DestinationApi, ImportRequest};
use crate::urlmap::{UrlMapBuilder, destination_url, possible_source_urls};

/// An Outline document created from one Confluence page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedDocument {
    pub id: String,
    pub url_id: String,
    pub title: String,
    pub url: String,
    /// `None` only for documents imported at the collection root.
    pub parent_id: Option<String>,
    pub source_page_id: String,
}

#[derive(Debug, Clone)]
pub struct WalkTarget {
    pub space_key: String,
    pub collection_id: String,
    pub staging_dir: PathBuf,
}

pub struct TreeWalker<'a, S, D> {
    source: &'a mut S,
    destination: &'a mut D,
    url_map: &'a UrlMapBuilder,
    target: &'a WalkTarget,
    imported: Vec<ImportedDocument>,
}

impl<'a, S: SourceApi, D: DestinationApi> TreeWalker<'a, S, D> {
    pub fn new(
        source: &'a mut S,
        destination: &'a mut D,
        url_map: &'a UrlMapBuilder,
        target: &'a WalkTarget,
    ) -> Self {
        Self {
            source,
            destination,
            url_map,
            target,
            imported: Vec::new(),
        }
    }

    /// Import every root page of the space, each as a collection root.
    pub fn migrate_space(&mut self) -> Result<Vec<ImportedDocument>> {
        let root_ids = self
            .source
            .get_root_page_ids(&self.target.space_key)
            .with_context(|| {
                format!("failed to list root pages of space {}", self.target.space_key)
            })?;
        info!(
            space_key = %self.target.space_key,
            root_pages = root_ids.len(),
            "migrating space"
        );

        let mut roots = Vec::with_capacity(root_ids.len());
        for page_id in &root_ids {
            let page = self.fetch_page(page_id)?;
            roots.push(self.migrate_subtree(&page, None)?);
        }
        Ok(roots)
    }

    /// Import `page`, then its children in source order under the new document.
    pub fn migrate_subtree(
        &mut self,
        page: &PageNode,
        parent_id: Option<&str>,
    ) -> Result<ImportedDocument> {
        let document = self.import_page(page, parent_id)?;

        if !page.child_ids.is_empty() {
            info!(
                page_id = %page.id,
                page_title = %page.title,
                child_pages = page.child_ids.len(),
                "migrating child pages"
            );
        }
        for child_id in &page.child_ids {
            let child = self.fetch_page(child_id)?;
            self.migrate_subtree(&child, Some(&document.id))?;
        }

        Ok(document)
    }

    /// Documents created so far, in import order.
    pub fn imported(&self) -> &[ImportedDocument] {
        &self.imported
    }

    pub fn into_imported(self) -> Vec<ImportedDocument> {
        self.imported
    }

    fn fetch_page(&mut self, page_id: &str) -> Result<PageNode> {
        self.source
            .get_page(page_id)
            .with_context(|| format!("failed to fetch page {page_id}"))
    }

    fn import_page(&mut self, page: &PageNode, parent_id: Option<&str>) -> Result<ImportedDocument> {
        let staged = self
            .source
            .export_page(&page.id, &self.target.staging_dir)
            .with_context(|| format!("failed to export page {} ({})", page.id, page.title))?;

        // An early return here drops `staged`, which removes the blob.
        let result = self
            .destination
            .import_document(&ImportRequest {
                staged: &staged,
                collection_id: &self.target.collection_id,
                parent_document_id: parent_id,
                title: &page.title,
            })
            .with_context(|| format!("failed to import page {} ({})", page.id, page.title))?;

        if let Err(error) = staged.remove() {
            warn!(page_id = %page.id, error = %format!("{error:#}"), "staged export not removed");
        }

        let url = destination_url(&result.title, &result.url_id);
        let spellings = possible_source_urls(&page.id, &page.title, &self.target.space_key);
        self.url_map.record(&spellings, &url, &result.id);

        info!(
            document_id = %result.id,
            document_title = %result.title,
            page_id = %page.id,
            "imported document"
        );

        let document = ImportedDocument {
            id: result.id,
            url_id: result.url_id,
            title: result.title,
            url,
            parent_id: parent_id.map(ToString::to_string),
            source_page_id: page.id.clone(),
        };
        self.imported.push(document.clone());
        Ok(document)
    }
}
