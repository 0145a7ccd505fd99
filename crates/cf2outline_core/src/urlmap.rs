//! Source URL spellings and the source → destination URL map.
//!
//! The map is filled while the page tree is imported and read while links are
//! rewritten. [`UrlMapBuilder`] accepts concurrent inserts behind a lock;
//! [`UrlMapBuilder::freeze`] consumes it and yields the read-only [`UrlMap`],
//! so no rewrite can observe a map that is still growing.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Mutex, PoisonError};

use deunicode::deunicode;
use serde::Serialize;
use tracing::warn;

/// Destination of one source URL spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlMapEntry {
    #[serde(rename = "NewUrl")]
    pub destination_url: String,
    #[serde(rename = "DocId")]
    pub document_id: String,
}

/// One migrated document and the distinct spellings of its source page.
///
/// `source_urls` holds every spelling recorded for the document, including
/// ones an earlier document already claimed in the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedDocument {
    pub document_id: String,
    pub destination_url: String,
    pub source_urls: Vec<String>,
}

/// Every relative URL under which Confluence may have linked to a page.
///
/// Confluence has written title links both with `%20` and with `+` for spaces;
/// colons are always escaped.
pub fn possible_source_urls(page_id: &str, title: &str, space_key: &str) -> Vec<String> {
    let colon_escaped = title.replace(':', "%3A");
    let percent_spaces = colon_escaped.replace(' ', "%20");
    let plus_spaces = colon_escaped.replace(' ', "+");
    vec![
        format!("/pages/viewpage.action?pageId={page_id}"),
        format!("/display/{space_key}/{percent_spaces}"),
        format!("/display/{space_key}/{plus_spaces}"),
    ]
}

/// Relative Outline URL of an imported document.
pub fn destination_url(title: &str, url_id: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("/doc/untitled-{url_id}")
    } else {
        format!("/doc/{slug}-{url_id}")
    }
}

/// Lowercase ASCII slug. The title is transliterated to ASCII first and `&`
/// reads as `and`; runs of anything else that is not a letter or digit become
/// one hyphen.
pub fn slugify(title: &str) -> String {
    let ascii = deunicode(&title.replace('&', " and "));
    let mut out = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[derive(Debug, Default)]
struct MapState {
    entries: BTreeMap<String, UrlMapEntry>,
    documents: Vec<MappedDocument>,
}

#[derive(Debug, Default)]
pub struct UrlMapBuilder {
    state: Mutex<MapState>,
}

impl UrlMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map each spelling to the document. A spelling that is already mapped
    /// keeps its first destination. Returns the number of new entries.
    pub fn record(&self, source_urls: &[String], destination_url: &str, document_id: &str) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut inserted = 0;
        for source_url in source_urls {
            match state.entries.entry(source_url.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(UrlMapEntry {
                        destination_url: destination_url.to_string(),
                        document_id: document_id.to_string(),
                    });
                    inserted += 1;
                }
                Entry::Occupied(existing) => {
                    if existing.get().document_id != document_id {
                        warn!(
                            source_url = %source_url,
                            kept = %existing.get().document_id,
                            skipped = document_id,
                            "source URL already mapped to another document"
                        );
                    }
                }
            }
        }

        let index = match state
            .documents
            .iter()
            .position(|doc| doc.document_id == document_id)
        {
            Some(index) => index,
            None => {
                state.documents.push(MappedDocument {
                    document_id: document_id.to_string(),
                    destination_url: destination_url.to_string(),
                    source_urls: Vec::with_capacity(source_urls.len()),
                });
                state.documents.len() - 1
            }
        };
        let known = &mut state.documents[index].source_urls;
        for source_url in source_urls {
            if !known.contains(source_url) {
                known.push(source_url.clone());
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn freeze(self) -> UrlMap {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        UrlMap {
            entries: state.entries,
            documents: state.documents,
        }
    }
}

/// Read-only source → destination map for the rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMap {
    entries: BTreeMap<String, UrlMapEntry>,
    documents: Vec<MappedDocument>,
}

impl UrlMap {
    /// Entries sorted by source URL.
    pub fn entries(&self) -> &BTreeMap<String, UrlMapEntry> {
        &self.entries
    }

    /// Distinct destination documents in import order.
    pub fn documents(&self) -> &[MappedDocument] {
        &self.documents
    }

    pub fn lookup(&self, source_url: &str) -> Option<&UrlMapEntry> {
        self.entries.get(source_url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
