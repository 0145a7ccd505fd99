//! JSON audit artifacts written next to a migration run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::rewrite::FlaggedReference;
use crate::urlmap::UrlMap;

pub const URL_MAP_FILE: &str = "urlMap.json";
pub const BROKEN_LINKS_FILE: &str = "checkURLs.json";
pub const MARKED_FILE: &str = "Marked.json";

/// One row of a review list. `Counter` is 1-based in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewEntry {
    #[serde(rename = "Counter")]
    pub counter: usize,
    #[serde(rename = "DocumentID")]
    pub document_id: String,
    #[serde(rename = "ConfluenceURL")]
    pub confluence_url: String,
    #[serde(rename = "OutlineURL")]
    pub outline_url: String,
}

pub fn number_review_entries(flagged: &[FlaggedReference]) -> Vec<ReviewEntry> {
    flagged
        .iter()
        .enumerate()
        .map(|(index, item)| ReviewEntry {
            counter: index + 1,
            document_id: item.document_id.clone(),
            confluence_url: item.source_url.clone(),
            outline_url: item.destination_url.clone(),
        })
        .collect()
}

pub fn write_url_map(dir: &Path, map: &UrlMap) -> Result<PathBuf> {
    write_json(dir, URL_MAP_FILE, map.entries())
}

pub fn write_review_list(dir: &Path, file_name: &str, flagged: &[FlaggedReference]) -> Result<PathBuf> {
    write_json(dir, file_name, &number_review_entries(flagged))
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(file_name);
    let rendered = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {file_name}"))?;
    fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;
    use tempfile::tempdir;

    use super::{MARKED_FILE, write_review_list, write_url_map};
    use crate::rewrite::FlaggedReference;
    use crate::urlmap::{UrlMapBuilder, possible_source_urls};

    fn flagged(id: &str) -> FlaggedReference {
        FlaggedReference {
            document_id: id.to_string(),
            destination_url: format!("/doc/{id}"),
            source_url: format!("/pages/viewpage.action?pageId={id}"),
        }
    }

    #[test]
    fn review_list_numbers_entries_from_one() {
        let temp = tempdir().expect("tempdir");
        let path = write_review_list(temp.path(), MARKED_FILE, &[flagged("a"), flagged("b")])
            .expect("write");

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json");
        let rows = parsed.as_array().expect("array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Counter"], 1);
        assert_eq!(rows[1]["Counter"], 2);
        assert_eq!(rows[0]["DocumentID"], "a");
        assert_eq!(rows[0]["ConfluenceURL"], "/pages/viewpage.action?pageId=a");
        assert_eq!(rows[0]["OutlineURL"], "/doc/a");
    }

    #[test]
    fn empty_review_list_is_an_empty_array() {
        let temp = tempdir().expect("tempdir");
        let path = write_review_list(temp.path(), MARKED_FILE, &[]).expect("write");
        assert_eq!(fs::read_to_string(path).expect("read").trim(), "[]");
    }

    #[test]
    fn url_map_file_is_keyed_by_source_url() {
        let temp = tempdir().expect("tempdir");
        let builder = UrlMapBuilder::new();
        builder.record(
            &possible_source_urls("100", "Setup Guide", "TEAM"),
            "/doc/setup-guide-AbC123",
            "doc-100",
        );
        let path = write_url_map(&temp.path().join("out"), &builder.freeze()).expect("write");

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json");
        let entry = &parsed["/display/TEAM/Setup+Guide"];
        assert_eq!(entry["NewUrl"], "/doc/setup-guide-AbC123");
        assert_eq!(entry["DocId"], "doc-100");
        assert_eq!(parsed.as_object().expect("object").len(), 3);
    }
}
