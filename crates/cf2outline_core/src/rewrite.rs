//! Second pass: point Markdown link targets at the migrated documents and
//! flag documents that need a human look.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::outline::{DestinationApi, DocumentUpdate};
use crate::urlmap::UrlMap;

/// Absolute URL prefixes for links written with a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteHosts {
    /// Confluence base URL without trailing slash.
    pub source: String,
    /// Outline web host, i.e. the API URL without `/api`.
    pub destination: String,
}

/// A document queued for manual review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedReference {
    pub document_id: String,
    pub destination_url: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub broken_links: Vec<FlaggedReference>,
    pub marked: Vec<FlaggedReference>,
    pub rewritten: usize,
    pub changed: usize,
}

/// Pattern whose presence in a rewritten body marks it for review.
#[derive(Debug, Clone)]
pub struct ReviewPattern {
    regex: Regex,
}

impl ReviewPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex =
            Regex::new(pattern).with_context(|| format!("invalid review pattern: {pattern}"))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, body: &str) -> bool {
        self.regex.is_match(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSubstitution {
    pub from: String,
    pub to: String,
}

impl LinkSubstitution {
    /// Relative and host-qualified substitutions for every map entry.
    pub fn for_map(map: &UrlMap, hosts: &RewriteHosts) -> Vec<Self> {
        let mut out = Vec::with_capacity(map.len() * 2);
        for (source_url, entry) in map.entries() {
            out.push(Self {
                from: source_url.clone(),
                to: entry.destination_url.clone(),
            });
            out.push(Self {
                from: format!("{}{}", hosts.source, source_url),
                to: format!("{}{}", hosts.destination, entry.destination_url),
            });
        }
        out
    }
}

/// Replace every `(source_url)` link target with `(destination_url)`.
pub fn replace_link_target(body: &str, source_url: &str, destination_url: &str) -> String {
    body.replace(&format!("({source_url})"), &format!("({destination_url})"))
}

/// Apply all substitutions in one left-to-right scan. Text produced by a
/// substitution is never scanned again, so `A → B` followed by `B → C` does
/// not turn `(A)` into `(C)`.
pub fn rewrite_links(body: &str, substitutions: &[LinkSubstitution]) -> String {
    let mut ordered: Vec<&LinkSubstitution> = substitutions.iter().collect();
    ordered.sort_by(|left, right| right.from.len().cmp(&left.from.len()));

    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find('(') {
        out.push_str(&rest[..open]);
        out.push('(');
        let target = &rest[open + 1..];
        let matched = ordered.iter().find(|substitution| {
            target
                .strip_prefix(substitution.from.as_str())
                .is_some_and(|tail| tail.starts_with(')'))
        });
        match matched {
            Some(substitution) => {
                out.push_str(&substitution.to);
                out.push(')');
                rest = &target[substitution.from.len() + 1..];
            }
            None => rest = target,
        }
    }
    out.push_str(rest);
    out
}

/// `](<url>)[` markers for every known destination URL, relative and absolute.
///
/// The marker means two source links sat directly next to each other and now
/// read as one malformed link.
pub fn collapsed_link_markers(map: &UrlMap, hosts: &RewriteHosts) -> Vec<String> {
    let mut urls = BTreeSet::new();
    for document in map.documents() {
        urls.insert(document.destination_url.clone());
        urls.insert(format!("{}{}", hosts.destination, document.destination_url));
    }
    urls.into_iter().map(|url| format!("]({url})[")).collect()
}

pub fn has_collapsed_link(body: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| body.contains(marker.as_str()))
}

pub struct LinkRewriter<'a, D> {
    destination: &'a mut D,
    hosts: RewriteHosts,
    review: Option<&'a ReviewPattern>,
}

impl<'a, D: DestinationApi> LinkRewriter<'a, D> {
    pub fn new(destination: &'a mut D, hosts: RewriteHosts, review: Option<&'a ReviewPattern>) -> Self {
        Self {
            destination,
            hosts,
            review,
        }
    }

    /// Rewrite every migrated document once, in import order.
    pub fn rewrite_all(&mut self, map: &UrlMap) -> Result<RewriteOutcome> {
        let substitutions = LinkSubstitution::for_map(map, &self.hosts);
        let markers = collapsed_link_markers(map, &self.hosts);
        let mut outcome = RewriteOutcome::default();

        for document in map.documents() {
            let content = self
                .destination
                .document_info(&document.document_id)
                .with_context(|| format!("failed to fetch document {}", document.document_id))?;
            let body = rewrite_links(&content.text, &substitutions);

            let flagged = FlaggedReference {
                document_id: document.document_id.clone(),
                destination_url: document.destination_url.clone(),
                source_url: document.source_urls.first().cloned().unwrap_or_default(),
            };
            if has_collapsed_link(&body, &markers) {
                warn!(
                    document_id = %document.document_id,
                    url = %document.destination_url,
                    "document has adjacent links that look broken"
                );
                outcome.broken_links.push(flagged.clone());
            }
            if let Some(review) = self.review
                && review.is_match(&body)
            {
                info!(
                    document_id = %document.document_id,
                    pattern = review.as_str(),
                    "document matches review pattern"
                );
                outcome.marked.push(flagged);
            }

            if body != content.text {
                outcome.changed += 1;
            }
            self.destination
                .update_document(&DocumentUpdate::full_replace(
                    &document.document_id,
                    &content.title,
                    &body,
                ))
                .with_context(|| format!("failed to update document {}", document.document_id))?;
            outcome.rewritten += 1;
            info!(document_id = %document.document_id, title = %content.title, "rewrote links");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        LinkRewriter, LinkSubstitution, ReviewPattern, RewriteHosts, collapsed_link_markers,
        has_collapsed_link, replace_link_target, rewrite_links,
    };
    use crate::outline::DocumentContent;
    use crate::urlmap::{UrlMap, UrlMapBuilder, possible_source_urls};
    use crate::walker::tests::MockDestination;

    fn hosts() -> RewriteHosts {
        RewriteHosts {
            source: "https://confluence.example.org".to_string(),
            destination: "https://outline.example.org".to_string(),
        }
    }

    fn team_map() -> UrlMap {
        let builder = UrlMapBuilder::new();
        builder.record(
            &possible_source_urls("100", "Setup Guide", "TEAM"),
            "/doc/setup-guide-AbC123",
            "doc-100",
        );
        builder.record(
            &possible_source_urls("101", "Install: Windows", "TEAM"),
            "/doc/install-windows-XyZ789",
            "doc-101",
        );
        builder.freeze()
    }

    fn destination_with(bodies: &[(&str, &str, &str)]) -> MockDestination {
        let mut destination = MockDestination::default();
        for (id, title, text) in bodies {
            destination.documents.insert(
                (*id).to_string(),
                DocumentContent {
                    id: (*id).to_string(),
                    title: (*title).to_string(),
                    text: (*text).to_string(),
                },
            );
        }
        destination
    }

    #[test]
    fn replace_link_target_only_touches_parenthesized_targets() {
        let body = "see /pages/viewpage.action?pageId=100 or [x](/pages/viewpage.action?pageId=100)";
        let out = replace_link_target(body, "/pages/viewpage.action?pageId=100", "/doc/a-1");
        assert_eq!(out, "see /pages/viewpage.action?pageId=100 or [x](/doc/a-1)");
    }

    #[test]
    fn rewrite_links_handles_relative_and_absolute_forms() {
        let map = team_map();
        let substitutions = LinkSubstitution::for_map(&map, &hosts());
        let body = "[See setup](/pages/viewpage.action?pageId=100) and \
                    [win](https://confluence.example.org/display/TEAM/Install%3A+Windows)";
        let out = rewrite_links(body, &substitutions);
        assert_eq!(
            out,
            "[See setup](/doc/setup-guide-AbC123) and \
             [win](https://outline.example.org/doc/install-windows-XyZ789)"
        );
    }

    #[test]
    fn rewrite_links_never_rewrites_its_own_output() {
        let substitutions = vec![
            LinkSubstitution {
                from: "/a".to_string(),
                to: "/b".to_string(),
            },
            LinkSubstitution {
                from: "/b".to_string(),
                to: "/c".to_string(),
            },
        ];
        assert_eq!(rewrite_links("[x](/a) [y](/b)", &substitutions), "[x](/b) [y](/c)");
    }

    #[test]
    fn rewrite_links_is_idempotent_on_rewritten_body() {
        let map = team_map();
        let substitutions = LinkSubstitution::for_map(&map, &hosts());
        let once = rewrite_links("[s](/display/TEAM/Setup+Guide) (plain text)", &substitutions);
        let twice = rewrite_links(&once, &substitutions);
        assert_eq!(once, "[s](/doc/setup-guide-AbC123) (plain text)");
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_links_matches_titles_containing_parentheses() {
        let substitutions = vec![LinkSubstitution {
            from: "/display/TEAM/Notes+(old)".to_string(),
            to: "/doc/notes-old-1".to_string(),
        }];
        assert_eq!(
            rewrite_links("[n](/display/TEAM/Notes+(old)) (", &substitutions),
            "[n](/doc/notes-old-1) ("
        );
    }

    #[test]
    fn collapsed_links_are_detected_for_relative_and_absolute_urls() {
        let map = team_map();
        let markers = collapsed_link_markers(&map, &hosts());
        assert!(has_collapsed_link("[a](/doc/setup-guide-AbC123)[b](/x)", &markers));
        assert!(has_collapsed_link(
            "[a](https://outline.example.org/doc/install-windows-XyZ789)[b]",
            &markers
        ));
        assert!(!has_collapsed_link("[a](/doc/setup-guide-AbC123) [b](/x)", &markers));
    }

    #[test]
    fn rewrite_all_updates_bodies_with_full_replace() {
        let map = team_map();
        let mut destination = destination_with(&[
            ("doc-100", "Setup Guide", "Intro"),
            (
                "doc-101",
                "Install: Windows",
                "[See setup](/pages/viewpage.action?pageId=100)",
            ),
        ]);

        let outcome = LinkRewriter::new(&mut destination, hosts(), None)
            .rewrite_all(&map)
            .expect("rewrite");

        assert_eq!(outcome.rewritten, 2);
        assert_eq!(outcome.changed, 1);
        assert!(outcome.broken_links.is_empty());
        assert_eq!(destination.updates.len(), 2);
        let update = destination
            .updates
            .iter()
            .find(|update| update.id == "doc-101")
            .expect("updated");
        assert_eq!(update.text, "[See setup](/doc/setup-guide-AbC123)");
        assert_eq!(update.title, "Install: Windows");
        assert!(update.publish && update.done && !update.append);
    }

    #[test]
    fn broken_link_is_flagged_once_per_document() {
        let map = team_map();
        let body = "[a](/pages/viewpage.action?pageId=101)[b](/x)\n\
                    [c](/doc/setup-guide-AbC123)[d](/y)";
        let mut destination = destination_with(&[
            ("doc-100", "Setup Guide", body),
            ("doc-101", "Install: Windows", "fine"),
        ]);

        let outcome = LinkRewriter::new(&mut destination, hosts(), None)
            .rewrite_all(&map)
            .expect("rewrite");

        assert_eq!(outcome.broken_links.len(), 1);
        let flagged = &outcome.broken_links[0];
        assert_eq!(flagged.document_id, "doc-100");
        assert_eq!(flagged.destination_url, "/doc/setup-guide-AbC123");
        assert_eq!(flagged.source_url, "/pages/viewpage.action?pageId=100");
    }

    #[test]
    fn review_pattern_marks_matching_documents() {
        let map = team_map();
        let mut destination = destination_with(&[
            ("doc-100", "Setup Guide", "DRAFT: DRAFT everywhere"),
            ("doc-101", "Install: Windows", "final"),
        ]);
        let review = ReviewPattern::new("DRAFT").expect("pattern");

        let outcome = LinkRewriter::new(&mut destination, hosts(), Some(&review))
            .rewrite_all(&map)
            .expect("rewrite");

        assert_eq!(outcome.marked.len(), 1);
        assert_eq!(outcome.marked[0].document_id, "doc-100");
    }

    #[test]
    fn invalid_review_pattern_is_rejected() {
        let error = ReviewPattern::new("([unclosed").expect_err("must fail");
        assert!(error.to_string().contains("invalid review pattern"));
    }

    #[test]
    fn marked_document_without_map_keys_still_names_its_source_url() {
        let builder = UrlMapBuilder::new();
        let urls = possible_source_urls("7", "Home", "TEAM");
        builder.record(&urls, "/doc/home-AbC123", "doc-1");
        builder.record(&urls, "/doc/home-XyZ789", "doc-2");
        let map = builder.freeze();
        let mut destination = destination_with(&[
            ("doc-1", "Home", "final"),
            ("doc-2", "Home", "DRAFT"),
        ]);
        let review = ReviewPattern::new("DRAFT").expect("pattern");

        let outcome = LinkRewriter::new(&mut destination, hosts(), Some(&review))
            .rewrite_all(&map)
            .expect("rewrite");

        assert_eq!(outcome.marked.len(), 1);
        assert_eq!(outcome.marked[0].document_id, "doc-2");
        assert_eq!(outcome.marked[0].source_url, "/pages/viewpage.action?pageId=7");
    }

    #[test]
    fn update_failure_aborts_with_document_id() {
        let map = team_map();
        let mut destination = destination_with(&[
            ("doc-100", "Setup Guide", "a"),
            ("doc-101", "Install: Windows", "b"),
        ]);
        destination.fail_update_id = Some("doc-100".to_string());

        let error = LinkRewriter::new(&mut destination, hosts(), None)
            .rewrite_all(&map)
            .expect_err("must fail");
        assert!(format!("{error:#}").contains("failed to update document doc-100"));
        assert!(destination.updates.is_empty());
    }

    #[test]
    fn missing_document_aborts_with_document_id() {
        let map = team_map();
        let mut destination = destination_with(&[("doc-100", "Setup Guide", "a")]);

        let error = LinkRewriter::new(&mut destination, hosts(), None)
            .rewrite_all(&map)
            .expect_err("must fail");
        assert!(format!("{error:#}").contains("failed to fetch document doc-101"));
    }
}
