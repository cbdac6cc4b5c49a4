//! Cross-link rewriting for issue and merge request references.
//!
//! Two passes run over the text in a fixed order: issue references (`#12`)
//! are resolved from the issue table, then merge request references (`!34`)
//! are replaced with a citation linking back to the source. A reference only
//! counts when the characters on both sides of it are absent or non-word;
//! those neighbours are inspected, never consumed, so `#1 !2` yields two
//! references and `#1#2` yields one.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::SourceClient;
use crate::error::Result;
use crate::mapper::EntityMapper;

static ISSUE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([0-9]+)").expect("Invalid regex"));

static MERGE_REQUEST_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!([0-9]+)").expect("Invalid regex"));

/// Kind of cross-link found in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Issue,
    MergeRequest,
}

impl ReferenceKind {
    fn sigil(self) -> char {
        match self {
            Self::Issue => '#',
            Self::MergeRequest => '!',
        }
    }
}

/// A reference that could not be resolved at rewrite time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub kind: ReferenceKind,
    pub number: u64,
}

impl std::fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.number)
    }
}

/// Rewritten text plus the references left unresolved in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    pub unresolved: Vec<UnresolvedReference>,
}

/// What a rewrite needs to know about the run.
pub struct RewriteContext<'a, S: ?Sized> {
    pub source: &'a S,
    pub project: &'a str,
    /// Web URL of the source project, used when a merge request is unknown.
    pub project_url: &'a str,
    pub mapper: &'a EntityMapper,
}

#[derive(Debug)]
struct Reference {
    range: Range<usize>,
    number: u64,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn find_references(text: &str, pattern: &Regex) -> Vec<Reference> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let before = text[..whole.start()].chars().next_back();
            let after = text[whole.end()..].chars().next();
            if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
                return None;
            }
            // Numbers too large for u64 cannot name anything.
            let number = caps[1].parse().ok()?;
            Some(Reference {
                range: whole.range(),
                number,
            })
        })
        .collect()
}

fn splice<F>(text: &str, references: &[Reference], mut replacement: F) -> String
where
    F: FnMut(&Reference) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for reference in references {
        out.push_str(&text[cursor..reference.range.start]);
        out.push_str(&replacement(reference));
        cursor = reference.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

const UNRESOLVED_MARKER: &str = "_(unresolved reference)_";

/// Inline marker for an issue reference with no destination yet. The code
/// span keeps the destination from autolinking it to an unrelated issue.
fn advisory(kind: ReferenceKind, number: u64) -> String {
    format!("`{}{number}` {UNRESOLVED_MARKER}", kind.sigil())
}

/// Rewrites cross-links, caching merge request lookups for the whole run.
#[derive(Debug)]
pub struct CrossLinkRewriter {
    source_name: String,
    merge_requests: HashMap<u64, Option<String>>,
}

impl CrossLinkRewriter {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            merge_requests: HashMap::new(),
        }
    }

    /// Run both passes over `text`.
    pub async fn rewrite<S>(&mut self, text: &str, context: &RewriteContext<'_, S>) -> Result<Rewritten>
    where
        S: SourceClient + ?Sized,
    {
        let mut unresolved = Vec::new();
        let text = rewrite_issue_references(text, context.mapper, &mut unresolved);
        let text = self
            .rewrite_merge_request_references(&text, context, &mut unresolved)
            .await?;
        Ok(Rewritten { text, unresolved })
    }

    async fn rewrite_merge_request_references<S>(
        &mut self,
        text: &str,
        context: &RewriteContext<'_, S>,
        unresolved: &mut Vec<UnresolvedReference>,
    ) -> Result<String>
    where
        S: SourceClient + ?Sized,
    {
        let references = find_references(text, &MERGE_REQUEST_REFERENCE);
        if references.is_empty() {
            return Ok(text.to_string());
        }

        for reference in &references {
            if !self.merge_requests.contains_key(&reference.number) {
                let found = context
                    .source
                    .get_merge_request(context.project, reference.number)
                    .await?;
                debug!(iid = reference.number, found = found.is_some(), "Looked up merge request");
                self.merge_requests
                    .insert(reference.number, found.map(|mr| mr.web_url));
            }
        }

        let project_url = context.project_url.trim_end_matches('/');
        Ok(splice(text, &references, |reference| {
            let citation = |url: &str| format!("[{}:!{}]({url})", self.source_name, reference.number);
            match self.merge_requests.get(&reference.number) {
                Some(Some(url)) => citation(url),
                _ => {
                    unresolved.push(UnresolvedReference {
                        kind: ReferenceKind::MergeRequest,
                        number: reference.number,
                    });
                    let guessed = format!("{project_url}/-/merge_requests/{}", reference.number);
                    format!("{} {UNRESOLVED_MARKER}", citation(&guessed))
                }
            }
        }))
    }
}

/// Replace `#<n>` with the destination number of source issue `n`.
///
/// Unknown issues are left as an inline advisory and reported.
pub fn rewrite_issue_references(
    text: &str,
    mapper: &EntityMapper,
    unresolved: &mut Vec<UnresolvedReference>,
) -> String {
    let references = find_references(text, &ISSUE_REFERENCE);
    splice(text, &references, |reference| {
        match mapper.resolve_issue(reference.number) {
            Some(destination) => format!("#{destination}"),
            None => {
                unresolved.push(UnresolvedReference {
                    kind: ReferenceKind::Issue,
                    number: reference.number,
                });
                advisory(ReferenceKind::Issue, reference.number)
            }
        }
    })
}
