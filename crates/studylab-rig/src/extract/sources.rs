use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use studylab_core::types::{Citation, Source};

use super::TRACING_TARGET;
use crate::agent::AgentMessage;

static CITATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

/// Collects sources from retrieved documents and from the message metadata.
///
/// Documents in `context.retrieved_docs` come first, followed by the
/// entries of `response_metadata.sources`.
pub fn extract_sources(message: &AgentMessage, context: &Map<String, Value>) -> Vec<Source> {
    let mut sources: Vec<Source> = context
        .get("retrieved_docs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|doc| {
            let metadata = doc.get("metadata");
            source(
                metadata.and_then(|m| m.get("source")),
                metadata.and_then(|m| m.get("title")),
            )
        })
        .collect();

    if let AgentMessage::Ai(message) = message
        && let Some(listed) = message
            .response_metadata
            .get("sources")
            .and_then(Value::as_array)
    {
        sources.extend(listed.iter().filter(|s| s.is_object()).map(|entry| {
            source(
                entry.get("href").or_else(|| entry.get("url")),
                entry.get("title"),
            )
        }));
    }

    tracing::debug!(target: TRACING_TARGET, count = sources.len(), "extracted sources");
    sources
}

fn source(href: Option<&Value>, title: Option<&Value>) -> Source {
    Source {
        href: href.and_then(Value::as_str).unwrap_or("#").to_owned(),
        title: title
            .and_then(Value::as_str)
            .unwrap_or("Unknown Source")
            .to_owned(),
    }
}

/// Finds `[n]` citation markers, with their character offset in `content`.
pub fn extract_citations(content: &str) -> Vec<Citation> {
    let Some(pattern) = CITATION.as_ref() else {
        return Vec::new();
    };

    // Byte offset and character count of the last marker seen.
    let mut scanned = (0, 0);
    pattern
        .captures_iter(content)
        .filter_map(|captures| {
            let marker = captures.get(0)?;
            let (byte, chars) = scanned;
            let position = chars + content[byte..marker.start()].chars().count();
            scanned = (marker.start(), position);

            Some(Citation {
                index: captures.get(1)?.as_str().parse().ok()?,
                position,
                text: marker.as_str().to_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::AiMessage;

    #[test]
    fn context_documents_come_first() {
        let context = json!({
            "retrieved_docs": [
                {"metadata": {"source": "docs/intro.md", "title": "Intro"}},
                {"metadata": {}},
                {"page_content": "no metadata"}
            ]
        });
        let message: AgentMessage = AiMessage::new("m")
            .with_metadata("sources", json!([{"href": "https://b.example", "title": "B"}]))
            .into();

        let sources = extract_sources(&message, context.as_object().unwrap_or(&Map::new()));
        let hrefs: Vec<&str> = sources.iter().map(|s| s.href.as_str()).collect();
        assert_eq!(hrefs, ["docs/intro.md", "#", "#", "https://b.example"]);
        assert_eq!(sources[1].title, "Unknown Source");
        assert_eq!(sources[3].title, "B");
    }

    #[test]
    fn no_sources_without_context_or_metadata() {
        let message: AgentMessage = AiMessage::new("m").with_content("[1]").into();
        assert!(extract_sources(&message, &Map::new()).is_empty());
    }

    #[test]
    fn citations_report_character_positions() {
        let citations = extract_citations("根据研究[1]，以及 [12]。[x] 不算");
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].index, 1);
        assert_eq!(citations[0].position, 4);
        assert_eq!(citations[0].text, "[1]");
        assert_eq!(citations[1].index, 12);
        assert_eq!(citations[1].position, 11);
        assert_eq!(citations[1].text, "[12]");
    }

    #[test]
    fn ascii_positions_match_byte_offsets() {
        let citations = extract_citations("see [1] and [2]");
        let positions: Vec<_> = citations.iter().map(|c| c.position).collect();
        assert_eq!(positions, [4, 12]);
    }

    #[test]
    fn oversized_indices_are_skipped() {
        assert!(extract_citations("[99999999999999]").is_empty());
    }
}
