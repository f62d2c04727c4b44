use std::path::Path;

use crate::models::{Finding, KnowledgeEntry};

/// Rendered in place of an absent optional field.
pub const MISSING_FIELD: &str = "N/A";

pub const DEFAULT_TEMPLATE: &str = "=== CODE REVIEW FEEDBACK ===
Issue Detected: {issue}
Location: {location}

Knowledge Base Guidance:
Title: {title}
Type: {type}
Description: {description}

Example/Suggestion: {example}

Reference: {reference}
=============================
";

/// Placeholder substitution over a fixed set of names.
///
/// Unknown `{name}` sequences are copied through untouched, and substituted
/// values are never rescanned, so entry text containing braces is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackTemplate {
    source: String,
}

impl Default for FeedbackTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl FeedbackTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Load a template file, falling back to the built-in one when the path is
    /// unset, unreadable or blank.
    pub fn from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(source) if !source.trim().is_empty() => Self::new(source),
            Ok(_) => {
                tracing::warn!("Template {} is empty, using built-in", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Template {} unreadable ({e}), using built-in", path.display());
                Self::default()
            }
        }
    }

    pub fn render(&self, finding: &Finding, entry: &KnowledgeEntry) -> String {
        let kind = entry.kind.to_string();
        let lookup = |name: &str| placeholder(name, finding, entry, &kind);

        let mut out = String::with_capacity(self.source.len() + 256);
        let mut rest = self.source.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}').and_then(|close| {
                lookup(&after[..close]).map(|value| (close, value))
            }) {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn placeholder<'a>(
    name: &str,
    finding: &'a Finding,
    entry: &'a KnowledgeEntry,
    kind: &'a str,
) -> Option<&'a str> {
    let value = match name {
        "issue" => finding.issue.as_str(),
        "location" => finding.details.as_str(),
        "title" => entry.title.as_str(),
        "type" => kind,
        "description" => entry.description.as_str(),
        "example" => optional(&entry.example),
        "reference" => optional(&entry.reference),
        _ => return None,
    };
    Some(value)
}

fn optional(field: &Option<String>) -> &str {
    match field.as_deref() {
        Some(s) if !s.trim().is_empty() => s,
        _ => MISSING_FIELD,
    }
}

/// Minimal report for a finding no knowledge entry matched.
pub fn basic_feedback(finding: &Finding, suggested_topics: &[String]) -> String {
    let mut out = format!(
        "=== CODE REVIEW FEEDBACK ===\n\
         Issue Detected: {}\n\
         Location: {}\n\
         Note: No specific guidance found in knowledge base.\n",
        finding.issue, finding.details
    );
    if !suggested_topics.is_empty() {
        out.push_str("Related topics in the knowledge base:\n");
        for topic in suggested_topics {
            out.push_str(&format!("  - {topic}\n"));
        }
    }
    out.push_str("=============================\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;

    fn finding() -> Finding {
        Finding::new("ReplaceVectorWithList", "Legacy.java:12 - Consider replacing Vector")
    }

    fn entry() -> KnowledgeEntry {
        KnowledgeEntry {
            title: "Prefer ArrayList over Vector".into(),
            kind: EntryKind::AntiPattern,
            description: "Vector synchronizes every call.".into(),
            example: Some("List<String> xs = new ArrayList<>();".into()),
            reference: None,
            tags: vec!["vector".into()],
        }
    }

    #[test]
    fn test_default_template_fills_every_field() {
        let text = FeedbackTemplate::default().render(&finding(), &entry());
        assert!(text.contains("Issue Detected: ReplaceVectorWithList"));
        assert!(text.contains("Location: Legacy.java:12 - Consider replacing Vector"));
        assert!(text.contains("Type: AntiPattern"));
        assert!(text.contains("Example/Suggestion: List<String> xs = new ArrayList<>();"));
        assert!(text.contains("Reference: N/A"));
        assert!(!text.contains("{"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = FeedbackTemplate::default();
        assert_eq!(
            template.render(&finding(), &entry()),
            template.render(&finding(), &entry())
        );
    }

    #[test]
    fn test_unknown_placeholders_and_stray_braces_survive() {
        let template = FeedbackTemplate::new("{issue} {unknown} {title");
        assert_eq!(
            template.render(&finding(), &entry()),
            "ReplaceVectorWithList {unknown} {title"
        );
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let mut e = entry();
        e.description = "literal {issue} text".into();
        let text = FeedbackTemplate::new("[{description}]").render(&finding(), &e);
        assert_eq!(text, "[literal {issue} text]");
    }

    #[test]
    fn test_blank_optional_field_renders_marker() {
        let mut e = entry();
        e.example = Some("  ".into());
        let text = FeedbackTemplate::new("{example}|{reference}").render(&finding(), &e);
        assert_eq!(text, "N/A|N/A");
    }

    #[test]
    fn test_missing_template_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert_eq!(FeedbackTemplate::from_path(Some(&missing)), FeedbackTemplate::default());
        assert_eq!(FeedbackTemplate::from_path(None), FeedbackTemplate::default());

        let custom = dir.path().join("custom.txt");
        std::fs::write(&custom, "{title}!").unwrap();
        let text = FeedbackTemplate::from_path(Some(&custom)).render(&finding(), &entry());
        assert_eq!(text, "Prefer ArrayList over Vector!");
    }

    #[test]
    fn test_basic_feedback_lists_topics() {
        let text = basic_feedback(&finding(), &["Alpha".into(), "Beta".into()]);
        assert!(text.contains("Note: No specific guidance found in knowledge base."));
        assert!(text.contains("  - Alpha\n  - Beta\n"));
    }

    #[test]
    fn test_basic_feedback_without_topics() {
        let text = basic_feedback(&Finding::new("UnknownRule123", "X.java:1"), &[]);
        assert!(text.contains("Issue Detected: UnknownRule123"));
        assert!(!text.contains("Related topics"));
    }
}
