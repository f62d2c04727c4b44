use std::fmt::Write;
use std::path::Path;

use crate::models::{Finding, KnowledgeEntry};

pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Code cap for question-mode prompts.
pub const SIMPLE_PROMPT_CODE_CHARS: usize = 1000;

const DEFAULT_REQUEST: &str = "Review this code and explain the detected issues.";

/// Chat-template control tokens that must never reach the model verbatim.
const CONTROL_TOKENS: &[&str] = &["<|im_start|>", "<|im_end|>", "<|endoftext|>"];

/// Builds structured review prompts from findings and retrieved entries.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_code_chars: usize,
    max_findings: usize,
}

impl PromptBuilder {
    pub fn new(max_code_chars: usize, max_findings: usize) -> Self {
        Self {
            max_code_chars,
            max_findings,
        }
    }

    pub fn build(
        &self,
        query: Option<&str>,
        findings: &[Finding],
        entries: &[KnowledgeEntry],
        code: &str,
        file_label: &str,
    ) -> String {
        let mut prompt = String::new();
        let language = detect_language(file_label);

        prompt.push_str(&system_instruction(language));
        prompt.push_str(" Provide clear, educational, and actionable feedback.\n\n");

        let request = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_REQUEST);
        let _ = write!(prompt, "USER REQUEST:\n{}\n\n", sanitize_for_prompt(request));

        if !code.trim().is_empty() {
            let excerpt = truncate_code(&sanitize_for_prompt(code), self.max_code_chars);
            let _ = write!(
                prompt,
                "CODE BEING ANALYZED:\n```{language}\n{excerpt}\n```\n\n"
            );
        }

        if !findings.is_empty() {
            prompt.push_str("ISSUES DETECTED:\n");
            for (i, finding) in findings.iter().take(self.max_findings).enumerate() {
                let _ = writeln!(
                    prompt,
                    "{}. {}\n   Location: {}",
                    i + 1,
                    sanitize_for_prompt(&finding.issue),
                    sanitize_for_prompt(&finding.details)
                );
            }
            prompt.push('\n');
        }

        if !entries.is_empty() {
            prompt.push_str("RELEVANT BEST PRACTICES:\n");
            for entry in entries {
                let _ = writeln!(
                    prompt,
                    "- {} ({})\n  {}",
                    sanitize_for_prompt(&entry.title),
                    entry.kind,
                    sanitize_for_prompt(&entry.description)
                );
                if let Some(example) = entry.example.as_deref() {
                    let _ = writeln!(prompt, "  Example: {}", sanitize_for_prompt(example));
                }
            }
            prompt.push('\n');
        }

        prompt.push_str(
            "INSTRUCTIONS:\n\
             Provide a helpful response that:\n\
             1. Explains why the detected issues matter\n\
             2. References the best practices from the knowledge base\n\
             3. Suggests concrete improvements\n\
             4. Uses a friendly, educational tone\n",
        );
        prompt
    }

    /// Question-mode prompt: the user's question and a short code excerpt.
    pub fn build_simple(query: &str, code: &str, file_label: &str) -> String {
        let language = detect_language(file_label);
        format!(
            "{}\n\nUSER QUESTION:\n{}\n\nCODE:\n```{language}\n{}\n```\n\nProvide a clear, helpful answer.\n",
            system_instruction(language),
            sanitize_for_prompt(query.trim()),
            truncate_code(&sanitize_for_prompt(code), SIMPLE_PROMPT_CODE_CHARS)
        )
    }
}

fn system_instruction(language: &str) -> String {
    if language == "text" {
        "You are an expert code reviewer.".to_string()
    } else {
        format!("You are an expert {language} code reviewer.")
    }
}

/// Remove chat-template control tokens.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        if out.contains(token) {
            out = out.replace(token, "");
        }
    }
    out
}

/// Keep at most `max_chars` characters, appending the truncation marker when cut.
pub fn truncate_code(code: &str, max_chars: usize) -> String {
    match code.char_indices().nth(max_chars) {
        None => code.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &code[..byte_idx]),
    }
}

/// Code-fence language for a file name.
pub fn detect_language(file_label: &str) -> &'static str {
    let ext = Path::new(file_label)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "groovy" => "groovy",
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "c" => "c",
        "cpp" | "cc" | "h" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sql" => "sql",
        "xml" => "xml",
        _ => "text",
    }
}
