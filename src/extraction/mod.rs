//! Structured-output recovery from free-form LLM responses.
//!
//! Models return the JSON they were asked for wrapped in anything from a LaTeX
//! `\boxed{...}` command to markdown code fences to paragraphs of surrounding
//! prose. This module normalizes those shapes back into parseable JSON and,
//! when no JSON survives, falls back to inferring a file set from fenced code
//! blocks by their content signatures.
//!
//! Nothing in here returns an error: malformed input degrades to an empty
//! result with the original text preserved by the caller for diagnostics.

use serde_json::Value;
use std::collections::BTreeMap;

/// Where an extracted file mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// Parsed from a JSON object carrying a `files` key.
    FilesKey,
    /// Inferred from fenced code blocks by content signature.
    InferredBlocks,
    /// The whole response was treated as a single source file.
    WholeText,
    /// Nothing extractable was found.
    None,
}

/// Result of recovering a filename-to-content mapping from model output.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    /// Extracted files, keyed by relative filename.
    pub files: BTreeMap<String, String>,
    /// How the mapping was recovered.
    pub source: ExtractionSource,
}

impl FileExtraction {
    fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
            source: ExtractionSource::None,
        }
    }

    /// Whether any files were recovered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A filename-inference rule: a block whose content contains any of the
/// markers is written to `filename`.
struct InferenceRule {
    markers: &'static [&'static str],
    filename: &'static str,
}

/// Content-signature rules, checked in order; first match wins. The
/// dependency-manifest check runs before these because pinned requirement
/// lists routinely name `httpx` or `pydantic` and would be misfiled.
const INFERENCE_RULES: &[InferenceRule] = &[
    InferenceRule {
        markers: &["@mcp.tool", "FastMCP", "mcp.run"],
        filename: "main.py",
    },
    InferenceRule {
        markers: &["BaseModel", "pydantic"],
        filename: "models.py",
    },
    InferenceRule {
        markers: &["httpx", "aiohttp", "requests."],
        filename: "api.py",
    },
    InferenceRule {
        markers: &["API_KEY", "SECRET", "_TOKEN"],
        filename: ".env.example",
    },
];

/// Normalize free-form model text down to its most likely JSON payload.
///
/// Candidate wrappers are checked in priority order:
///
/// 1. a `\boxed{...}` span: its interior is taken, preferring an embedded
///    JSON object over the bare interior;
/// 2. a fenced code block (```` ```json ```` or untagged): its interior;
/// 3. a balanced `{...}` span that parses as JSON (the largest such span,
///    which also strips any surrounding prose);
/// 4. otherwise the input is returned unchanged.
pub fn normalize_structured_text(text: &str) -> String {
    if let Some(interior) = extract_boxed_interior(text) {
        if let Some(span) = extract_largest_json_object(&interior) {
            return span;
        }
        return interior.trim().to_string();
    }

    if let Some(interior) = extract_fenced_interior(text) {
        let interior = interior.trim();
        // A fence may itself wrap prose around the object.
        if let Some(span) = extract_largest_json_object(interior) {
            return span;
        }
        return interior.to_string();
    }

    if let Some(span) = extract_largest_json_object(text) {
        return span;
    }

    text.to_string()
}

/// Normalize and parse model text as JSON.
///
/// Returns `None` when no parseable JSON can be recovered.
pub fn extract_json_value(text: &str) -> Option<Value> {
    serde_json::from_str(&normalize_structured_text(text)).ok()
}

/// Recover a filename-to-content mapping from model output.
///
/// First the normalized text is parsed as JSON and a `files` key is honored
/// in either of the shapes models produce: a list of `{name, content}` pairs
/// or an object map of filename to content. When that yields nothing, fenced
/// code blocks in the raw text are collected and named by the inference
/// rules; a fence header that names a file (e.g. ```` ```python main.py ````)
/// wins over signature matching. A response with no fences at all but
/// containing both an import and a function definition is kept whole as the
/// entry file.
pub fn extract_file_map(text: &str) -> FileExtraction {
    if let Some(value) = extract_json_value(text) {
        let files = files_from_value(&value);
        if !files.is_empty() {
            return FileExtraction {
                files,
                source: ExtractionSource::FilesKey,
            };
        }
    }

    let blocks = collect_fenced_blocks(text);
    if !blocks.is_empty() {
        let mut files = BTreeMap::new();
        for (index, block) in blocks.iter().enumerate() {
            let name = match &block.explicit_name {
                Some(name) => name.clone(),
                None => infer_filename(&block.content, index),
            };
            files.insert(name, block.content.clone());
        }
        return FileExtraction {
            files,
            source: ExtractionSource::InferredBlocks,
        };
    }

    if looks_like_bare_source(text) {
        let mut files = BTreeMap::new();
        files.insert("main.py".to_string(), text.to_string());
        return FileExtraction {
            files,
            source: ExtractionSource::WholeText,
        };
    }

    FileExtraction::empty()
}

/// Pull a `files` mapping out of a parsed JSON value.
fn files_from_value(value: &Value) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let entries = match value.get("files") {
        Some(entries) => entries,
        None => return files,
    };

    match entries {
        Value::Array(items) => {
            for item in items {
                let name = item
                    .get("name")
                    .or_else(|| item.get("path"))
                    .or_else(|| item.get("filename"))
                    .and_then(Value::as_str);
                if let Some(name) = name {
                    let content = match item.get("content") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => continue,
                    };
                    files.insert(name.to_string(), content);
                }
            }
        }
        Value::Object(map) => {
            for (name, content) in map {
                let content = match content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                files.insert(name.clone(), content);
            }
        }
        _ => {}
    }

    files
}

/// Infer a filename for an unlabeled code block from its content.
fn infer_filename(content: &str, index: usize) -> String {
    // Shape check first: requirement lists name the same packages the
    // substring rules key on.
    if looks_like_requirements(content) {
        return "requirements.txt".to_string();
    }

    for rule in INFERENCE_RULES {
        if rule.markers.iter().any(|marker| content.contains(marker)) {
            return rule.filename.to_string();
        }
    }

    format!("file_{}.py", index + 1)
}

/// Whether a block reads as a pip requirements manifest.
fn looks_like_requirements(content: &str) -> bool {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if lines.is_empty() {
        return false;
    }

    let all_pkgish = lines.iter().all(|line| is_requirement_line(line));
    let has_version_pin = lines
        .iter()
        .any(|line| line.contains("==") || line.contains(">=") || line.contains("<="));

    all_pkgish && (has_version_pin || lines.len() >= 2)
}

/// A single requirements line: no whitespace, package-spec characters only,
/// and any `=` must be part of a version pin (a single `=` means an env
/// assignment, not a requirement).
fn is_requirement_line(line: &str) -> bool {
    if line.contains('=') && !line.contains("==") && !line.contains(">=") && !line.contains("<=") {
        return false;
    }
    !line.contains(char::is_whitespace)
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "=<>~!._-[],".contains(c))
}

/// Whether unfenced text reads as a bare source file.
fn looks_like_bare_source(text: &str) -> bool {
    let has_import = text.contains("import ") || text.contains("from ");
    let has_function = text.contains("def ") || text.contains("async def ");
    has_import && has_function
}

/// A fenced code block pulled from raw model text.
struct FencedBlock {
    /// Filename given on the fence header line, if any.
    explicit_name: Option<String>,
    content: String,
}

/// Collect every fenced code block with its header line.
fn collect_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let re = match regex::Regex::new(r"```([^\n`]*)\n([\s\S]*?)```") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    re.captures_iter(text)
        .map(|caps| {
            let header = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let content = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            FencedBlock {
                explicit_name: filename_from_header(header),
                content: content.trim_end_matches('\n').to_string(),
            }
        })
        .collect()
}

/// Pick a filename out of a fence header line.
///
/// Language tags carry no dot, so the first dotted token is taken as a name
/// (`python main.py` names the file, plain `python` does not).
fn filename_from_header(header: &str) -> Option<String> {
    header
        .split_whitespace()
        .find(|token| token.contains('.'))
        .map(|token| token.to_string())
}

/// Extract the interior of the first `\boxed{...}` span.
fn extract_boxed_interior(text: &str) -> Option<String> {
    let marker = "\\boxed{";
    let start = text.find(marker)?;
    let open = start + marker.len() - 1;
    let close = find_matching_brace(text, open)?;
    Some(text[open + 1..close].to_string())
}

/// Extract the interior of the first fenced code block, preferring a
/// `json`-tagged fence over an untagged one.
fn extract_fenced_interior(text: &str) -> Option<String> {
    let json_re = regex::Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok()?;
    if let Some(caps) = json_re.captures(text) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let generic_re = regex::Regex::new(r"```[a-zA-Z0-9_+-]*\s*\n?([\s\S]*?)\n?```").ok()?;
    generic_re
        .captures(text)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

/// Find the largest balanced `{...}` span that parses as JSON.
///
/// Scanning every opening brace keeps this robust against stray braces in
/// prose; ties on length prefer the later span.
fn extract_largest_json_object(text: &str) -> Option<String> {
    let mut best: Option<&str> = None;

    for (idx, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        let close = match find_matching_brace(text, idx) {
            Some(close) => close,
            None => continue,
        };
        let candidate = &text[idx..=close];
        if serde_json::from_str::<Value>(candidate).is_err() {
            continue;
        }
        match best {
            Some(current) if candidate.len() < current.len() => {}
            _ => best = Some(candidate),
        }
    }

    best.map(|s| s.to_string())
}

/// Find the byte index of the brace matching the one at `open`.
///
/// String-aware: braces inside JSON string literals (including escaped
/// quotes) do not affect nesting depth.
fn find_matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[open..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }

    None
}
