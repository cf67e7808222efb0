//! Recovery of fenced code blocks from prose responses.
//!
//! Used when a file-producing request did not come back as a `files[]`
//! structure. Each fenced block becomes a [`CodeBlock`]; a file path is
//! guessed from the fence info string (` ```rust src/main.rs `), a
//! `File: path` line just above the fence, or a leading path comment inside
//! the block (`// src/main.rs`).

use serde::{Deserialize, Serialize};

/// A fenced block lifted out of model text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub path_hint: Option<String>,
    pub code: String,
}

fn looks_like_path(token: &str) -> bool {
    let token = token.trim_matches(|c| c == '`' || c == '*' || c == '"' || c == '\'');
    if token.is_empty()
        || token.starts_with('!')
        || token.contains(char::is_whitespace)
        || token.contains("://")
    {
        return false;
    }
    if token.contains('/') {
        return true;
    }
    match token.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=6).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn clean_path(token: &str) -> String {
    token
        .trim_matches(|c| c == '`' || c == '*' || c == '"' || c == '\'' || c == ':')
        .trim_start_matches("./")
        .to_string()
}

/// `rust`, `rust src/main.rs`, `rust:src/main.rs`, `src/main.rs`, `rust title="a.rs"`
fn parse_info(info: &str) -> (Option<String>, Option<String>) {
    let mut language = None;
    let mut path = None;
    for token in info.split(|c: char| c.is_whitespace() || c == ':') {
        let token = token
            .strip_prefix("title=")
            .or_else(|| token.strip_prefix("file="))
            .or_else(|| token.strip_prefix("filename="))
            .unwrap_or(token);
        if token.is_empty() {
            continue;
        }
        if path.is_none() && looks_like_path(token) {
            path = Some(clean_path(token));
        } else if language.is_none()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '#')
        {
            language = Some(token.to_lowercase());
        }
    }
    (language, path)
}

/// `File: src/main.rs`, `**src/main.rs**`, `### src/main.rs`
fn path_from_heading(line: &str) -> Option<String> {
    let line = line
        .trim()
        .trim_matches(|c| c == '#' || c == '*' || c == '`')
        .trim();
    let lower = line.to_lowercase();
    let rest = ["file:", "filename:", "path:"]
        .iter()
        .find_map(|prefix| lower.starts_with(prefix).then(|| line[prefix.len()..].trim()))
        .unwrap_or(line);
    let rest = rest.trim_end_matches(':');
    looks_like_path(rest).then(|| clean_path(rest))
}

/// `// src/main.rs`, `# file: app.py`, `<!-- index.html -->`
fn path_from_comment(first_line: &str) -> Option<String> {
    let line = first_line.trim();
    let body = ["//", "#", "--", "/*", "<!--"]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))?;
    let body = body.trim().trim_end_matches("*/").trim_end_matches("-->").trim();
    path_from_heading(body)
}

/// Extract every fenced block in order of appearance.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut previous_line: Option<&str> = None;
    let mut current: Option<(Option<String>, Option<String>, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    let (language, mut path) = parse_info(info.trim());
                    if path.is_none() {
                        path = previous_line.and_then(path_from_heading);
                    }
                    current = Some((language, path, Vec::new()));
                } else if !trimmed.is_empty() {
                    previous_line = Some(line);
                }
            }
            Some((language, path, mut lines)) => {
                if trimmed.trim_end() == "```" {
                    blocks.push(finish(language, path, &lines));
                    previous_line = None;
                } else {
                    lines.push(line);
                    current = Some((language, path, lines));
                }
            }
        }
    }

    if let Some((language, path, lines)) = current
        && lines.iter().any(|l| !l.trim().is_empty())
    {
        blocks.push(finish(language, path, &lines));
    }
    blocks
}

fn finish(language: Option<String>, path: Option<String>, lines: &[&str]) -> CodeBlock {
    let path_hint = path.or_else(|| {
        lines
            .iter()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| path_from_comment(l))
    });
    let mut code = lines.join("\n");
    code.push('\n');
    CodeBlock {
        language,
        path_hint,
        code,
    }
}

/// File extension conventionally used for a fence language
pub fn extension_for_language(language: Option<&str>) -> &'static str {
    match language.map(str::to_lowercase).as_deref() {
        Some("rust" | "rs") => "rs",
        Some("python" | "py") => "py",
        Some("javascript" | "js" | "jsx") => "js",
        Some("typescript" | "ts" | "tsx") => "ts",
        Some("html") => "html",
        Some("css") => "css",
        Some("json") => "json",
        Some("yaml" | "yml") => "yml",
        Some("toml") => "toml",
        Some("bash" | "sh" | "shell") => "sh",
        Some("go" | "golang") => "go",
        Some("java") => "java",
        Some("sql") => "sql",
        Some("dockerfile") => "dockerfile",
        Some("markdown" | "md") => "md",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block_with_language() {
        let text = "Here is the code:\n\n```python\nprint('hi')\n```\n\nThat's it.";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].path_hint, None);
        assert_eq!(blocks[0].code, "print('hi')\n");
    }

    #[test]
    fn test_path_from_info_string() {
        let blocks = extract_code_blocks("```rust src/main.rs\nfn main() {}\n```");
        assert_eq!(blocks[0].path_hint.as_deref(), Some("src/main.rs"));
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));

        let blocks = extract_code_blocks("```ts:web/app.ts\nlet x = 1;\n```");
        assert_eq!(blocks[0].path_hint.as_deref(), Some("web/app.ts"));
    }

    #[test]
    fn test_path_from_heading_line() {
        let text = "**File: `server/index.js`**\n```javascript\nconst x = 1;\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks[0].path_hint.as_deref(), Some("server/index.js"));
    }

    #[test]
    fn test_path_from_leading_comment() {
        let text = "```python\n# app/models.py\nclass User: pass\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks[0].path_hint.as_deref(), Some("app/models.py"));
    }

    #[test]
    fn test_multiple_and_unterminated_blocks() {
        let text = "```js\na()\n```\nmore prose\n```css\nbody {}\n";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].language.as_deref(), Some("css"));
    }

    #[test]
    fn test_prose_sentence_is_not_a_path() {
        let text = "I wrote the following code.\n```\nx = 1\n```";
        assert_eq!(extract_code_blocks(text)[0].path_hint, None);
    }

    #[test]
    fn test_extension_for_language() {
        assert_eq!(extension_for_language(Some("Rust")), "rs");
        assert_eq!(extension_for_language(None), "txt");
    }
}
