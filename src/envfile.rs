//! The `.env` file read by the Speaches compose stack.
//!
//! Edits keep comments, blank lines and the order of untouched entries, so a
//! hand-maintained file survives `env set`.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CHAT_COMPLETION_BASE_URL: &str = "CHAT_COMPLETION_BASE_URL";
pub const CHAT_COMPLETION_API_KEY: &str = "CHAT_COMPLETION_API_KEY";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const API_KEY: &str = "API_KEY";

pub const REQUIRED_KEYS: &[&str] = &[CHAT_COMPLETION_BASE_URL, CHAT_COMPLETION_API_KEY];
pub const KNOWN_KEYS: &[&str] = &[
    CHAT_COMPLETION_BASE_URL,
    CHAT_COMPLETION_API_KEY,
    LOG_LEVEL,
    API_KEY,
];
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "critical"];

pub const TEMPLATE: &str = "\
# Speaches server settings, read by `docker compose up`.

# OpenAI-compatible endpoint used for chat completions in realtime sessions.
CHAT_COMPLETION_BASE_URL=https://openrouter.ai/api/v1
CHAT_COMPLETION_API_KEY=

# One of: debug, info, warning, error, critical.
LOG_LEVEL=info

# Uncomment to require `Authorization: Bearer <key>` on the server's HTTP routes.
# API_KEY=
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// 1-based; 0 when the issue is about the file as a whole.
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    export: bool,
    key: String,
    value: String,
    /// Original text, dropped once the value is edited.
    raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry(Entry),
    Comment(String),
    Malformed(String),
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Line::Comment(raw.to_string());
        }

        let (export, body) = match trimmed.strip_prefix("export ") {
            Some(body) => (true, body),
            None => (false, trimmed),
        };
        let Some((key, value)) = body.split_once('=') else {
            return Line::Malformed(raw.to_string());
        };

        let key = key.trim();
        if !is_valid_key(key) {
            return Line::Malformed(raw.to_string());
        }
        let Some(value) = parse_value(value.trim()) else {
            return Line::Malformed(raw.to_string());
        };

        Line::Entry(Entry {
            export,
            key: key.to_string(),
            value,
            raw: Some(raw.to_string()),
        })
    }

    fn render(&self) -> String {
        match self {
            Line::Entry(Entry { raw: Some(raw), .. }) => raw.clone(),
            Line::Entry(entry) => format!(
                "{}{}={}",
                if entry.export { "export " } else { "" },
                entry.key,
                quote(&entry.value)
            ),
            Line::Comment(raw) | Line::Malformed(raw) => raw.clone(),
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `None` for an unterminated quote or text after the closing quote.
fn parse_value(value: &str) -> Option<String> {
    let Some(q) = value.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
        // Unquoted values end at an inline ` #` comment.
        return Some(match value.find(" #") {
            Some(pos) => value[..pos].trim_end().to_string(),
            None => value.to_string(),
        });
    };

    let rest = &value[1..];
    let end = rest.find(q)?;
    let trailing = rest[end + 1..].trim_start();
    if trailing.is_empty() || trailing.starts_with('#') {
        Some(rest[..end].to_string())
    } else {
        None
    }
}

fn quote(value: &str) -> String {
    let plain = !value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\''));
    if plain {
        value.to_string()
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}

#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl EnvFile {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().map(Line::parse).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(path, &content))
    }

    /// Loads `path` if it exists.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Writes the template to `path`, refusing to clobber an existing file
    /// unless `force` is set.
    pub fn init(path: &Path, force: bool) -> Result<Self> {
        if path.exists() && !force {
            return Err(Error::InvalidInput(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        fs::write(path, TEMPLATE)?;
        tracing::info!("Wrote {}", path.display());
        Ok(Self::parse(path, TEMPLATE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    /// The first value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// Replaces the first occurrence of `key`, or appends it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !is_valid_key(key) {
            return Err(Error::InvalidInput(format!("Invalid variable name: {}", key)));
        }
        if value.contains('\n') || (value.contains('"') && value.contains('\'')) {
            return Err(Error::InvalidInput(format!(
                "Value for {} cannot be represented in a .env file",
                key
            )));
        }

        let existing = self.lines.iter_mut().find_map(|line| match line {
            Line::Entry(entry) if entry.key == key => Some(entry),
            _ => None,
        });

        match existing {
            Some(entry) => {
                entry.value = value.to_string();
                entry.raw = None;
            }
            None => self.lines.push(Line::Entry(Entry {
                export: false,
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            })),
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out: String = self
            .lines
            .iter()
            .map(Line::render)
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        out
    }

    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, self.render())?;
        Ok(())
    }

    /// Problems a Speaches deployment would trip over.
    pub fn check(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for (idx, line) in self.lines.iter().enumerate() {
            let line_no = idx + 1;
            match line {
                Line::Malformed(raw) => issues.push(Issue {
                    line: line_no,
                    severity: Severity::Error,
                    message: format!("Expected KEY=VALUE, found '{}'", raw.trim()),
                }),
                Line::Entry(entry) => {
                    if seen.contains(&entry.key.as_str()) {
                        issues.push(Issue {
                            line: line_no,
                            severity: Severity::Warning,
                            message: format!("{} is set more than once; the first value wins", entry.key),
                        });
                    }
                    seen.push(&entry.key);
                    issues.extend(check_entry(entry, line_no));
                }
                Line::Comment(_) => {}
            }
        }

        for key in REQUIRED_KEYS {
            match self.get(key) {
                None => issues.push(Issue {
                    line: 0,
                    severity: Severity::Error,
                    message: format!("{} is missing", key),
                }),
                Some(value) if value.trim().is_empty() => issues.push(Issue {
                    line: self.line_of(key),
                    severity: Severity::Error,
                    message: format!("{} is empty", key),
                }),
                Some(_) => {}
            }
        }

        issues
    }

    fn line_of(&self, key: &str) -> usize {
        self.lines
            .iter()
            .position(|line| matches!(line, Line::Entry(entry) if entry.key == key))
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }
}

fn check_entry(entry: &Entry, line: usize) -> Option<Issue> {
    let error = |message: String| Issue {
        line,
        severity: Severity::Error,
        message,
    };

    match entry.key.as_str() {
        CHAT_COMPLETION_BASE_URL if !entry.value.is_empty() => {
            match reqwest::Url::parse(&entry.value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => None,
                _ => Some(error(format!(
                    "{} must be an http(s) URL, found '{}'",
                    entry.key, entry.value
                ))),
            }
        }
        LOG_LEVEL => {
            let level = entry.value.to_ascii_lowercase();
            if LOG_LEVELS.contains(&level.as_str()) {
                None
            } else {
                Some(error(format!(
                    "{} must be one of {}, found '{}'",
                    entry.key,
                    LOG_LEVELS.join(", "),
                    entry.value
                )))
            }
        }
        key if !KNOWN_KEYS.contains(&key) => Some(Issue {
            line,
            severity: Severity::Warning,
            message: format!("{} is not a recognized Speaches setting", key),
        }),
        _ => None,
    }
}
