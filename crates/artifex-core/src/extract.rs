//! Block extraction: raw model text to candidate code blocks.
//!
//! Extraction never fails. A fence that is never closed yields no block for
//! that region, which is what lets the stream orchestrator re-parse a growing
//! buffer without surfacing half-received code.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{BlockOrigin, CodeBlock, Language};
use crate::inference::{infer_language, looks_like_code};

/// Blocks with fewer non-whitespace characters than this are noise.
pub const MIN_BODY_CHARS: usize = 10;

/// A line naming the file the block belongs to.
static FILE_HINT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?://+|#|--|/\*+|<!--)\s*)?(?:(?:file(?:name)?|path)\s*:\s*)?([\w@~.\\/-]*[\w@~-]\.([a-z0-9]{1,6}))\s*(?:\*+/|-->)?\s*$",
    )
    .expect("file hint pattern is valid")
});

/// `title="App.jsx"` / `filename=App.jsx` attributes on the info string.
static INFO_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:title|file(?:name)?|path)\s*=\s*["']?([^"'\s]+)"#)
        .expect("info attribute pattern is valid")
});

struct Fence {
    marker: char,
    len: usize,
}

/// Parse an opening or closing fence line.
fn parse_fence(line: &str) -> Option<(Fence, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = &rest[len..];
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((Fence { marker, len }, info.trim()))
}

fn is_closing(line: &str, open: &Fence) -> bool {
    match parse_fence(line) {
        Some((fence, info)) => fence.marker == open.marker && fence.len >= open.len && info.is_empty(),
        None => false,
    }
}

/// Split an info string into (language tag, file hint).
fn parse_info(info: &str) -> (Option<Language>, Option<String>) {
    let first = info.split_whitespace().next().unwrap_or("");
    let attr_hint = INFO_ATTR
        .captures(info)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|h| has_known_extension(h));

    // `tsx:src/App.tsx`
    if let Some((tag, path)) = first.split_once(':') {
        if has_known_extension(path) {
            return (Language::from_tag(tag), Some(path.to_string()));
        }
    }
    // A bare file name used as the tag.
    if first.contains('.') && has_known_extension(first) {
        return (extension_language(first), Some(first.to_string()));
    }
    let tag = first.split(['{', ',']).next().unwrap_or("");
    (Language::from_tag(tag), attr_hint)
}

fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext)
}

fn has_known_extension(path: &str) -> bool {
    extension_of(path).is_some_and(Language::is_known_extension)
}

fn extension_language(path: &str) -> Option<Language> {
    extension_of(path).and_then(Language::from_extension)
}

/// Detect a file hint on the first line of a block body.
fn take_file_hint(body: &str) -> Option<(String, String)> {
    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
    let caps = FILE_HINT_LINE.captures(first)?;
    let path = caps.get(1)?.as_str();
    if !has_known_extension(path) {
        return None;
    }
    Some((path.to_string(), rest.to_string()))
}

fn meaningful_chars(body: &str) -> usize {
    body.chars().filter(|c| !c.is_whitespace()).count()
}

fn build_block(info: &str, raw_body: String, span: std::ops::Range<usize>) -> Option<CodeBlock> {
    let (tag_language, info_hint) = parse_info(info);
    let (file_hint, body) = match take_file_hint(&raw_body) {
        Some((hint, rest)) if info_hint.is_none() => (Some(hint), rest),
        _ => (info_hint, raw_body),
    };
    if meaningful_chars(&body) < MIN_BODY_CHARS {
        return None;
    }
    let language = tag_language
        .or_else(|| file_hint.as_deref().and_then(extension_language))
        .or_else(|| infer_language(&body))
        .unwrap_or(Language::PlainText);
    Some(CodeBlock {
        language,
        body,
        file_hint,
        span,
        origin: BlockOrigin::Fenced,
    })
}

/// Extract candidate code blocks from model text, in source order.
pub fn extract(text: &str) -> Vec<CodeBlock> {
    let mut lines: Vec<(usize, &str)> = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        lines.push((offset, raw));
        offset += raw.len();
    }

    let mut blocks = Vec::new();
    let mut saw_fence = false;
    let mut i = 0;
    while i < lines.len() {
        let (start, raw) = lines[i];
        let line = raw.trim_end_matches(['\n', '\r']);
        let Some((fence, info)) = parse_fence(line) else {
            i += 1;
            continue;
        };
        saw_fence = true;

        let close = (i + 1..lines.len())
            .find(|&j| is_closing(lines[j].1.trim_end_matches(['\n', '\r']), &fence));
        let Some(close) = close else {
            // Unclosed: everything after the opener belongs to it.
            break;
        };

        let body = lines[i + 1..close]
            .iter()
            .map(|(_, l)| l.trim_end_matches(['\n', '\r']))
            .collect::<Vec<_>>()
            .join("\n");
        let end = lines[close].0 + lines[close].1.len();
        if let Some(block) = build_block(info, body, start..end) {
            blocks.push(block);
        }
        i = close + 1;
    }

    if !saw_fence && !text.contains("```") && !text.contains("~~~") {
        if let Some(block) = infer_whole_text(text) {
            blocks.push(block);
        }
    }

    tracing::trace!(blocks = blocks.len(), "extracted code blocks");
    blocks
}

/// Fallback for unfenced responses that are nevertheless code.
fn infer_whole_text(text: &str) -> Option<CodeBlock> {
    let body = text.trim();
    if meaningful_chars(body) < MIN_BODY_CHARS || !looks_like_code(body) {
        return None;
    }
    let language = infer_language(body)?;
    Some(CodeBlock {
        language,
        body: body.to_string(),
        file_hint: None,
        span: 0..text.len(),
        origin: BlockOrigin::Inferred,
    })
}
