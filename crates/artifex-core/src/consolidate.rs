//! Consolidation: many extracted blocks to one artifact.
//!
//! Everything here is a pure function of the block list. Calling
//! [`consolidate`] twice on the same blocks yields byte-identical code, which
//! the content-addressed cache and the stream orchestrator both rely on.

use crate::analysis;
use crate::domain::{CodeBlock, ConsolidatedArtifact, Language, LanguageFamily};
use crate::inference::contains_markup;
use crate::similarity::{is_near_duplicate, normalize_whitespace};

/// Family of `block` given whether the response contains an html block.
fn family_of(block: &CodeBlock, has_document: bool) -> LanguageFamily {
    if has_document && block.language == Language::JavaScript {
        LanguageFamily::Web
    } else {
        block.language.family()
    }
}

/// Primary family: largest total char mass, ties to first appearance.
fn primary_family(blocks: &[CodeBlock], has_document: bool) -> Option<LanguageFamily> {
    let mut masses: Vec<(LanguageFamily, usize)> = Vec::new();
    for block in blocks {
        let family = family_of(block, has_document);
        match masses.iter_mut().find(|(f, _)| *f == family) {
            Some((_, mass)) => *mass += block.mass(),
            None => masses.push((family, block.mass())),
        }
    }
    let mut best: Option<(LanguageFamily, usize)> = None;
    for (family, mass) in masses {
        if best.as_ref().map_or(true, |(_, m)| mass > *m) {
            best = Some((family, mass));
        }
    }
    best.map(|(f, _)| f)
}

/// Drop near-identical blocks, keeping the longer one in the earlier slot.
fn dedup(blocks: Vec<&CodeBlock>) -> Vec<&CodeBlock> {
    let mut kept: Vec<&CodeBlock> = Vec::new();
    for block in blocks {
        match kept.iter().position(|k| is_near_duplicate(&k.body, &block.body)) {
            Some(idx) => {
                if normalize_whitespace(&block.body).len() > normalize_whitespace(&kept[idx].body).len() {
                    kept[idx] = block;
                }
            }
            None => kept.push(block),
        }
    }
    kept
}

fn separator(language: &Language, block: &CodeBlock, index: usize) -> String {
    let label = match &block.file_hint {
        Some(hint) => hint.clone(),
        None => format!("Block {}", index + 1),
    };
    language.comment(&format!("===== {label} ====="))
}

fn concatenate(language: &Language, blocks: &[&CodeBlock]) -> String {
    if let [only] = blocks {
        return only.body.clone();
    }
    blocks
        .iter()
        .enumerate()
        .map(|(i, b)| format!("{}\n{}", separator(language, b, i), b.body.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Widest script language among the blocks, upgraded when markup is present.
fn script_language(blocks: &[&CodeBlock], code: &str) -> Language {
    let any = |l: Language| blocks.iter().any(|b| b.language == l);
    let typed = any(Language::TypeScript) || any(Language::Tsx);
    let markup = any(Language::Jsx) || any(Language::Tsx) || contains_markup(code);
    match (typed, markup) {
        (true, true) => Language::Tsx,
        (true, false) => Language::TypeScript,
        (false, true) => Language::Jsx,
        (false, false) => Language::JavaScript,
    }
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn rfind_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().rfind(needle)
}

fn is_document(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("<!doctype html") || lower.contains("<html")
}

const DOCUMENT_SHELL_HEAD: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n</head>\n<body>\n";
const DOCUMENT_SHELL_TAIL: &str = "</body>\n</html>";

/// Merge html, css and js blocks into one document.
fn merge_web(blocks: &[&CodeBlock]) -> (Language, String) {
    let of = |l: Language| {
        blocks
            .iter()
            .copied()
            .filter(|b| b.language == l)
            .collect::<Vec<&CodeBlock>>()
    };
    let html = of(Language::Html);
    let css = of(Language::Css);
    let js = of(Language::JavaScript);

    if html.is_empty() && js.is_empty() {
        return (Language::Css, concatenate(&Language::Css, &css));
    }

    let base = html
        .iter()
        .copied()
        .filter(|b| is_document(&b.body))
        .fold(None::<&CodeBlock>, |best, b| match best {
            Some(cur) if cur.body.len() >= b.body.len() => Some(cur),
            _ => Some(b),
        });
    let fragments: Vec<&str> = html
        .iter()
        .filter(|b| !is_document(&b.body))
        .map(|b| b.body.trim())
        .collect();

    let mut doc = match base {
        Some(b) => b.body.trim().to_string(),
        None => format!("{DOCUMENT_SHELL_HEAD}{DOCUMENT_SHELL_TAIL}"),
    };

    if !fragments.is_empty() {
        let content = format!("{}\n", fragments.join("\n"));
        insert_before_body_end(&mut doc, &content);
    }
    if !css.is_empty() {
        let styles = css.iter().map(|b| b.body.trim()).collect::<Vec<_>>().join("\n\n");
        let region = format!("<style>\n{styles}\n</style>\n");
        let pos = head_insertion_point(&doc);
        doc.insert_str(pos, &region);
    }
    if !js.is_empty() {
        let scripts = js.iter().map(|b| b.body.trim()).collect::<Vec<_>>().join("\n\n");
        insert_before_body_end(&mut doc, &format!("<script>\n{scripts}\n</script>\n"));
    }
    (Language::Html, doc)
}

/// Offset just past the opening tag that starts at `tag`, if any.
fn after_open_tag(doc: &str, tag: &str) -> Option<usize> {
    let start = find_ci(doc, tag)?;
    let close = doc[start..].find('>')?;
    let mut pos = start + close + 1;
    if doc[pos..].starts_with('\n') {
        pos += 1;
    }
    Some(pos)
}

/// Where head content goes: before `</head>`, before `<body`, else the
/// start of the `<html>` element's content, else after the doctype.
fn head_insertion_point(doc: &str) -> usize {
    find_ci(doc, "</head>")
        .or_else(|| find_ci(doc, "<body"))
        .or_else(|| after_open_tag(doc, "<html"))
        .or_else(|| after_open_tag(doc, "<!doctype"))
        .unwrap_or(0)
}

fn insert_before_body_end(doc: &mut String, content: &str) {
    match rfind_ci(doc, "</body>").or_else(|| rfind_ci(doc, "</html>")) {
        Some(pos) => {
            if pos > 0 && !doc[..pos].ends_with('\n') {
                doc.insert(pos, '\n');
                doc.insert_str(pos + 1, content);
            } else {
                doc.insert_str(pos, content);
            }
        }
        None => {
            doc.push('\n');
            doc.push_str(content.trim_end());
        }
    }
}

/// Consolidate extracted blocks into one artifact, or `None` if nothing survives.
pub fn consolidate(blocks: &[CodeBlock]) -> Option<ConsolidatedArtifact> {
    let has_document = blocks.iter().any(|b| b.language == Language::Html);
    let family = primary_family(blocks, has_document)?;
    let members: Vec<&CodeBlock> = blocks
        .iter()
        .filter(|b| family_of(b, has_document) == family)
        .collect();
    let kept = dedup(members);
    if kept.is_empty() {
        return None;
    }

    let (language, code) = match &family {
        LanguageFamily::Script => {
            let code = concatenate(&kept[0].language, &kept);
            (script_language(&kept, &code), code)
        }
        LanguageFamily::Web => merge_web(&kept),
        LanguageFamily::Other(_) => {
            let language = kept[0].language.clone();
            let code = concatenate(&language, &kept);
            (language, code)
        }
    };

    let mut file_hints: Vec<String> = Vec::new();
    for hint in kept.iter().filter_map(|b| b.file_hint.as_ref()) {
        if !file_hints.contains(hint) {
            file_hints.push(hint.clone());
        }
    }

    let title = analysis::title(&code, &language, &file_hints);
    let (artifact_type, metadata) = analysis::analyze(&code, &language, file_hints, kept.len());
    tracing::debug!(
        family = ?family,
        language = %language,
        blocks = kept.len(),
        "consolidated artifact"
    );
    Some(ConsolidatedArtifact::new(title, language, code, artifact_type, metadata))
}
