//! Metadata derivation for consolidated artifacts.

use std::sync::LazyLock;

use regex::Regex;

use crate::deps;
use crate::domain::{ArtifactMetadata, ArtifactType, Complexity, Language};
use crate::inference::contains_markup;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid analysis pattern {pattern:?}: {e}"))
}

/// Framework detection, first match wins.
static FRAMEWORKS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("preact", r#"from\s*['"]preact(/[\w/-]+)?['"]"#),
        ("solid", r#"from\s*['"]solid-js(/[\w/-]+)?['"]"#),
        ("vue", r#"from\s*['"]vue['"]|\bcreateApp\s*\("#),
        ("svelte", r#"from\s*['"]svelte(/[\w/-]+)?['"]"#),
        (
            "react",
            r#"from\s*['"]react(-dom)?(/[\w/-]+)?['"]|\bReact\.\w+|\buse(State|Effect|Ref|Memo|Callback|Reducer|Context)\s*\("#,
        ),
        ("three", r#"from\s*['"]three['"]|\bTHREE\.\w+"#),
        ("d3", r#"from\s*['"]d3['"]|\bd3\.(select|scale)"#),
    ]
    .into_iter()
    .map(|(name, p)| (name, compile(p)))
    .collect()
});

static BRANCH_POINT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(if|for|while|case|catch|elif|except)\b|&&|\|\||\s\?\s"));

static COMPONENT_NAME: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bexport\s+default\s+(?:async\s+)?(?:function|class)\s+([A-Z]\w*)",
        r"(?m)^\s*export\s+default\s+([A-Z]\w*)\s*;?\s*$",
        r"(?m)^\s*(?:export\s+)?(?:function|class)\s+([A-Z]\w*)",
        r"(?m)^\s*(?:export\s+)?const\s+([A-Z]\w*)\s*(?::[^=]+)?=\s*(?:\([^)]*\)|\w+)\s*=>",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

static DOCUMENT_TITLE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?is)<title[^>]*>\s*(.*?)\s*</title>"));

/// First framework the code references.
pub fn detect_framework(code: &str) -> Option<&'static str> {
    FRAMEWORKS
        .iter()
        .find(|(_, re)| re.is_match(code))
        .map(|(name, _)| *name)
}

/// Count of branching constructs used for the complexity tier.
pub fn branch_points(code: &str) -> usize {
    BRANCH_POINT.find_iter(code).count()
}

pub fn complexity(line_count: usize, branches: usize) -> Complexity {
    if line_count < 50 && branches < 10 {
        Complexity::Low
    } else if line_count < 200 && branches < 40 {
        Complexity::Medium
    } else {
        Complexity::High
    }
}

/// Name of the component or entry the code defines, if any.
pub fn component_name(code: &str) -> Option<String> {
    COMPONENT_NAME
        .iter()
        .find_map(|re| re.captures(code))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn hint_stem(hint: &str) -> Option<&str> {
    let name = hint.rsplit(['/', '\\']).next()?;
    let stem = name.split('.').next()?;
    (!stem.is_empty()).then_some(stem)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human title: file hint stem, component name, document title, then a generic label.
pub fn title(code: &str, language: &Language, file_hints: &[String]) -> String {
    if let Some(stem) = file_hints.first().and_then(|h| hint_stem(h)) {
        return stem.to_string();
    }
    if language.is_script() {
        if let Some(name) = component_name(code) {
            return name;
        }
    }
    if *language == Language::Html {
        if let Some(t) = DOCUMENT_TITLE
            .captures(code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|t| !t.is_empty())
        {
            return t.to_string();
        }
    }
    format!("{} snippet", capitalize(language.as_str()))
}

/// Whether script source carries markup-in-script.
pub fn has_jsx(code: &str, language: &Language) -> bool {
    language.supports_jsx() || (language.is_script() && contains_markup(code))
}

/// Derive metadata and type for a consolidated artifact.
pub fn analyze(
    code: &str,
    language: &Language,
    file_hints: Vec<String>,
    block_count: usize,
) -> (ArtifactType, ArtifactMetadata) {
    let framework = detect_framework(code);
    let jsx = has_jsx(code, language);
    let line_count = code.lines().count();
    let buildable = language.is_script();
    let dependencies = if buildable {
        deps::resolve(code).into_vec()
    } else {
        Vec::new()
    };

    let artifact_type = match language {
        l if l.is_script() => {
            if jsx || matches!(framework, Some("react" | "preact" | "solid")) {
                ArtifactType::ReactComponent
            } else {
                ArtifactType::Script
            }
        }
        Language::Html => ArtifactType::WebPage,
        Language::Css | Language::Scss => ArtifactType::Stylesheet,
        _ => ArtifactType::Snippet,
    };

    let metadata = ArtifactMetadata {
        dependencies,
        framework: framework.map(str::to_string),
        has_jsx: jsx,
        line_count,
        complexity: complexity(line_count, branch_points(code)),
        buildable,
        previewable: buildable || *language == Language::Html,
        file_hints,
        block_count,
    };
    (artifact_type, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_table_order() {
        assert_eq!(detect_framework("import { h } from 'preact';"), Some("preact"));
        assert_eq!(detect_framework("import React from 'react';"), Some("react"));
        assert_eq!(detect_framework("const [a, setA] = useState(0);"), Some("react"));
        assert_eq!(detect_framework("import * as THREE from 'three';"), Some("three"));
        assert_eq!(detect_framework("console.log(1)"), None);
    }

    #[test]
    fn test_complexity_tiers() {
        assert_eq!(complexity(10, 2), Complexity::Low);
        assert_eq!(complexity(10, 12), Complexity::Medium);
        assert_eq!(complexity(120, 5), Complexity::Medium);
        assert_eq!(complexity(400, 5), Complexity::High);
    }

    #[test]
    fn test_title_sources() {
        let hints = vec!["src/components/Card.tsx".to_string()];
        assert_eq!(title("", &Language::Tsx, &hints), "Card");
        assert_eq!(
            title("export default function Widget() {}", &Language::Jsx, &[]),
            "Widget"
        );
        assert_eq!(
            title("<html><head><title> Todo </title></head></html>", &Language::Html, &[]),
            "Todo"
        );
        assert_eq!(title("print(1)", &Language::Python, &[]), "Python snippet");
    }

    #[test]
    fn test_analyze_component() {
        let code = "import React from 'react';\nexport default function App() {\n  return <div>Hi</div>;\n}\n";
        let (kind, meta) = analyze(code, &Language::Jsx, vec![], 1);
        assert_eq!(kind, ArtifactType::ReactComponent);
        assert_eq!(meta.dependencies, vec!["react"]);
        assert!(meta.has_jsx && meta.buildable && meta.previewable);
        assert_eq!(meta.line_count, 4);
    }

    #[test]
    fn test_analyze_non_script() {
        let (kind, meta) = analyze("SELECT 1;", &Language::Sql, vec![], 1);
        assert_eq!(kind, ArtifactType::Snippet);
        assert!(!meta.buildable && !meta.previewable);
        assert!(meta.dependencies.is_empty());
    }
}
