//! Ordered keyword-signature rules for classifying unfenced or untagged code.
//!
//! Precedence lives in [`INFERENCE_RULES`]: the first rule whose patterns
//! match wins. Python sits ahead of the typed-script rules because both use
//! `name: type` annotations, and a Python body must never be classified as
//! TypeScript.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::Language;

/// One classification rule, compiled.
pub struct InferenceRule {
    /// Stable rule name, used in logs and tests.
    pub name: &'static str,
    pub language: Language,
    /// At least one of these must match.
    any_of: Vec<Regex>,
    /// All of these must match as well.
    all_of: Vec<Regex>,
}

impl InferenceRule {
    fn new(name: &'static str, language: Language, any_of: &[&str], all_of: &[&str]) -> Self {
        Self {
            name,
            language,
            any_of: any_of.iter().map(|p| compile(p)).collect(),
            all_of: all_of.iter().map(|p| compile(p)).collect(),
        }
    }

    /// Whether `text` satisfies this rule.
    pub fn matches(&self, text: &str) -> bool {
        self.any_of.iter().any(|re| re.is_match(text))
            && self.all_of.iter().all(|re| re.is_match(text))
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid inference pattern {pattern:?}: {e}"))
}

const TYPED_SCRIPT: &[&str] = &[
    r"(?m)^\s*(export\s+)?interface\s+\w+",
    r"(?m)^\s*(export\s+)?type\s+\w+(<[^>]*>)?\s*=",
    r":\s*(string|number|boolean|any|void|unknown|never)(\[\])?\s*[,;)=|{]",
    r"(?m)^\s*(public|private|protected|readonly)\s+\w+",
    r"\bas\s+const\b",
    r"\bReact\.FC\b",
];

const MARKUP_IN_SCRIPT: &[&str] = &[
    r"return\s*\(?\s*<[A-Za-z]",
    r"<[A-Z][\w.]*(\s[^>]*)?/?>",
    r"</[A-Za-z][\w.]*>\s*\)?\s*;?\s*$",
    r"\bclassName=",
];

/// Ordered rule list. Earlier rules take precedence.
pub static INFERENCE_RULES: LazyLock<Vec<InferenceRule>> = LazyLock::new(|| {
    vec![
        InferenceRule::new(
            "markup-document",
            Language::Html,
            &[r"(?i)<!doctype\s+html", r"(?i)<html[\s>]"],
            &[],
        ),
        InferenceRule::new(
            "shebang-shell",
            Language::Bash,
            &[r"\A#!\s*/(usr/)?bin/(env\s+)?(ba|z)?sh\b"],
            &[],
        ),
        InferenceRule::new(
            "python",
            Language::Python,
            &[
                r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*(->\s*[^:]+)?:",
                r"(?m)^\s*from\s+[\w.]+\s+import\s+",
                r#"__name__\s*==\s*['"]__main__['"]"#,
                r"(?m)^\s*import\s+[\w.]+(\s+as\s+\w+)?\s*$",
                r"(?m)^\s*class\s+\w+(\([^)]*\))?\s*:\s*$",
                r"(?m)^\s*elif\s",
            ],
            &[],
        ),
        InferenceRule::new(
            "rust",
            Language::Rust,
            &[r"(?m)^\s*(pub\s+)?fn\s+\w+", r"\blet\s+mut\s+\w+", r"(?m)^\s*use\s+\w+::"],
            &[],
        ),
        InferenceRule::new("typed-markup-script", Language::Tsx, TYPED_SCRIPT, MARKUP_IN_SCRIPT_ALL),
        InferenceRule::new("typed-script", Language::TypeScript, TYPED_SCRIPT, &[]),
        InferenceRule::new("markup-script", Language::Jsx, MARKUP_IN_SCRIPT, SCRIPT_SHAPE_ALL),
        InferenceRule::new(
            "stylesheet",
            Language::Css,
            &[r"(?m)^\s*[.#@:]?[\w-][\w\s.#:>+~,\[\]=()-]*\{"],
            &[r"(?m)^\s*[\w-]+\s*:\s*[^;{}]+;"],
        ),
        InferenceRule::new("script", Language::JavaScript, SCRIPT_SHAPE, &[]),
    ]
});

/// Generic scripting-keyword shapes.
const SCRIPT_SHAPE: &[&str] = &[
    r"\bfunction\s*\*?\s*\w*\s*\(",
    r"(?m)^\s*(export\s+)?(const|let|var)\s+[\w{\[]",
    r"=>",
    r#"(?m)^\s*import\s+.+\s+from\s+['"]"#,
    r"\brequire\s*\(",
    r"\bconsole\.\w+\(",
    r"\bdocument\.\w+",
    r"\bmodule\.exports\b",
];

/// Markup-in-script only counts inside something that is already script.
const SCRIPT_SHAPE_ALL: &[&str] = &[r"\bfunction\b|=>|\bclass\s+\w+|\bexport\b|\bimport\b"];

/// The typed + markup rule requires a JSX-looking element as well.
const MARKUP_IN_SCRIPT_ALL: &[&str] = &[r"return\s*\(?\s*<[A-Za-z]|</[A-Za-z][\w.]*>|/>"];

/// Small pattern set deciding whether unfenced text is code at all.
static CODE_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bfunction\s*\w*\s*\(",
        r"(?m)^\s*import\s",
        r"(?m)^\s*(export\s+)?(default\s+)?class\s+\w+",
        r"(?m)^\s*def\s+\w+\s*\(",
        r"(?m)^\s*(export\s+)?(const|let|var)\s+\w+\s*=",
        r"(?m)^\s*from\s+[\w.]+\s+import\s",
        r"(?i)<!doctype\s+html|<html[\s>]",
        r"\A#!",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

/// Whether free text contains recognizable code syntax.
pub fn looks_like_code(text: &str) -> bool {
    CODE_SIGNALS.iter().any(|re| re.is_match(text))
}

/// Classify `text` with the ordered rule table.
pub fn infer_language(text: &str) -> Option<Language> {
    INFERENCE_RULES
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| rule.language.clone())
}

/// Name of the rule that classified `text`, if any.
pub fn matching_rule(text: &str) -> Option<&'static str> {
    INFERENCE_RULES
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| rule.name)
}

/// Whether script source contains markup-in-script elements.
pub fn contains_markup(code: &str) -> bool {
    static MARKUP: LazyLock<(Vec<Regex>, Vec<Regex>)> = LazyLock::new(|| {
        (
            MARKUP_IN_SCRIPT_ALL.iter().map(|p| compile(p)).collect(),
            MARKUP_IN_SCRIPT.iter().map(|p| compile(p)).collect(),
        )
    });
    let (required, signals) = &*MARKUP;
    required.iter().all(|re| re.is_match(code)) && signals.iter().any(|re| re.is_match(code))
}
