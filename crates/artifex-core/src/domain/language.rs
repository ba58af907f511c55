//! Language tags, alias normalization and merge families.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized source language.
///
/// Unknown fence tags survive as [`Language::Other`] with the lowercased tag so
/// that nothing the model wrote is silently rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
    Html,
    Css,
    Scss,
    Python,
    Ruby,
    Bash,
    Rust,
    Go,
    Java,
    Kotlin,
    C,
    Cpp,
    CSharp,
    Php,
    Swift,
    Sql,
    Json,
    Yaml,
    Markdown,
    Vue,
    Svelte,
    Lua,
    PlainText,
    Other(String),
}

/// Fence tag aliases, checked after lowercasing. First column is the alias.
const ALIASES: &[(&str, Language)] = &[
    ("js", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("javascript", Language::JavaScript),
    ("node", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("typescript", Language::TypeScript),
    ("jsx", Language::Jsx),
    ("react", Language::Jsx),
    ("tsx", Language::Tsx),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("xhtml", Language::Html),
    ("css", Language::Css),
    ("scss", Language::Scss),
    ("sass", Language::Scss),
    ("py", Language::Python),
    ("python", Language::Python),
    ("python3", Language::Python),
    ("rb", Language::Ruby),
    ("ruby", Language::Ruby),
    ("sh", Language::Bash),
    ("bash", Language::Bash),
    ("shell", Language::Bash),
    ("zsh", Language::Bash),
    ("console", Language::Bash),
    ("rs", Language::Rust),
    ("rust", Language::Rust),
    ("go", Language::Go),
    ("golang", Language::Go),
    ("java", Language::Java),
    ("kt", Language::Kotlin),
    ("kotlin", Language::Kotlin),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("c++", Language::Cpp),
    ("cc", Language::Cpp),
    ("hpp", Language::Cpp),
    ("cs", Language::CSharp),
    ("c#", Language::CSharp),
    ("csharp", Language::CSharp),
    ("php", Language::Php),
    ("swift", Language::Swift),
    ("sql", Language::Sql),
    ("json", Language::Json),
    ("yml", Language::Yaml),
    ("yaml", Language::Yaml),
    ("md", Language::Markdown),
    ("markdown", Language::Markdown),
    ("vue", Language::Vue),
    ("svelte", Language::Svelte),
    ("lua", Language::Lua),
    ("text", Language::PlainText),
    ("txt", Language::PlainText),
    ("plaintext", Language::PlainText),
];

/// File extensions recognized in file hints, mapped to their language.
const EXTENSIONS: &[(&str, Language)] = &[
    ("js", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("jsx", Language::Jsx),
    ("tsx", Language::Tsx),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("css", Language::Css),
    ("scss", Language::Scss),
    ("py", Language::Python),
    ("rb", Language::Ruby),
    ("sh", Language::Bash),
    ("rs", Language::Rust),
    ("go", Language::Go),
    ("java", Language::Java),
    ("kt", Language::Kotlin),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("hpp", Language::Cpp),
    ("cs", Language::CSharp),
    ("php", Language::Php),
    ("swift", Language::Swift),
    ("sql", Language::Sql),
    ("json", Language::Json),
    ("yml", Language::Yaml),
    ("yaml", Language::Yaml),
    ("md", Language::Markdown),
    ("vue", Language::Vue),
    ("svelte", Language::Svelte),
    ("lua", Language::Lua),
];

impl Language {
    /// Normalize a fence tag (`js`, `Py`, `c++` ...) into a language.
    ///
    /// Returns `None` for an empty tag so callers can fall back to inference.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return None;
        }
        let lang = ALIASES
            .iter()
            .find(|(alias, _)| *alias == tag)
            .map(|(_, lang)| lang.clone())
            .unwrap_or(Language::Other(tag));
        Some(lang)
    }

    /// Language implied by a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| lang.clone())
    }

    /// Whether `ext` is an extension a file hint may carry.
    pub fn is_known_extension(ext: &str) -> bool {
        Self::from_extension(ext).is_some()
    }

    /// Canonical lowercase tag.
    pub fn as_str(&self) -> &str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Jsx => "jsx",
            Language::Tsx => "tsx",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Bash => "bash",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Sql => "sql",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Markdown => "markdown",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Lua => "lua",
            Language::PlainText => "text",
            Language::Other(tag) => tag,
        }
    }

    /// Preferred file extension for stored objects.
    pub fn extension(&self) -> &str {
        match self {
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
            Language::Jsx => "jsx",
            Language::Tsx => "tsx",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Python => "py",
            Language::Ruby => "rb",
            Language::Bash => "sh",
            Language::Rust => "rs",
            Language::Go => "go",
            Language::Java => "java",
            Language::Kotlin => "kt",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "cs",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Sql => "sql",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Markdown => "md",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Lua => "lua",
            Language::PlainText | Language::Other(_) => "txt",
        }
    }

    /// MIME type used when the artifact source is written to object storage.
    pub fn content_type(&self) -> &'static str {
        match self {
            Language::JavaScript | Language::Jsx => "text/javascript; charset=utf-8",
            Language::TypeScript | Language::Tsx => "text/typescript; charset=utf-8",
            Language::Html => "text/html; charset=utf-8",
            Language::Css => "text/css; charset=utf-8",
            Language::Json => "application/json",
            _ => "text/plain; charset=utf-8",
        }
    }

    /// Merge family this language belongs to.
    pub fn family(&self) -> LanguageFamily {
        match self {
            Language::JavaScript | Language::TypeScript | Language::Jsx | Language::Tsx => {
                LanguageFamily::Script
            }
            Language::Html | Language::Css => LanguageFamily::Web,
            other => LanguageFamily::Other(other.as_str().to_string()),
        }
    }

    /// Whether the bundler can turn this language into a browser bundle.
    pub fn is_script(&self) -> bool {
        matches!(self.family(), LanguageFamily::Script)
    }

    /// Whether the language may contain markup-in-script.
    pub fn supports_jsx(&self) -> bool {
        matches!(self, Language::Jsx | Language::Tsx)
    }

    /// Line-comment syntax used for human-readable block separators.
    pub fn comment(&self, text: &str) -> String {
        match self {
            Language::Python
            | Language::Ruby
            | Language::Bash
            | Language::Yaml
            | Language::PlainText => format!("# {text}"),
            Language::Sql | Language::Lua => format!("-- {text}"),
            Language::Html | Language::Markdown | Language::Vue | Language::Svelte => {
                format!("<!-- {text} -->")
            }
            Language::Css | Language::Scss => format!("/* {text} */"),
            _ => format!("// {text}"),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Language::from_tag(&tag).unwrap_or(Language::PlainText)
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.as_str().to_string()
    }
}

/// Equivalence class used by the consolidator to pick a merge strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    /// JavaScript, TypeScript, JSX and TSX.
    Script,
    /// HTML documents with their CSS (and plain JS once a document exists).
    Web,
    /// Everything else, one family per language.
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_normalize() {
        assert_eq!(Language::from_tag("js"), Some(Language::JavaScript));
        assert_eq!(Language::from_tag("JS"), Some(Language::JavaScript));
        assert_eq!(Language::from_tag("py"), Some(Language::Python));
        assert_eq!(Language::from_tag("c++"), Some(Language::Cpp));
        assert_eq!(Language::from_tag("  tsx "), Some(Language::Tsx));
        assert_eq!(Language::from_tag(""), None);
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let lang = Language::from_tag("Elixir").unwrap();
        assert_eq!(lang, Language::Other("elixir".to_string()));
        assert_eq!(lang.as_str(), "elixir");
    }

    #[test]
    fn test_families() {
        assert_eq!(Language::Tsx.family(), LanguageFamily::Script);
        assert_eq!(Language::Css.family(), LanguageFamily::Web);
        assert_eq!(
            Language::Python.family(),
            LanguageFamily::Other("python".to_string())
        );
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Language::Jsx).unwrap();
        assert_eq!(json, "\"jsx\"");
        let back: Language = serde_json::from_str("\"ts\"").unwrap();
        assert_eq!(back, Language::TypeScript);
    }

    #[test]
    fn test_comment_syntax() {
        assert_eq!(Language::Python.comment("x"), "# x");
        assert_eq!(Language::Css.comment("x"), "/* x */");
        assert_eq!(Language::Tsx.comment("x"), "// x");
    }
}
