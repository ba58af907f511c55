//! Source pre-processing before bundling.
//!
//! Component code from a model usually exports a component and stops there.
//! [`prepare_entry`] turns it into a runnable entry point: runtime import,
//! a name for anonymous default exports, and a mount bootstrap. Applying it
//! twice is the same as applying it once.

use std::sync::LazyLock;

use artifex_core::analysis::{detect_framework, has_jsx};
use artifex_core::Language;
use regex::Regex;

/// Id of the element the preview document mounts into.
pub const ROOT_ELEMENT_ID: &str = "root";

/// Name given to anonymous default exports.
pub const FALLBACK_COMPONENT_NAME: &str = "ArtifactRoot";

const BOOTSTRAP_MARKER: &str = "// artifex: mount bootstrap";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid prepare pattern {pattern:?}: {e}"))
}

static RUNTIME_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^\s*(?:import\s+(?:\*\s+as\s+)?React\b|(?:const|let|var)\s+React\s*=)")
});

static MOUNT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:createRoot|hydrateRoot)\s*\(|\bReactDOM\.(?:render|hydrate)\s*\(|\brender\s*\(\s*<")
});

static NAMED_DEFAULT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"\bexport\s+default\s+(?:async\s+)?(?:function\s*\*?|class)\s+([A-Za-z_$][\w$]*)"),
        compile(r"(?m)^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$"),
        compile(r"\bexport\s*\{[^}]*\b([A-Za-z_$][\w$]*)\s+as\s+default\b"),
    ]
});

static ANONYMOUS_FUNCTION_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\bexport\s+default\s+(async\s+)?function\s*(\*?)\s*\("));

static ANONYMOUS_CLASS_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\bexport\s+default\s+class\s*(extends\b|\{)"));

static EXPRESSION_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^(\s*)export\s+default\s+((?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>|React\.memo\(|memo\(|forwardRef\()")
});

/// Component frameworks that bring their own runtime and mount API.
const FOREIGN_RUNTIMES: &[&str] = &["preact", "solid", "vue", "svelte"];

/// Whether the code targets the React component runtime.
pub fn targets_component_runtime(code: &str, language: &Language) -> bool {
    if !language.is_script() {
        return false;
    }
    match detect_framework(code) {
        Some("react") => true,
        Some(other) if FOREIGN_RUNTIMES.contains(&other) => false,
        _ => has_jsx(code, language),
    }
}

pub fn has_mount_call(code: &str) -> bool {
    MOUNT_CALL.is_match(code)
}

/// Name of the default export, if it has one.
pub fn default_export_name(code: &str) -> Option<String> {
    NAMED_DEFAULT
        .iter()
        .find_map(|re| re.captures(code))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Give an anonymous default export a name. Returns the rewritten code and
/// the name, or `None` when there is no anonymous default export.
fn name_anonymous_default(code: &str) -> Option<(String, String)> {
    let name = FALLBACK_COMPONENT_NAME;
    if let Some(caps) = ANONYMOUS_FUNCTION_DEFAULT.captures(code) {
        let whole = caps.get(0)?;
        let asyncness = caps.get(1).map_or("", |m| m.as_str());
        let star = caps.get(2).map_or("", |m| m.as_str());
        let replacement = format!("export default {asyncness}function{star} {name}(");
        let mut out = code.to_string();
        out.replace_range(whole.range(), &replacement);
        return Some((out, name.to_string()));
    }
    if let Some(caps) = ANONYMOUS_CLASS_DEFAULT.captures(code) {
        let whole = caps.get(0)?;
        let rest = caps.get(1).map_or("", |m| m.as_str());
        let mut out = code.to_string();
        out.replace_range(whole.range(), &format!("export default class {name} {rest}"));
        return Some((out, name.to_string()));
    }
    if let Some(caps) = EXPRESSION_DEFAULT.captures(code) {
        let whole = caps.get(0)?;
        let indent = caps.get(1).map_or("", |m| m.as_str());
        let expr = caps.get(2).map_or("", |m| m.as_str());
        let mut out = code.to_string();
        out.replace_range(whole.range(), &format!("{indent}const {name} = {expr}"));
        out.push_str(&format!("\nexport default {name};\n"));
        return Some((out, name.to_string()));
    }
    None
}

/// Mount snippet: `react-dom/client` root API, legacy `react-dom` render
/// when the installed version predates it.
pub fn mount_bootstrap(component: &str) -> String {
    format!(
        r#"
{BOOTSTRAP_MARKER}
import * as __ArtifexClient from 'react-dom/client';
import * as __ArtifexLegacyDOM from 'react-dom';
{{
  const client = __ArtifexClient.default || __ArtifexClient;
  const legacy = __ArtifexLegacyDOM.default || __ArtifexLegacyDOM;
  const container = document.getElementById('{ROOT_ELEMENT_ID}');
  const element = React.createElement({component});
  if (typeof client.createRoot === 'function') {{
    client.createRoot(container).render(element);
  }} else if (typeof legacy.render === 'function') {{
    legacy.render(element, container);
  }} else {{
    throw new Error('no mount API available in react-dom');
  }}
}}
"#
    )
}

/// Turn component source into a runnable bundle entry.
///
/// Code that does not target the component runtime is returned unchanged.
pub fn prepare_entry(code: &str, language: &Language) -> String {
    if !targets_component_runtime(code, language) {
        return code.to_string();
    }

    let mut out = code.to_string();
    if !RUNTIME_BINDING.is_match(&out) {
        out.insert_str(0, "import React from 'react';\n");
    }

    if out.contains(BOOTSTRAP_MARKER) || has_mount_call(&out) {
        return out;
    }

    let component = match default_export_name(&out) {
        Some(name) => name,
        None => match name_anonymous_default(&out) {
            Some((rewritten, name)) => {
                out = rewritten;
                name
            }
            None => return out,
        },
    };

    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&mount_bootstrap(&component));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_default_gets_one_mount() {
        let code = "export default function Widget() {\n  return <div>hi</div>;\n}\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert!(out.starts_with("import React from 'react';\n"));
        assert_eq!(out.matches("React.createElement(Widget)").count(), 1);
        assert_eq!(out.matches("createRoot(").count(), 1);
    }

    #[test]
    fn test_idempotent() {
        let code = "export default function Widget() {\n  return <div>hi</div>;\n}\n";
        let once = prepare_entry(code, &Language::Jsx);
        let twice = prepare_entry(&once, &Language::Jsx);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_existing_mount_untouched() {
        let code = "import React from 'react';\nimport { createRoot } from 'react-dom/client';\nfunction App() { return <p/>; }\ncreateRoot(document.getElementById('root')).render(<App />);\n";
        assert_eq!(prepare_entry(code, &Language::Jsx), code);
    }

    #[test]
    fn test_existing_runtime_import_kept() {
        let code = "import * as React from 'react';\nexport default function A() { return <b/>; }";
        let out = prepare_entry(code, &Language::Tsx);
        assert_eq!(out.matches("from 'react';").count(), 1);
    }

    #[test]
    fn test_anonymous_function_named() {
        let code = "export default function () {\n  return <main/>;\n}\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert!(out.contains("export default function ArtifactRoot("));
        assert_eq!(out.matches("React.createElement(ArtifactRoot)").count(), 1);
    }

    #[test]
    fn test_arrow_default_named() {
        let code = "export default () => <main>hello</main>;\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert!(out.contains("const ArtifactRoot = () =>"));
        assert!(out.contains("export default ArtifactRoot;"));
        assert_eq!(out.matches("React.createElement(ArtifactRoot)").count(), 1);
    }

    #[test]
    fn test_default_by_reference() {
        let code = "const Board = () => <div className=\"board\"/>;\nexport default Board;\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert_eq!(out.matches("React.createElement(Board)").count(), 1);
    }

    #[test]
    fn test_without_default_export_no_mount() {
        let code = "export const Button = () => <button/>;\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert!(!out.contains(BOOTSTRAP_MARKER));
    }

    #[test]
    fn test_legacy_render_comes_from_react_dom() {
        let out = mount_bootstrap("Widget");
        assert!(out.contains("from 'react-dom/client';"));
        assert!(out.contains("import * as __ArtifexLegacyDOM from 'react-dom';"));
        assert!(out.contains("legacy.render(element, container)"));
        assert!(!out.contains("client.render("));
    }

    #[test]
    fn test_preact_component_left_alone() {
        let code = "import { h } from 'preact';\nimport { useState } from 'preact/hooks';\n\nexport default function Counter() {\n  const [n, setN] = useState(0);\n  return <button onClick={() => setN(n + 1)}>{n}</button>;\n}\n";
        let out = prepare_entry(code, &Language::Jsx);
        assert_eq!(out, code);
        assert!(!out.contains("react-dom"));
        assert!(!out.contains("React.createElement"));
    }

    #[test]
    fn test_solid_component_left_alone() {
        let code = "import { createSignal } from 'solid-js';\nexport default function Clock() {\n  const [t] = createSignal(0);\n  return <span>{t()}</span>;\n}\n";
        assert!(!targets_component_runtime(code, &Language::Tsx));
        assert_eq!(prepare_entry(code, &Language::Tsx), code);
    }

    #[test]
    fn test_plain_script_unchanged() {
        let code = "console.log('plain script, no components');";
        assert_eq!(prepare_entry(code, &Language::JavaScript), code);
    }
}
