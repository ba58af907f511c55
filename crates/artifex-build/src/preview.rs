//! Self-contained preview document around a bundle.

use std::sync::LazyLock;

use regex::Regex;

use crate::prepare::ROOT_ELEMENT_ID;

static SCRIPT_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(script)").unwrap_or_else(|e| panic!("invalid script close pattern: {e}"))
});

/// Escape text for an HTML text node or attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Keep bundle text from terminating its inline script element early.
pub fn escape_inline_script(code: &str) -> String {
    SCRIPT_CLOSE.replace_all(code, r"<\/$1").into_owned()
}

const ERROR_STYLE: &str = "\
    .artifex-error{margin:16px;padding:12px 16px;border-radius:6px;\
background:#fff1f0;border:1px solid #ffa39e;color:#a8071a;\
font:13px/1.5 ui-monospace,SFMono-Regular,Menlo,monospace;white-space:pre-wrap}\
    .artifex-error strong{display:block;margin-bottom:4px}";

/// Error rendering shared by the global handlers and the execution guard.
const ERROR_RUNTIME: &str = r#"
      window.__artifexShowError = function (label, err) {
        var root = document.getElementById('__ROOT__') || document.body;
        var box = document.createElement('div');
        box.className = 'artifex-error';
        var head = document.createElement('strong');
        head.textContent = label;
        var body = document.createElement('div');
        body.textContent = err && (err.stack || err.message) ? (err.stack || err.message) : String(err);
        box.appendChild(head);
        box.appendChild(body);
        root.innerHTML = '';
        root.appendChild(box);
      };
      window.addEventListener('error', function (event) {
        window.__artifexShowError('Uncaught error', event.error || event.message);
      });
      window.addEventListener('unhandledrejection', function (event) {
        window.__artifexShowError('Unhandled promise rejection', event.reason);
      });
"#;

/// Wrap bundle text in an HTML document that never leaves a blank page on
/// failure: runtime errors, rejections and execution errors are rendered
/// into the root container.
pub fn preview_document(bundle: &str, title: &str) -> String {
    let runtime = ERROR_RUNTIME.replace("__ROOT__", ROOT_ELEMENT_ID);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{title}</title>
    <style>
    body{{margin:0;font-family:system-ui,-apple-system,sans-serif}}
{ERROR_STYLE}
    </style>
    <script>{runtime}    </script>
  </head>
  <body>
    <div id="{root}"></div>
    <script>
      try {{
{bundle}
      }} catch (err) {{
        window.__artifexShowError('Execution error', err);
      }}
    </script>
  </body>
</html>
"#,
        title = escape_html(title),
        root = ROOT_ELEMENT_ID,
        bundle = escape_inline_script(bundle),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let html = preview_document("console.log(1);", "Counter");
        assert!(html.contains("<div id=\"root\"></div>"));
        assert!(html.contains("<title>Counter</title>"));
        assert!(html.contains("addEventListener('error'"));
        assert!(html.contains("addEventListener('unhandledrejection'"));
        assert!(html.contains("try {\nconsole.log(1);\n      } catch (err)"));
    }

    #[test]
    fn test_bundle_cannot_close_script() {
        let html = preview_document("var s = '</script><b>';", "x");
        assert!(html.contains(r"'<\/script><b>'"));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_title_escaped() {
        let html = preview_document("", "<Tom & Jerry>");
        assert!(html.contains("<title>&lt;Tom &amp; Jerry&gt;</title>"));
    }
}
