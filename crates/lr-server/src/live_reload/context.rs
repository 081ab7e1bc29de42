//! Live reload context shared by the router and middleware.

use crate::mode::Mode;

/// Browser-side listener, with `__LR_ENDPOINT__` standing in for the push URL.
const CLIENT_SCRIPT: &str = include_str!("../../assets/live-reload.js");

/// Path suffix under the endpoint where the client script is served.
const CLIENT_SCRIPT_SUFFIX: &str = "/client.js";

/// Everything derived from the mode and endpoint at startup.
///
/// Built once and shared read-only. In production every piece of script
/// content is empty so nothing can leak into responses.
#[derive(Debug)]
pub struct ReloadContext {
    mode: Mode,
    endpoint: String,
    client_js: String,
    snippet: String,
}

impl ReloadContext {
    /// Build the context for `mode` with the push channel at `endpoint`.
    #[must_use]
    pub fn new(mode: Mode, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let (client_js, snippet) = if mode.is_development() {
            (
                render_client_js(&endpoint),
                format!(
                    "<script src=\"{endpoint}{CLIENT_SCRIPT_SUFFIX}\"></script>\n"
                ),
            )
        } else {
            (String::new(), String::new())
        };

        Self {
            mode,
            endpoint,
            client_js,
            snippet,
        }
    }

    /// Whether live reload is active.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.mode.is_development()
    }

    /// Runtime mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Push endpoint path.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Path the client script is served from.
    #[must_use]
    pub fn client_js_path(&self) -> String {
        format!("{}{CLIENT_SCRIPT_SUFFIX}", self.endpoint)
    }

    /// Client listener source. Empty in production.
    #[must_use]
    pub fn client_js(&self) -> &str {
        &self.client_js
    }

    /// Markup injected into HTML pages. Empty in production.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.snippet
    }
}

/// Substitute the endpoint into the client script as a JS string literal.
fn render_client_js(endpoint: &str) -> String {
    let literal = serde_json::Value::from(endpoint)
        .to_string()
        .replace("</", "<\\/");
    CLIENT_SCRIPT.replace("__LR_ENDPOINT__", &literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_context_has_script() {
        let context = ReloadContext::new(Mode::Development, "/__livereload");

        assert!(context.enabled());
        assert_eq!(
            context.script(),
            "<script src=\"/__livereload/client.js\"></script>\n"
        );
        assert_eq!(context.client_js_path(), "/__livereload/client.js");
        assert!(context.client_js().contains("new EventSource(\"/__livereload\")"));
        assert!(context.client_js().contains("/reload/"));
        assert!(!context.client_js().contains("__LR_ENDPOINT__"));
    }

    #[test]
    fn test_production_context_is_empty() {
        let context = ReloadContext::new(Mode::Production, "/__livereload");

        assert!(!context.enabled());
        assert!(context.script().is_empty());
        assert!(context.client_js().is_empty());
    }

    #[test]
    fn test_endpoint_is_escaped_in_script() {
        let js = render_client_js("/a\"b</script>");
        assert!(js.contains(r#""/a\"b<\/script>""#));
    }
}
