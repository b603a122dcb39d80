use minibridge::{EngineError, Minifier, Output};
use minify_html::{Cfg, minify};

/// HTML minifier with inline CSS and JS minification turned on.
///
/// The result is copied back into the caller's buffer whenever it fits, which
/// is the common case since minification rarely grows a document.
pub struct HtmlMinifier {
    cfg: Cfg,
}

impl HtmlMinifier {
    pub fn new() -> Self {
        Self {
            cfg: Cfg {
                minify_css: true,
                minify_js: true,
                // Leave `{{ }}` and `{% %}` template markers intact
                preserve_brace_template_syntax: true,
                ..Cfg::default()
            },
        }
    }

    /// Minifies `input` directly, bypassing the worker pool. Used to verify
    /// results that went through the bridge.
    pub fn reference(&self, input: &[u8]) -> Vec<u8> {
        minify(input, &self.cfg)
    }
}

impl Default for HtmlMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Minifier for HtmlMinifier {
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
        if let Err(e) = core::str::from_utf8(&input) {
            return Err(EngineError::transform(format!("input is not UTF-8: {e}")));
        }
        let minified = minify(&input, &self.cfg);
        Ok(Output::write_into(input, &minified))
    }
}
