//! Prompt templating.
//!
//! Model-call nodes render `prompt` and `system` strings with Handlebars,
//! using the data document as context. Escaping is disabled: prompts are
//! plain text, not HTML.

use handlebars::Handlebars;
use once_cell::sync::Lazy;

use crate::error::{Result, WorkflowError};
use crate::model::Document;

static REGISTRY: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
});

pub fn render(template: &str, data: &Document) -> Result<String> {
    REGISTRY
        .render_template(template, data)
        .map_err(|e| WorkflowError::Template {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_plain() {
        let data = Document::new();
        assert_eq!(render("hello", &data).unwrap(), "hello");
    }

    #[test]
    fn test_render_variables() {
        let data = json!({"name": "World", "nested": {"n": 2}})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(
            render("Hello {{name}} x{{nested.n}}", &data).unwrap(),
            "Hello World x2"
        );
    }

    #[test]
    fn test_render_no_escaping() {
        let data = json!({"q": "a < b & c"}).as_object().unwrap().clone();
        assert_eq!(render("{{q}}", &data).unwrap(), "a < b & c");
    }
}
