//! `{{TOKEN}}` substitution for scenario fields.
//!
//! The context is an explicit map handed to every call; nothing is read from
//! process-wide state. Unknown tokens are left verbatim.
use std::collections::BTreeMap;

pub const CASE_TMP: &str = "CASE_TMP";
pub const PROJECT_ROOT: &str = "PROJECT_ROOT";
pub const HOME: &str = "HOME";
pub const CONFIG_HOME: &str = "CONFIG_HOME";
pub const STEP_INDEX: &str = "STEP_INDEX";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Single left-to-right pass, so substituted values are never re-scanned.
    pub fn render_str(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            let name = &after_open[..end];
            match self.values.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after_open[end + 2..];
        }
        out.push_str(rest);
        out
    }
}

/// Values whose string leaves can be rendered against a context.
pub trait Render {
    fn render(&self, context: &RenderContext) -> Self;
}

impl Render for String {
    fn render(&self, context: &RenderContext) -> Self {
        context.render_str(self)
    }
}

impl<T: Render> Render for Vec<T> {
    fn render(&self, context: &RenderContext) -> Self {
        self.iter().map(|item| item.render(context)).collect()
    }
}

impl<T: Render> Render for BTreeMap<String, T> {
    fn render(&self, context: &RenderContext) -> Self {
        self.iter()
            .map(|(key, value)| (key.clone(), value.render(context)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        RenderContext::new()
            .with(CASE_TMP, "/tmp/case")
            .with(HOME, "/tmp/home")
    }

    #[test]
    fn replaces_known_tokens_everywhere() {
        let out = context().render_str("{{CASE_TMP}}/a:{{HOME}}:{{CASE_TMP}}");
        assert_eq!(out, "/tmp/case/a:/tmp/home:/tmp/case");
    }

    #[test]
    fn leaves_unknown_and_unterminated_tokens_verbatim() {
        assert_eq!(
            context().render_str("{{NOPE}} {{CASE_TMP}} {{open"),
            "{{NOPE}} /tmp/case {{open"
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let context = RenderContext::new()
            .with("A", "{{B}}")
            .with("B", "x");
        assert_eq!(context.render_str("{{A}}"), "{{B}}");
    }

    #[test]
    fn renders_nested_collections() {
        let mut env = BTreeMap::new();
        env.insert("CFG".to_string(), "{{HOME}}/.cfg".to_string());
        let rendered = env.render(&context());
        assert_eq!(rendered["CFG"], "/tmp/home/.cfg");

        let args = vec!["--dir".to_string(), "{{CASE_TMP}}".to_string()];
        assert_eq!(args.render(&context()), vec!["--dir", "/tmp/case"]);
    }
}
