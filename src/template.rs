use crate::{
    digest::RepoDigest,
    error::{Error, Result},
    fallback::LinkSection,
    material::RepositoryMaterial,
};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera, Value};

const PROMPT_TEMPLATE: &str = "prompt";
const LLMS_TEMPLATE: &str = "llms";

const DEFAULT_REMEMBER: [&str; 3] = [
    "Install + Quickstart first",
    "Core concepts & API surface",
    "Use Tutorials for worked examples",
];
const REMEMBER_PADDING: [&str; 2] = ["Review API reference", "See Optional for meta docs"];
const MAX_REMEMBER: usize = 6;
const MIN_REMEMBER: usize = 3;
const MISSING_PURPOSE: &str = "Project overview unavailable.";

#[derive(Serialize)]
struct PromptContext<'a> {
    project_name: &'a str,
    repo_url: &'a str,
    default_branch: &'a str,
    file_tree: &'a str,
    readme_content: &'a str,
    package_files: &'a str,
    digest: &'a RepoDigest,
}

#[derive(Serialize)]
struct LlmsContext<'a> {
    project_name: &'a str,
    purpose: &'a str,
    remember: Vec<String>,
    sections: &'a [LinkSection],
}

/// Renders generation prompts and `llms.txt` markdown.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Creates an engine with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in template fails to parse.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        Self::register_builtin_templates(&mut tera)?;
        Self::register_filters(&mut tera);

        Ok(Self { tera })
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        tera.add_raw_template(PROMPT_TEMPLATE, include_str!("../templates/prompt.tera"))
            .map_err(|e| Error::template(PROMPT_TEMPLATE, e))?;

        tera.add_raw_template(LLMS_TEMPLATE, include_str!("../templates/llms.tera"))
            .map_err(|e| Error::template(LLMS_TEMPLATE, e))?;

        Ok(())
    }

    fn register_filters(tera: &mut Tera) {
        tera.register_filter("json_encode", Self::json_encode_filter);
        tera.register_filter("oneline", Self::oneline_filter);
    }

    /// JSON encode filter, optionally pretty-printed.
    fn json_encode_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let pretty = args
            .get("pretty")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let result = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        result
            .map(Value::String)
            .map_err(|e| tera::Error::msg(format!("Failed to encode JSON: {e}")))
    }

    /// Folds multi-line text onto one line.
    fn oneline_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(value.as_str().map_or_else(
            || value.clone(),
            |s| Value::String(s.trim().replace('\n', " ")),
        ))
    }

    fn render(&self, template: &str, context: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(context).map_err(|e| Error::template(template, e))?;
        self.tera
            .render(template, &context)
            .map_err(|e| Error::template(template, e))
    }

    /// Renders the prompt sent to the language model.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_prompt(
        &self,
        project_name: &str,
        material: &RepositoryMaterial,
        digest: &RepoDigest,
    ) -> Result<String> {
        self.render(
            PROMPT_TEMPLATE,
            &PromptContext {
                project_name,
                repo_url: &material.repo_url,
                default_branch: &material.default_branch,
                file_tree: &material.file_tree,
                readme_content: &material.readme_content,
                package_files: &material.package_files,
                digest,
            },
        )
    }

    /// Renders an `llms.txt` document.
    ///
    /// Remember bullets lose trailing periods and are capped at six; fewer
    /// than three are padded with generic advice. Sections without links
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_llms_markdown(
        &self,
        project_name: &str,
        purpose: &str,
        remember: &[String],
        sections: &[LinkSection],
    ) -> Result<String> {
        let purpose = purpose.trim();
        let rendered = self.render(
            LLMS_TEMPLATE,
            &LlmsContext {
                project_name,
                purpose: if purpose.is_empty() { MISSING_PURPOSE } else { purpose },
                remember: normalize_remember(remember),
                sections,
            },
        )?;
        Ok(rendered.trim().to_string())
    }
}

fn normalize_remember(bullets: &[String]) -> Vec<String> {
    let mut out: Vec<String> = bullets
        .iter()
        .map(|b| b.trim().trim_end_matches('.').to_string())
        .filter(|b| !b.is_empty())
        .take(MAX_REMEMBER)
        .collect();

    if out.is_empty() {
        return DEFAULT_REMEMBER.iter().map(ToString::to_string).collect();
    }
    if out.len() < MIN_REMEMBER {
        let missing = MIN_REMEMBER - out.len();
        out.extend(REMEMBER_PADDING.iter().take(missing).map(ToString::to_string));
    }
    out
}
