use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tera::{Context, Tera, Value};
use thiserror::Error;

use crate::address::is_contained;
use crate::markdown::markdown_to_html;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot load templates from {}: {}", dir.display(), chain(source))]
    Load { dir: PathBuf, source: tera::Error },
    #[error("template {0:?} not found")]
    NotFound(String),
    #[error("template data for {template:?} must be a JSON object")]
    Data { template: String },
    #[error("cannot render template {template:?}: {}", chain(source))]
    Render { template: String, source: tera::Error },
}

/// Tera nests the useful message (parse location, missing variable) in the
/// error's source chain.
fn chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Renders page templates from a template root.
///
/// Every `*.html` file below the root is parsed once when the renderer is
/// created, so templates may `extend` or `include` each other. A template
/// id `home` refers to `<root>/home.html`. Templates can pull in
/// `<root>/<name>.md` as HTML with `markdown_to_html(name="<name>")`.
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new<P: AsRef<Path>>(templates_dir: P) -> Result<Self, TemplateError> {
        let dir = templates_dir.as_ref().to_path_buf();
        let glob = dir.join("**").join("*.html");

        let mut tera = Tera::new(&glob.to_string_lossy()).map_err(|source| TemplateError::Load {
            dir: dir.clone(),
            source,
        })?;
        tera.register_function("markdown_to_html", markdown_function(dir));

        Ok(Self { tera })
    }

    /// Looks up a parsed template so it can be executed repeatedly.
    pub fn template(&self, id: &str) -> Result<PageRenderer<'_>, TemplateError> {
        let name = format!("{id}.html");
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(TemplateError::NotFound(id.to_string()));
        }

        Ok(PageRenderer {
            tera: &self.tera,
            name,
        })
    }
}

/// One parsed template, executed once per output.
pub struct PageRenderer<'a> {
    tera: &'a Tera,
    name: String,
}

impl PageRenderer<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the template with `data` as the root context.
    pub fn render_to<W: Write>(&self, data: &Value, out: W) -> Result<(), TemplateError> {
        let context = match data {
            Value::Null => Context::new(),
            Value::Object(_) => {
                Context::from_value(data.clone()).map_err(|_| TemplateError::Data {
                    template: self.name.clone(),
                })?
            }
            _ => {
                return Err(TemplateError::Data {
                    template: self.name.clone(),
                });
            }
        };

        self.tera
            .render_to(&self.name, &context, out)
            .map_err(|source| TemplateError::Render {
                template: self.name.clone(),
                source,
            })
    }
}

fn markdown_function(
    dir: PathBuf,
) -> impl Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static {
    move |args| {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("markdown_to_html requires a `name` argument"))?;
        if !is_contained(name) {
            return Err(tera::Error::msg(format!("markdown_to_html: invalid name {name:?}")));
        }

        let filename = dir.join(format!("{name}.md"));
        let content = std::fs::read_to_string(&filename).map_err(|e| {
            tera::Error::msg(format!("cannot read markdown {}: {e}", filename.display()))
        })?;

        Ok(Value::String(markdown_to_html(&content)))
    }
}
