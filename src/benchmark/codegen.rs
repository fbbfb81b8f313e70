//! Source generation from case templates
//!
//! Templates mark substitution points with `{{ name }}`. Rendering is a pure
//! transform from template text and bindings to source text; writing the
//! result to disk belongs to the build and execution drivers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;

use crate::error::{AppError, AppResult};
use crate::models::{BenchmarkCase, InputSpec};
use crate::utils::{byte_len, render_byte_array, render_let_binding};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Placeholder name to substituted text
pub type Bindings = BTreeMap<String, String>;

/// A parsed source template
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    origin: String,
}

/// Piece of a template: literal text or a placeholder name
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            origin: "<inline>".to_string(),
        }
    }

    /// Load a template file
    pub async fn from_file(path: &Path) -> AppResult<Self> {
        let source = fs::read_to_string(path).await.map_err(|e| {
            AppError::Template(format!("cannot read template {}: {}", path.display(), e))
        })?;
        Ok(Self {
            source,
            origin: path.display().to_string(),
        })
    }

    fn segments(&self) -> AppResult<Vec<Segment<'_>>> {
        let mut segments = Vec::new();
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Text(&rest[..start]));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| {
                AppError::Template(format!("{}: unclosed placeholder", self.origin))
            })?;

            let name = after_open[..end].trim();
            if !IDENT.is_match(name) {
                return Err(AppError::Template(format!(
                    "{}: invalid placeholder {{{{{}}}}}",
                    self.origin,
                    &after_open[..end]
                )));
            }
            segments.push(Segment::Placeholder(name));
            rest = &after_open[end + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }
        Ok(segments)
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.segments()? {
            if let Segment::Placeholder(name) = segment {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Substitute every placeholder; unbound names are an error
    pub fn render(&self, bindings: &Bindings) -> AppResult<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in self.segments()? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = bindings.get(name).ok_or_else(|| {
                        AppError::Template(format!(
                            "{}: unresolved placeholder {:?}",
                            self.origin, name
                        ))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn common_bindings(case: &BenchmarkCase, spec: &InputSpec) -> AppResult<Bindings> {
    let mut bindings = Bindings::new();
    bindings.insert("case".to_string(), case.name.clone());
    bindings.insert("name".to_string(), spec.name.clone());
    bindings.insert("input_len".to_string(), byte_len(&spec.input)?.to_string());
    bindings.insert("expected_len".to_string(), byte_len(&spec.expected)?.to_string());
    Ok(bindings)
}

/// Bindings for the Rust template: `input`/`expected` are array declarations
pub fn native_bindings(case: &BenchmarkCase, spec: &InputSpec) -> AppResult<Bindings> {
    let mut bindings = common_bindings(case, spec)?;
    bindings.insert("input".to_string(), render_let_binding("input", &spec.input)?);
    bindings.insert(
        "expected".to_string(),
        render_let_binding("expected", &spec.expected)?,
    );
    bindings.insert("input_bytes".to_string(), render_byte_array(&spec.input)?);
    bindings.insert("expected_bytes".to_string(), render_byte_array(&spec.expected)?);
    Ok(bindings)
}

/// Bindings for the Go harness: `input`/`expected` stay hex strings
pub fn vm_bindings(case: &BenchmarkCase, spec: &InputSpec) -> AppResult<Bindings> {
    let mut bindings = common_bindings(case, spec)?;
    bindings.insert("input".to_string(), spec.input.clone());
    bindings.insert("expected".to_string(), spec.expected.clone());
    Ok(bindings)
}

/// Load `path` and render it with `bindings`
pub async fn render_file(path: &Path, bindings: &Bindings) -> AppResult<String> {
    Template::from_file(path).await?.render(bindings)
}
