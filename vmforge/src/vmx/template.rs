//! Minimal `{{ .Field }}` text templates.
//!
//! Data is bound by serializing a record with serde and looking fields up
//! by name. Strings render with descriptor value escaping so the output is
//! always valid `key = "value"` text. Numbers render in decimal, booleans
//! as `TRUE`/`FALSE`, and `null` as an empty string. Referencing a field
//! the record does not have is an error, as is any stray `{{` or `}}`.

use super::document::escape;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: String,
}

impl Template {
    /// Parse and syntax-check a template.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> VmforgeResult<Self> {
        let template = Self {
            name: name.into(),
            source: source.into(),
        };
        template.check_syntax()?;
        Ok(template)
    }

    pub fn from_file(path: &Path) -> VmforgeResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            VmforgeError::Template(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(path.display().to_string(), source)
    }

    /// Append raw template text. The result is syntax-checked again.
    pub fn append(&self, text: &str) -> VmforgeResult<Self> {
        let mut source = self.source.clone();
        if !source.is_empty() && !source.ends_with('\n') {
            source.push('\n');
        }
        source.push_str(text);
        Self::parse(self.name.clone(), source)
    }

    pub fn render<T: Serialize>(&self, data: &T) -> VmforgeResult<String> {
        let value = serde_json::to_value(data)?;
        let Value::Object(fields) = value else {
            return Err(VmforgeError::Internal(format!(
                "template data for {} must serialize to an object",
                self.name
            )));
        };

        let mut out = String::with_capacity(self.source.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&self.source) {
            let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&self.source[last..whole.start()]);
            let value = fields.get(field.as_str()).ok_or_else(|| {
                VmforgeError::Template(format!(
                    "{}: unknown field .{} at byte {}",
                    self.name,
                    field.as_str(),
                    whole.start()
                ))
            })?;
            out.push_str(&render_value(value, &self.name, field.as_str())?);
            last = whole.end();
        }
        out.push_str(&self.source[last..]);
        Ok(out)
    }

    fn check_syntax(&self) -> VmforgeResult<()> {
        let stripped = PLACEHOLDER.replace_all(&self.source, "");
        for (line_no, line) in stripped.lines().enumerate() {
            if line.contains("{{") || line.contains("}}") {
                return Err(VmforgeError::Template(format!(
                    "{}: malformed placeholder on line {}",
                    self.name,
                    line_no + 1
                )));
            }
        }
        Ok(())
    }
}

fn render_value(value: &Value, template: &str, field: &str) -> VmforgeResult<String> {
    match value {
        Value::String(s) => Ok(escape(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(VmforgeError::Template(format!(
            "{}: field .{} is not a scalar",
            template, field
        ))),
    }
}
