use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::ast::Tree;
use crate::error::{ExecError, ParseError, TemplateError};
use crate::exec::{ExecOptions, State};
use crate::parse;
use crate::value::Value;

/// A compiled template together with every template its source defines.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    text: String,
    trees: BTreeMap<String, Tree>,
}

impl Template {
    pub fn parse(name: &str, text: &str) -> Result<Self, ParseError> {
        let trees = parse::parse(name, text)?;
        Ok(Self {
            name: name.to_string(),
            text: text.to_string(),
            trees,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    /// Names of the templates available to `{{template}}`, sorted.
    pub fn defined_templates(&self) -> Vec<&str> {
        self.trees.keys().map(String::as_str).collect()
    }

    /// Executes the top-level template with `data` as dot. A JSON `null`
    /// document executes with no value at all.
    pub fn execute(&self, data: &Json, opts: &ExecOptions) -> Result<String, ExecError> {
        let tree = self.trees.get(&self.name).ok_or_else(|| ExecError {
            message: format!(
                "template: {}: {} is an incomplete or empty template",
                self.name,
                crate::format::go_quote(&self.name)
            ),
        })?;
        let dot = match data {
            Json::Null => Value::Missing,
            other => Value::from_json(other),
        };
        State::new(&self.name, &self.text, &self.trees, opts).run(tree, dot)
    }
}

/// Parses and executes `text` in one step with default options.
pub fn render(name: &str, text: &str, data: &Json) -> Result<String, TemplateError> {
    let template = Template::parse(name, text)?;
    Ok(template.execute(data, &ExecOptions::default())?)
}
