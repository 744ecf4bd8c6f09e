//! Column and filter definitions for an output block.

use serde::Deserialize;

use crate::error::ExportError;

/// One destination column of an output.
///
/// In YAML each entry is a single-key mapping naming the column kind:
///
/// ```yaml
/// - static:   { itop: "Organization->Name", value: "Org1" }
/// - template: { itop: "Description", value: "{{ zbx.hostname() }}" }
/// - map:      { itop: "OS family->Name", zabbix: "inventory.os_short" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawColumn")]
pub enum Column {
    /// Same literal value for every host.
    Static { itop: String, value: String },
    /// Jinja template rendered against the host (`zbx`).
    Template { itop: String, template: String },
    /// Direct lookup of a host accessor path such as `inventory.os`.
    Map { itop: String, zabbix: String },
}

impl Column {
    /// Destination iTop attribute name.
    pub fn itop(&self) -> &str {
        match self {
            Column::Static { itop, .. } | Column::Template { itop, .. } | Column::Map { itop, .. } => {
                itop
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawColumn {
    #[serde(rename = "static", default)]
    fixed: Option<ValueSpec>,
    #[serde(default)]
    template: Option<ValueSpec>,
    #[serde(default)]
    map: Option<MapSpec>,
}

#[derive(Debug, Deserialize)]
struct ValueSpec {
    itop: String,
    #[serde(default)]
    value: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct MapSpec {
    itop: String,
    zabbix: String,
}

impl TryFrom<RawColumn> for Column {
    type Error = ExportError;

    fn try_from(raw: RawColumn) -> Result<Self, Self::Error> {
        match (raw.fixed, raw.template, raw.map) {
            (Some(spec), None, None) => Ok(Column::Static {
                value: scalar_to_string(&spec.itop, spec.value)?,
                itop: spec.itop,
            }),
            (None, Some(spec), None) => Ok(Column::Template {
                template: scalar_to_string(&spec.itop, spec.value)?,
                itop: spec.itop,
            }),
            (None, None, Some(spec)) => Ok(Column::Map {
                itop: spec.itop,
                zabbix: spec.zabbix,
            }),
            (None, None, None) => Err(ExportError::Config(
                "column entry must be one of 'static', 'template' or 'map'".to_string(),
            )),
            _ => Err(ExportError::Config(
                "column entry must define exactly one of 'static', 'template' or 'map'"
                    .to_string(),
            )),
        }
    }
}

fn scalar_to_string(itop: &str, value: Option<serde_yaml::Value>) -> Result<String, ExportError> {
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(String::new()),
        Some(serde_yaml::Value::String(s)) => Ok(s),
        Some(serde_yaml::Value::Bool(b)) => Ok(b.to_string()),
        Some(serde_yaml::Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ExportError::Config(format!(
            "value of column '{}' must be a scalar",
            itop
        ))),
    }
}

/// A `name=value` tag condition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TagFilter {
    pub name: String,
    pub value: String,
}

impl TagFilter {
    /// Parse `name=value`. The value may be empty and may itself contain `=`.
    pub fn parse(s: &str) -> Result<Self, ExportError> {
        let (name, value) = s.split_once('=').ok_or_else(|| {
            ExportError::Config(format!("tag filter '{}' must be written as name=value", s))
        })?;
        if name.is_empty() {
            return Err(ExportError::Config(format!(
                "tag filter '{}' has an empty tag name",
                s
            )));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl TryFrom<String> for TagFilter {
    type Error = ExportError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl std::fmt::Display for TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}
