//! Read-only view over a host object returned by `host.get`.

use serde_json::{Map, Value};

use crate::config::OutputConfig;

/// Accessors available to `map` columns and to templates as `zbx.<name>`.
const ACCESSORS: &[(&str, &str)] = &[
    ("hostname", "technical host name"),
    ("visiblename", "visible name"),
    ("groups", "host group names, comma separated"),
    ("templates", "linked template names, comma separated"),
    ("tag(name)", "value of the first tag with this name"),
    ("inventory(key)", "inventory field"),
    (
        "interface(key)",
        "first non-empty interface field (ip, dns, port, ...); 'host' and 'domain' split the DNS name",
    ),
];

/// A Zabbix host as fetched with the extended selects.
#[derive(Debug, Clone)]
pub struct ZabbixHost {
    raw: Map<String, Value>,
}

impl ZabbixHost {
    /// Build from any JSON value; non-objects become an empty host.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(raw) => Self { raw },
            _ => Self { raw: Map::new() },
        }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Technical host name.
    pub fn hostname(&self) -> String {
        self.str_field("host")
    }

    /// Visible name.
    pub fn visiblename(&self) -> String {
        self.str_field("name")
    }

    /// Value of the first tag named `name`.
    pub fn tag(&self, name: &str) -> String {
        self.list("tags")
            .find(|t| t.get("tag").and_then(Value::as_str) == Some(name))
            .and_then(|t| t.get("value").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    }

    /// Inventory field. Hosts without inventory return `[]` here instead of an object.
    pub fn inventory(&self, key: &str) -> String {
        self.raw
            .get("inventory")
            .and_then(Value::as_object)
            .and_then(|inv| inv.get(key))
            .map(scalar_to_string)
            .unwrap_or_default()
    }

    pub fn groups(&self) -> String {
        self.names("hostgroups", "name").join(",")
    }

    pub fn templates(&self) -> String {
        self.names("parentTemplates", "name").join(",")
    }

    /// Interface lookup; `host` and `domain` split the first DNS name.
    pub fn interface(&self, key: &str) -> String {
        match key {
            "domain" => match self.interface("dns").split_once('.') {
                Some((_, rest)) if !rest.is_empty() => {
                    if rest.ends_with('.') {
                        rest.to_string()
                    } else {
                        format!("{}.", rest)
                    }
                }
                _ => String::new(),
            },
            "host" => self
                .interface("dns")
                .split_once('.')
                .map(|(host, _)| host.to_string())
                .unwrap_or_default(),
            _ => self
                .list("interfaces")
                .filter_map(|intf| intf.get(key))
                .map(scalar_to_string)
                .find(|v| !v.is_empty())
                .unwrap_or_default(),
        }
    }

    /// Raw top-level field rendered as text.
    pub fn field(&self, name: &str) -> Option<String> {
        self.raw.get(name).map(scalar_to_string)
    }

    /// Resolve a `map` column path such as `inventory.os` or `hostname`.
    ///
    /// Unknown paths fall back to a raw field lookup and then to "".
    pub fn resolve(&self, path: &str) -> String {
        if let Some((prefix, key)) = path.split_once('.') {
            return match prefix {
                "tag" => self.tag(key),
                "inventory" => self.inventory(key),
                "interface" => self.interface(key),
                _ => {
                    tracing::debug!(path, "unknown accessor prefix in map column");
                    String::new()
                }
            };
        }
        match path {
            "hostname" => self.hostname(),
            "visiblename" => self.visiblename(),
            "groups" => self.groups(),
            "templates" => self.templates(),
            _ => self.field(path).unwrap_or_default(),
        }
    }

    /// Check the host against the output's exclusion filters.
    pub fn matches(&self, output: &OutputConfig) -> bool {
        for excluded in &output.excluded_tags {
            let hit = self.list("tags").any(|t| {
                t.get("tag").and_then(Value::as_str) == Some(excluded.name.as_str())
                    && t.get("value").and_then(Value::as_str) == Some(excluded.value.as_str())
            });
            if hit {
                return false;
            }
        }
        let groups = self.names("hostgroups", "name");
        if output
            .excluded_groups
            .iter()
            .any(|eg| groups.iter().any(|g| g == eg))
        {
            return false;
        }
        true
    }

    /// Human-readable list of supported accessors.
    pub fn describe() -> String {
        let mut lines = vec!["Available items for zabbix host:".to_string()];
        for (name, doc) in ACCESSORS {
            lines.push(format!("{} → {}", name, doc));
        }
        lines.push("<field> → any raw host.get field (host, hostid, status, ...)".to_string());
        lines.join("\n")
    }

    fn str_field(&self, name: &str) -> String {
        self.raw
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn list(&self, name: &str) -> impl Iterator<Item = &Map<String, Value>> {
        self.raw
            .get(name)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    fn names(&self, list: &str, key: &str) -> Vec<String> {
        self.list(list)
            .filter_map(|item| item.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

impl std::fmt::Display for ZabbixHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hostname())
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
