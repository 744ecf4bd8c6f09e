//! Export configuration.
//!
//! The configuration is a YAML file with two top-level sections:
//!
//! ```yaml
//! options:
//!   url: https://zabbix.example.com
//!   user: reader
//!   password: secret
//! outputs:
//!   servers:
//!     outfile: servers.csv
//!     required_groups: [Linux servers]
//!     excluded_tags: [env=lab]
//!     unique: [Name]
//!     columns:
//!       - map: { itop: Name, zabbix: hostname }
//! ```
//!
//! Connection settings can be overridden with `ZABBIX_URL`, `ZABBIX_USER`,
//! `ZABBIX_PASSWORD` and `ZABBIX_TOKEN`.

mod column;

pub use column::{Column, TagFilter};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ExportError, Result};

/// Zabbix connection settings (`options` section).
#[derive(Clone, Deserialize)]
pub struct ZabbixOptions {
    /// Frontend URL, with or without the trailing `api_jsonrpc.php`.
    #[serde(default)]
    pub url: String,

    /// Login user (ignored when `token` is set).
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// API token, used instead of user/password.
    #[serde(default)]
    pub token: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Whether to verify the server TLS certificate.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_verify_tls() -> bool {
    true
}

impl Default for ZabbixOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: None,
            password: None,
            token: None,
            timeout_seconds: default_timeout_seconds(),
            verify_tls: default_verify_tls(),
        }
    }
}

impl std::fmt::Debug for ZabbixOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZabbixOptions")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// One output block: which hosts to select and how to render them.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// CSV file to write.
    pub outfile: PathBuf,

    /// Destination columns, in CSV order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<Column>,

    /// Host group names; hosts must be in one of them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_groups: Vec<String>,

    /// Template names; hosts must be linked to one of them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_templates: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub required_tags: Vec<TagFilter>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub excluded_groups: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub excluded_tags: Vec<TagFilter>,

    /// Destination attributes forming the row identity.
    #[serde(default, deserialize_with = "null_as_default")]
    pub unique: Vec<String>,

    /// Number of hosts fetched per `host.get` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Command run after the CSV is written; `{{ outfile }}` is available.
    #[serde(default)]
    pub import_cmd: Option<String>,

    /// Kill the import command after this many seconds.
    #[serde(default)]
    pub import_timeout_seconds: Option<u64>,

    /// CSV field separator.
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_batch_size() -> usize {
    100
}

fn default_separator() -> char {
    ','
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl OutputConfig {
    /// Destination attribute names in column order.
    ///
    /// Fails when two columns target the same attribute.
    pub fn destination_columns(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            if !seen.insert(column.itop()) {
                return Err(ExportError::Config(format!(
                    "Destination itop attributes are not unique: '{}' is repeated",
                    column.itop()
                )));
            }
            names.push(column.itop().to_string());
        }
        Ok(names)
    }

    /// Column positions of the `unique` keys, in `unique` order.
    pub fn unique_indices(&self) -> Result<Vec<usize>> {
        self.unique
            .iter()
            .map(|key| {
                self.columns
                    .iter()
                    .position(|c| c.itop() == key)
                    .ok_or_else(|| {
                        ExportError::Config(format!(
                            "unique key '{}' is not one of the output columns",
                            key
                        ))
                    })
            })
            .collect()
    }

    /// Whether a non-empty import command is configured.
    pub fn import_command(&self) -> Option<&str> {
        self.import_cmd.as_deref().filter(|cmd| !cmd.trim().is_empty())
    }

    fn validate(&self, name: &str) -> Result<()> {
        let ctx = |msg: String| ExportError::Config(format!("output '{}': {}", name, msg));

        if self.outfile.as_os_str().is_empty() {
            return Err(ctx("outfile is required".to_string()));
        }
        if self.columns.is_empty() {
            return Err(ctx("at least one column is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ctx("batch_size must be greater than zero".to_string()));
        }
        if !self.separator.is_ascii() {
            return Err(ctx(format!(
                "separator '{}' must be a single ASCII character",
                self.separator
            )));
        }
        if matches!(self.separator, '"' | '\r' | '\n') {
            return Err(ctx(format!(
                "separator {:?} clashes with CSV quoting or line endings",
                self.separator
            )));
        }
        self.destination_columns()
            .and_then(|_| self.unique_indices())
            .map_err(|e| match e {
                ExportError::Config(msg) => ctx(msg),
                other => other,
            })?;
        Ok(())
    }
}

/// Complete export configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub options: ZabbixOptions,

    /// Output blocks, processed in file order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub outputs: IndexMap<String, OutputConfig>,
}

impl ExportConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Io(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without validating.
    ///
    /// Rejected column or tag filter entries surface as `Config` errors
    /// carrying the YAML path of the entry.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            let msg = e.to_string();
            match msg.split_once("Configuration error: ") {
                Some((path, detail)) => ExportError::Config(format!("{}{}", path, detail)),
                None => e.into(),
            }
        })
    }

    /// Override connection settings from `ZABBIX_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override connection settings using an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ZABBIX_URL") {
            self.options.url = url;
        }
        if let Some(user) = lookup("ZABBIX_USER") {
            self.options.user = Some(user);
        }
        if let Some(password) = lookup("ZABBIX_PASSWORD") {
            self.options.password = Some(password);
        }
        if let Some(token) = lookup("ZABBIX_TOKEN") {
            self.options.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.options.url.trim().is_empty() {
            return Err(ExportError::Config("options.url is required".to_string()));
        }
        let has_token = self.options.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_user = self.options.user.as_deref().is_some_and(|u| !u.is_empty());
        if !has_token && !has_user {
            return Err(ExportError::Config(
                "either options.token or options.user must be set".to_string(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(ExportError::Config("no outputs configured".to_string()));
        }
        for (name, output) in &self.outputs {
            output.validate(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
options:
  url: "https://zabbix.example.com"
  user: "reader"
  password: "secret"
outputs:
  servers:
    outfile: "servers.csv"
    required_groups: ["Linux servers"]
    required_tags: ["env=prod"]
    excluded_tags: ["role=lab"]
    unique: ["Name"]
    batch_size: 50
    import_cmd: "import.sh {{ outfile }}"
    columns:
      - static: { itop: "Organization->Name", value: "Org1" }
      - map: { itop: "Name", zabbix: "hostname" }
  network:
    outfile: "network.csv"
    required_templates:
    columns:
      - template: { itop: "Description", value: "{{ zbx.visiblename() }}" }
"#;

    #[test]
    fn test_parse_sample() {
        let config = ExportConfig::from_yaml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.options.url, "https://zabbix.example.com");
        assert_eq!(config.options.timeout_seconds, 30);
        assert!(config.options.verify_tls);

        let names: Vec<&str> = config.outputs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["servers", "network"]);

        let servers = &config.outputs["servers"];
        assert_eq!(servers.batch_size, 50);
        assert_eq!(servers.required_tags[0].name, "env");
        assert_eq!(servers.excluded_tags[0].value, "lab");
        assert_eq!(servers.import_command(), Some("import.sh {{ outfile }}"));
        assert_eq!(
            servers.destination_columns().unwrap(),
            vec!["Organization->Name", "Name"]
        );
        assert_eq!(servers.unique_indices().unwrap(), vec![1]);

        let network = &config.outputs["network"];
        assert!(network.required_templates.is_empty());
        assert_eq!(network.batch_size, 100);
        assert_eq!(network.separator, ',');
        assert_eq!(network.import_command(), None);
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config =
            ExportConfig::from_yaml_str(include_str!("../../../../demos/zbx2itop.yaml")).unwrap();
        config.validate().unwrap();

        let network = &config.outputs["network_devices"];
        assert_eq!(network.separator, ';');
        assert_eq!(
            config.outputs["linux_servers"].import_timeout_seconds,
            Some(300)
        );
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let yaml = r#"
options: { url: "http://z", token: "abc" }
outputs:
  o:
    outfile: "o.csv"
    columns:
      - static: { itop: "Name", value: "a" }
      - map: { itop: "Name", zabbix: "hostname" }
"#;
        let config = ExportConfig::from_yaml_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not unique"));
        assert!(err.to_string().contains("output 'o'"));
    }

    #[test]
    fn test_unknown_unique_key_rejected() {
        let yaml = r#"
options: { url: "http://z", token: "abc" }
outputs:
  o:
    outfile: "o.csv"
    unique: ["Serial"]
    columns:
      - map: { itop: "Name", zabbix: "hostname" }
"#;
        let config = ExportConfig::from_yaml_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unique key 'Serial'"));
    }

    #[test]
    fn test_validation_errors() {
        let no_auth = r#"
options: { url: "http://z" }
outputs:
  o: { outfile: "o.csv", columns: [ { map: { itop: "Name", zabbix: "hostname" } } ] }
"#;
        let err = ExportConfig::from_yaml_str(no_auth).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("options.token or options.user"));

        let zero_batch = r#"
options: { url: "http://z", user: "u" }
outputs:
  o: { outfile: "o.csv", batch_size: 0, columns: [ { map: { itop: "Name", zabbix: "hostname" } } ] }
"#;
        let err = ExportConfig::from_yaml_str(zero_batch).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        let no_columns = r#"
options: { url: "http://z", user: "u" }
outputs:
  o: { outfile: "o.csv" }
"#;
        let err = ExportConfig::from_yaml_str(no_columns).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("at least one column"));

        let no_outputs = "options: { url: \"http://z\", user: \"u\" }\n";
        let err = ExportConfig::from_yaml_str(no_outputs).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("no outputs"));
    }

    #[test]
    fn test_bad_tag_filter_is_parse_error() {
        let yaml = r#"
outputs:
  o:
    outfile: "o.csv"
    excluded_tags: ["missing-separator"]
    columns: [ { map: { itop: "Name", zabbix: "hostname" } } ]
"#;
        let err = ExportConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ExportError::Config(_)), "got {:?}", err);
        assert!(err.to_string().contains("must be written as name=value"));
    }

    #[test]
    fn test_bad_column_kind_is_config_error() {
        let yaml = r#"
outputs:
  o:
    outfile: "o.csv"
    columns:
      - static: { itop: "Org", value: "x" }
        map: { itop: "Name", zabbix: "hostname" }
"#;
        let err = ExportConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ExportError::Config(_)), "got {:?}", err);
        assert!(err.to_string().contains("exactly one"));

        let yaml = r#"
outputs:
  o:
    outfile: "o.csv"
    columns: [ {} ]
"#;
        let err = ExportConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ExportError::Config(_)), "got {:?}", err);
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn test_plain_yaml_error_stays_yaml() {
        let err = ExportConfig::from_yaml_str("outputs: [unterminated").unwrap_err();
        assert!(matches!(err, ExportError::Yaml(_)), "got {:?}", err);
    }

    #[test]
    fn test_separator_clashing_with_csv_rejected() {
        for sep in ["'\"'", "\"\\n\"", "\"\\r\""] {
            let yaml = format!(
                r#"
options: {{ url: "http://z", user: "u" }}
outputs:
  o: {{ outfile: "o.csv", separator: {}, columns: [ {{ map: {{ itop: "Name", zabbix: "hostname" }} }} ] }}
"#,
                sep
            );
            let config = ExportConfig::from_yaml_str(&yaml).unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("clashes with CSV quoting"),
                "separator {}: {}",
                sep,
                err
            );
        }

        let tab = r#"
options: { url: "http://z", user: "u" }
outputs:
  o: { outfile: "o.csv", separator: "\t", columns: [ { map: { itop: "Name", zabbix: "hostname" } } ] }
"#;
        let config = ExportConfig::from_yaml_str(tab).unwrap();
        assert_eq!(config.outputs["o"].separator, '\t');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ExportConfig::from_yaml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("ZABBIX_URL", "https://other.example.com"),
            ("ZABBIX_TOKEN", "tok"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.options.url, "https://other.example.com");
        assert_eq!(config.options.token.as_deref(), Some("tok"));
        assert_eq!(config.options.user.as_deref(), Some("reader"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ExportConfig::from_yaml_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config.options);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ExportConfig::load(&path).unwrap();
        assert_eq!(config.outputs.len(), 2);

        let missing = ExportConfig::load(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ExportError::Io(_))));
    }
}
