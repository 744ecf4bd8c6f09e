//! Template engine implementation using minijinja.

use minijinja::{context, AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use std::path::Path;

use super::host_object::HostObject;
use crate::error::{ExportError, Result};
use crate::zabbix::ZabbixHost;

/// Jinja2-compatible engine for template columns and import commands.
///
/// Undefined values are errors, so a typo such as `zbx.hostnmae` fails the
/// export instead of producing empty cells.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        Self { env }
    }

    /// Compile a named template for repeated rendering.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| ExportError::Template(format!("template '{}': {}", name, e)))
    }

    /// Render a compiled template with `zbx` bound to the host.
    pub fn render_host(&self, name: &str, host: &ZabbixHost) -> Result<String> {
        let tmpl = self.env.get_template(name)?;
        let zbx = HostObject::new(host.clone()).into_value();
        tmpl.render(context! { zbx => zbx }).map_err(|e| {
            let mut msg = format!("host '{}', template '{}': {}", host, name, e);
            if matches!(e.kind(), ErrorKind::UndefinedError | ErrorKind::UnknownMethod) {
                msg.push('\n');
                msg.push_str(&ZabbixHost::describe());
            }
            ExportError::Template(msg)
        })
    }

    /// Render an import command with `outfile` bound.
    pub fn render_import_command(&self, command: &str, outfile: &Path) -> Result<String> {
        let outfile = outfile.display().to_string();
        Ok(self.env.render_str(command, context! { outfile => outfile })?)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
