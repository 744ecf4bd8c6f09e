//! Exposes a [`ZabbixHost`] to templates as `zbx`.

use minijinja::value::{Object, Value};
use minijinja::{Error, ErrorKind, State};
use std::sync::Arc;

use crate::zabbix::ZabbixHost;

/// Template view of a host.
///
/// Methods mirror the host accessors (`zbx.hostname()`, `zbx.tag('env')`).
/// Attribute access reads raw `host.get` fields (`zbx.hostid`).
#[derive(Debug)]
pub struct HostObject {
    host: ZabbixHost,
}

impl HostObject {
    pub fn new(host: ZabbixHost) -> Self {
        Self { host }
    }

    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl Object for HostObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        self.host.raw().get(name).map(Value::from_serialize)
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let result = match method {
            "hostname" => no_args(method, args).map(|_| self.host.hostname()),
            "visiblename" => no_args(method, args).map(|_| self.host.visiblename()),
            "groups" => no_args(method, args).map(|_| self.host.groups()),
            "templates" => no_args(method, args).map(|_| self.host.templates()),
            "tag" => str_arg(method, args).map(|name| self.host.tag(name)),
            "inventory" => str_arg(method, args).map(|key| self.host.inventory(key)),
            "interface" => str_arg(method, args).map(|key| self.host.interface(key)),
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("zbx.{}() is not supported", method),
            )),
        }?;
        Ok(Value::from(result))
    }
}

fn no_args(method: &str, args: &[Value]) -> Result<(), Error> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::TooManyArguments,
            format!("zbx.{}() takes no arguments", method),
        ))
    }
}

fn str_arg<'a>(method: &str, args: &'a [Value]) -> Result<&'a str, Error> {
    match args {
        [value] => value.as_str().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("zbx.{}() expects a string argument", method),
            )
        }),
        [] => Err(Error::new(
            ErrorKind::MissingArgument,
            format!("zbx.{}() expects one argument", method),
        )),
        _ => Err(Error::new(
            ErrorKind::TooManyArguments,
            format!("zbx.{}() expects one argument", method),
        )),
    }
}
