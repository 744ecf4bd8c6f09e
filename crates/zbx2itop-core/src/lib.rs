//! Zabbix to iTop export library.
//!
//! This crate provides:
//! - YAML export configuration with static/template/map columns
//! - A Zabbix JSON-RPC client behind the [`HostSource`] trait
//! - Host filtering, row mapping and unique-key deduplication
//! - CSV rendering in the iTop import layout
//! - Execution of external import commands

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod mapping;
pub mod template;
pub mod writer;
pub mod zabbix;

pub use config::{Column, ExportConfig, OutputConfig, TagFilter, ZabbixOptions};
pub use error::{ExportError, Result};
pub use export::{ExportOptions, ExportRun, Exporter, OutputReport, OutputStatus};
pub use import::{ImportCommand, ImportOutcome};
pub use mapping::{Row, RowBuilder, RowSet};
pub use template::TemplateEngine;
pub use zabbix::{HostQuery, HostSource, ZabbixClient, ZabbixHost};
