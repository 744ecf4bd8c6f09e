//! Zabbix API access.
//!
//! The export pipeline talks to Zabbix through [`HostSource`], implemented
//! over JSON-RPC by [`ZabbixClient`].

mod client;
mod host;

pub use client::{api_endpoint, host_detail_params, host_id_params, ZabbixClient};
pub use host::ZabbixHost;

use async_trait::async_trait;

use crate::config::TagFilter;
use crate::error::Result;

/// Server-side host selection for `host.get`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostQuery {
    /// Restrict to hosts in any of these groups.
    pub group_ids: Option<Vec<String>>,
    /// Restrict to hosts linked to any of these templates.
    pub template_ids: Option<Vec<String>>,
    /// Tag conditions (operator "contains").
    pub tags: Vec<TagFilter>,
}

/// Source of hosts for the export pipeline.
#[async_trait]
pub trait HostSource: Send + Sync {
    /// Map host group names to group ids.
    async fn resolve_group_ids(&self, names: &[String]) -> Result<Vec<String>>;

    /// Map template names to template ids.
    async fn resolve_template_ids(&self, names: &[String]) -> Result<Vec<String>>;

    /// List the ids of hosts matching the query.
    async fn list_host_ids(&self, query: &HostQuery) -> Result<Vec<String>>;

    /// Fetch full host details (inventory, groups, tags, templates, interfaces).
    async fn fetch_hosts(&self, ids: &[String]) -> Result<Vec<ZabbixHost>>;
}
