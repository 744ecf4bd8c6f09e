//! Export pipeline: select hosts, build rows, write CSV, run imports.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ExportConfig, OutputConfig};
use crate::error::{ExportError, Result};
use crate::import::{ImportCommand, ImportOutcome};
use crate::mapping::{RowBuilder, RowSet};
use crate::writer::write_csv;
use crate::zabbix::{HostQuery, HostSource};

/// Run-wide switches, usually from the command line.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Leave outputs whose file already exists untouched.
    pub skip_existing: bool,
    /// Run `import_cmd` after writing each CSV.
    pub run_imports: bool,
    /// Restrict the run to these outputs (all when empty).
    pub only: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            skip_existing: false,
            run_imports: true,
            only: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// CSV written.
    Written,
    /// No host produced a row; nothing written.
    Empty,
    /// Output file already existed and `skip_existing` was set.
    SkippedExisting,
}

impl std::fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStatus::Written => write!(f, "written"),
            OutputStatus::Empty => write!(f, "empty"),
            OutputStatus::SkippedExisting => write!(f, "skipped"),
        }
    }
}

/// What happened to one output.
#[derive(Debug, Clone)]
pub struct OutputReport {
    pub name: String,
    pub outfile: PathBuf,
    pub status: OutputStatus,
    pub rows: usize,
    /// Hosts returned by Zabbix but dropped by exclusion filters.
    pub filtered: usize,
    /// Rows dropped as duplicates of an earlier unique key.
    pub duplicates: usize,
    pub import: Option<ImportOutcome>,
}

impl OutputReport {
    fn new(name: &str, output: &OutputConfig, status: OutputStatus) -> Self {
        Self {
            name: name.to_string(),
            outfile: output.outfile.clone(),
            status,
            rows: 0,
            filtered: 0,
            duplicates: 0,
            import: None,
        }
    }
}

/// Reports of the outputs that finished, and the error that stopped the run.
#[derive(Debug)]
pub struct ExportRun {
    pub reports: Vec<OutputReport>,
    pub error: Option<ExportError>,
}

impl ExportRun {
    pub fn into_result(self) -> Result<Vec<OutputReport>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.reports),
        }
    }
}

/// Drives the export of every configured output against a host source.
pub struct Exporter<'a, S: HostSource + ?Sized> {
    source: &'a S,
    options: ExportOptions,
}

impl<'a, S: HostSource + ?Sized> Exporter<'a, S> {
    pub fn new(source: &'a S, options: ExportOptions) -> Self {
        Self { source, options }
    }

    /// Export the selected outputs in configuration order.
    ///
    /// Stops at the first failing output; reports of earlier outputs are kept.
    pub async fn run(&self, config: &ExportConfig) -> ExportRun {
        let selected = match self.select_outputs(config) {
            Ok(selected) => selected,
            Err(e) => {
                return ExportRun {
                    reports: Vec::new(),
                    error: Some(e),
                }
            }
        };
        let total = selected.len();
        let mut reports = Vec::with_capacity(total);

        for (index, (name, output)) in selected.into_iter().enumerate() {
            tracing::info!(output = %name, index = index + 1, total, "Processing output");
            match self.export_output(name, output).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(output = %name, error = %e, "Output failed");
                    return ExportRun {
                        reports,
                        error: Some(e),
                    };
                }
            }
        }

        ExportRun {
            reports,
            error: None,
        }
    }

    fn select_outputs<'c>(
        &self,
        config: &'c ExportConfig,
    ) -> Result<Vec<(&'c String, &'c OutputConfig)>> {
        if let Some(unknown) = self
            .options
            .only
            .iter()
            .find(|name| !config.outputs.contains_key(name.as_str()))
        {
            return Err(ExportError::Config(format!("unknown output '{}'", unknown)));
        }
        Ok(config
            .outputs
            .iter()
            .filter(|(name, _)| self.options.only.is_empty() || self.options.only.contains(*name))
            .collect())
    }

    /// Export a single output.
    pub async fn export_output(&self, name: &str, output: &OutputConfig) -> Result<OutputReport> {
        if self.options.skip_existing && output.outfile.exists() {
            tracing::warn!(output = %name, outfile = %output.outfile.display(), "Skipping output (file already exists)");
            return Ok(OutputReport::new(name, output, OutputStatus::SkippedExisting));
        }

        let builder = RowBuilder::new(output)?;
        let mut rows = RowSet::new(output.unique_indices()?);
        let mut report = OutputReport::new(name, output, OutputStatus::Empty);

        if let Some(query) = self.build_query(name, output).await? {
            self.collect_rows(name, output, &query, &builder, &mut rows, &mut report)
                .await?;
        }

        report.rows = rows.len();
        if rows.is_empty() {
            tracing::warn!(output = %name, outfile = %output.outfile.display(), "Zero rows");
            return Ok(report);
        }

        write_csv(&output.outfile, builder.columns(), rows.rows(), output.separator)?;
        report.status = OutputStatus::Written;

        if let Some(cmd) = output.import_command() {
            if self.options.run_imports {
                let runner = ImportCommand::new()
                    .with_timeout(output.import_timeout_seconds.map(Duration::from_secs));
                report.import = Some(runner.run(cmd, &output.outfile).await?);
            } else {
                tracing::info!(output = %name, "Import disabled, not running import command");
            }
        }

        Ok(report)
    }

    /// Translate required groups/templates/tags into a `host.get` query.
    ///
    /// Returns `None` when names were configured but none of them exist in
    /// Zabbix, so that the output selects no hosts instead of all of them.
    async fn build_query(&self, name: &str, output: &OutputConfig) -> Result<Option<HostQuery>> {
        let mut query = HostQuery {
            tags: output.required_tags.clone(),
            ..HostQuery::default()
        };

        if !output.required_groups.is_empty() {
            let ids = self.source.resolve_group_ids(&output.required_groups).await?;
            if ids.is_empty() {
                tracing::warn!(output = %name, groups = ?output.required_groups, "None of the required host groups exist");
                return Ok(None);
            }
            query.group_ids = Some(ids);
        }

        if !output.required_templates.is_empty() {
            let ids = self
                .source
                .resolve_template_ids(&output.required_templates)
                .await?;
            if ids.is_empty() {
                tracing::warn!(output = %name, templates = ?output.required_templates, "None of the required templates exist");
                return Ok(None);
            }
            query.template_ids = Some(ids);
        }

        Ok(Some(query))
    }

    async fn collect_rows(
        &self,
        name: &str,
        output: &OutputConfig,
        query: &HostQuery,
        builder: &RowBuilder,
        rows: &mut RowSet,
        report: &mut OutputReport,
    ) -> Result<()> {
        let host_ids = self.source.list_host_ids(query).await?;
        let batches = host_ids.len().div_ceil(output.batch_size);
        tracing::info!(output = %name, hosts = host_ids.len(), batches, "Fetched candidate hosts");

        for (index, chunk) in host_ids.chunks(output.batch_size).enumerate() {
            tracing::info!(output = %name, batch = index + 1, batches, size = chunk.len(), "Fetching host batch");

            for host in self.source.fetch_hosts(chunk).await? {
                if !host.matches(output) {
                    tracing::info!(output = %name, host = %host, "Skipping host (did not pass filters)");
                    report.filtered += 1;
                    continue;
                }
                let row = builder.build(&host)?;
                if !rows.insert(row) {
                    report.duplicates += 1;
                }
            }
        }
        Ok(())
    }
}
