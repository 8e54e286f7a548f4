//! Request entry points: `info`, `plot` and `versions`
//!
//! [`Inspector`] wires the registry, capability probe, backends and renderer
//! together. Both entry points always return an envelope; errors never
//! escape as panics or `Err` values.

use crate::backends::BackendSet;
use crate::capability::{CapabilityProbe, CompiledFeatures, ConfiguredProbe};
use crate::config::Settings;
use crate::data_source::normalize_group_path;
use crate::diagnostics::Diagnostics;
use crate::envelope::{Envelope, InfoEnvelope, InfoError, InfoResult, PlotEnvelope, PlotError, PlotResult};
use crate::errors::{Result, SdvError};
use crate::hierarchy::{normalize, CanonicalTree};
use crate::metadata::{self, VariableDescriptor};
use crate::plot::{select_strategy, PlotStyle, RasterRenderer, RenderRequest, Renderer};
use crate::registry::{FormatInfo, FormatRegistry};
use crate::resolver::{AttemptFailure, ResolveError, Resolver};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// The only accepted `plot_type`.
pub const AUTO_PLOT_TYPE: &str = "auto";

pub struct Inspector {
    registry: FormatRegistry,
    probe: Box<dyn CapabilityProbe>,
    backends: BackendSet,
    settings: Settings,
    renderer: Box<dyn Renderer>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Inspector {
    /// Built-in registry and backends, narrowed by `settings`.
    pub fn new(settings: Settings) -> Self {
        let mut registry = FormatRegistry::builtin();
        registry.apply_priorities(&settings.formats);
        let probe = ConfiguredProbe::new(CompiledFeatures, settings.disabled_backends.clone());
        Self {
            registry,
            probe: Box::new(probe),
            backends: BackendSet::builtin(),
            settings,
            renderer: Box::new(RasterRenderer::default()),
        }
    }

    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn CapabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_backends(mut self, backends: BackendSet) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolve_format(&self, path: &Path) -> FormatInfo {
        self.registry.resolve_format(path, self.probe.as_ref())
    }

    /// Environment report as text.
    pub fn versions(&self) -> String {
        Diagnostics::collect(self.probe.as_ref()).render()
    }

    /// Structural summary and metadata of every group in `path`.
    pub fn file_info(&self, path: &Path) -> InfoEnvelope {
        info!(path = %path.display(), "info request");
        let format = self.resolve_format(path);
        let versions = self.versions();
        match self.inspect(path, &format, &versions) {
            Ok(result) => Envelope::Result(result),
            Err(e) => {
                error!(path = %path.display(), kind = %e.kind(), error = %e, "info request failed");
                Envelope::Error(InfoError::new(&e, format, versions))
            }
        }
    }

    fn inspect(&self, path: &Path, format: &FormatInfo, versions: &str) -> Result<InfoResult> {
        let (tree, backend) = self.open_tree(path, format)?;
        let limits = self.settings.repr_limits();
        let file_size = file_size(path)?;

        let result = InfoResult {
            format_info: format.clone(),
            used_backend: backend,
            file_size,
            text_repr: tree.text_repr(&limits),
            markup_repr: tree.markup_repr(&limits),
            versions: versions.to_string(),
            dimensions_flattened: BTreeMap::new(),
            variables_flattened: BTreeMap::new(),
            coordinates_flattened: BTreeMap::new(),
            attributes_flattened: BTreeMap::new(),
            text_repr_flattened: tree.text_reprs(&limits),
            markup_repr_flattened: tree.markup_reprs(&limits),
        }
        .with_groups(metadata::extract(&tree));
        tree.close();
        Ok(result)
    }

    /// Render one variable to a base64 PNG.
    ///
    /// `variable_path` is POSIX-like: the parent is the group and the last
    /// segment the variable or coordinate name.
    pub fn create_plot(
        &self,
        path: &Path,
        variable_path: &str,
        plot_type: &str,
        style: Option<&str>,
    ) -> PlotEnvelope {
        info!(path = %path.display(), variable = variable_path, plot_type, "plot request");
        let format = self.resolve_format(path);
        match self.plot(path, &format, variable_path, plot_type, style) {
            Ok(result) => Envelope::Result(result),
            Err(e) => {
                error!(path = %path.display(), kind = %e.kind(), error = %e, "plot request failed");
                Envelope::Error(PlotError::new(&e, format))
            }
        }
    }

    fn plot(
        &self,
        path: &Path,
        format: &FormatInfo,
        variable_path: &str,
        plot_type: &str,
        style: Option<&str>,
    ) -> Result<PlotResult> {
        if plot_type != AUTO_PLOT_TYPE {
            return Err(SdvError::InvalidRequest {
                message: format!("unsupported plot type '{}', only '{}' is accepted", plot_type, AUTO_PLOT_TYPE),
            });
        }
        let (group, name) = split_variable_path(variable_path)?;

        let (tree, _backend) = self.open_tree(path, format)?;
        let outcome = self.render_variable(&tree, format, &group, &name, style);
        tree.close();
        outcome
    }

    fn render_variable(
        &self,
        tree: &CanonicalTree,
        format: &FormatInfo,
        group: &str,
        name: &str,
        style: Option<&str>,
    ) -> Result<PlotResult> {
        let not_found = || SdvError::VariableNotFound {
            var: name.to_string(),
            group: group.to_string(),
        };
        let table = tree.group(group).ok_or_else(not_found)?;
        let entry = table.variable(name).ok_or_else(not_found)?;

        let descriptor = VariableDescriptor::from(entry);
        let values = table.read(entry)?;
        let strategy = select_strategy(&descriptor);
        let style = PlotStyle::resolve(style.or(Some(self.settings.default_style.as_str())));

        let png = self
            .renderer
            .render(&RenderRequest {
                variable: &descriptor,
                values: &values,
                strategy: &strategy,
                style: &style,
            })
            .map_err(|e| SdvError::decode(format!("failed to render '{}': {}", name, e)))?;
        info!(variable = name, group, strategy = strategy.name(), bytes = png.len(), "plot rendered");

        Ok(PlotResult {
            plot_data: BASE64.encode(png),
            format_info: format.clone(),
            strategy,
        })
    }

    fn open_tree(&self, path: &Path, format: &FormatInfo) -> Result<(CanonicalTree, String)> {
        let resolved = Resolver::new(&self.backends)
            .open(path, format)
            .map_err(|e| classify_resolve_error(format, e))?;
        let tree = normalize(resolved.dataset)?;
        info!(backend = %resolved.backend, groups = tree.len(), "dataset opened");
        Ok((tree, resolved.backend))
    }
}

/// Map a resolver failure onto the request-level error kinds.
pub fn classify_resolve_error(format: &FormatInfo, error: ResolveError) -> SdvError {
    match error {
        ResolveError::NoBackendAvailable { extension, missing } => {
            if !format.registered {
                SdvError::UnsupportedFormat { extension }
            } else {
                warn!(%extension, ?missing, "no usable backend");
                SdvError::MissingDependency {
                    display_name: format.display_name.clone(),
                    missing,
                }
            }
        }
        ResolveError::AllBackendsFailed { attempts } => {
            for attempt in &attempts {
                warn!(backend = %attempt.backend, stage = %attempt.stage, error = %attempt.error, "backend attempt failed");
            }
            SdvError::decode(describe_attempts(&attempts))
        }
    }
}

fn describe_attempts(attempts: &[AttemptFailure]) -> String {
    match attempts.last() {
        Some(last) => format!("Failed to open file: {}", last),
        None => "Failed to open file: no backend attempt was made".to_string(),
    }
}

/// Split `a/b/var` into the group path `/a/b` and the name `var`.
pub fn split_variable_path(variable_path: &str) -> Result<(String, String)> {
    let trimmed = variable_path.trim().trim_end_matches('/');
    let (parent, name) = match trimmed.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", trimmed),
    };
    if name.is_empty() {
        return Err(SdvError::InvalidRequest {
            message: format!("'{}' does not name a variable", variable_path),
        });
    }
    Ok((normalize_group_path(parent), name.to_string()))
}

/// Size on disk; directory stores are summed recursively.
pub fn file_size(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path)
        .map_err(|e| SdvError::decode(format!("cannot stat {}: {}", path.display(), e)))?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    Ok(WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum())
}
