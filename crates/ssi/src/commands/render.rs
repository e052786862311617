//! `ssi render` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use ssi_cache::MemoryCache;
use ssi_config::{CliSettings, Config, Constant, RenderConfig};
use ssi_engine::{
    CommandRegistry, Document, FileLoader, HandlerValue, HookError, RenderError, RenderOptions,
    STDOUT,
};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Document to render.
    source: PathBuf,

    /// Output file (default: standard output).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover ssi.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory for `virtual` includes (overrides config).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Source and output encoding (overrides config).
    #[arg(long)]
    encoding: Option<String>,

    /// Per-insert timeout in milliseconds, 0 to disable (overrides config).
    #[arg(long, env = "SSI_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Drop a byte-order mark found in the source.
    #[arg(long)]
    no_preserve_bom: bool,

    /// Ignore attributes no handler consumed.
    #[arg(long)]
    allow_leftover_attrs: bool,

    /// Document variable for `echo`, as NAME=VALUE (repeatable).
    #[arg(short = 'D', long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Enable verbose output (debug logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the document cannot be
    /// rendered, or the output cannot be written.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            encoding: self.encoding,
            preserve_bom: self.no_preserve_bom.then_some(false),
            timeout_ms: self.timeout_ms,
            base_dir: self.base_dir,
            reject_leftover_attrs: self.allow_leftover_attrs.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            tracing::debug!(config = %path.display(), "Loaded configuration");
        }

        let registry = build_registry(&config);
        let options = render_options(&config.render_resolved)?;
        let cache = MemoryCache::new();

        let mut doc = Document::with_registry(&registry)
            .with_filename(&self.source)
            .with_options(options)
            .with_loader(Arc::new(FileLoader::with_cache(&cache)));
        for (name, value) in self.vars {
            doc.set_var(name, value);
        }

        let dest = self.output.unwrap_or_else(|| PathBuf::from(STDOUT));
        let to_stdout = dest == Path::new(STDOUT);
        let dest_label = dest.display().to_string();
        doc.late_fx(move |doc| {
            Box::pin(async move {
                doc.save_to_file(&dest)
                    .await
                    .map_err(|err| HookError::new(err.to_string()))
            })
        });

        if let Err(err) = doc.render().await {
            if let RenderError::FailedInserts { failed } = &err {
                for (index, failure) in failed {
                    output.warning(&format!("  segment #{index}: {}", failure.error));
                }
            }
            return Err(err.into());
        }

        if !to_stdout {
            output.success(&format!(
                "Rendered {} -> {dest_label}",
                self.source.display()
            ));
        }
        Ok(())
    }
}

/// Build the command registry from `[commands]` and `[constants]`.
///
/// `include` and `echo` are available unless the configuration rebinds them.
fn build_registry(config: &Config) -> CommandRegistry {
    let mut registry = CommandRegistry::default()
        .with_alias("include", "include")
        .with_alias("echo", "echo");

    for (key, value) in &config.commands {
        registry.configure(key, value);
    }
    for (name, constant) in &config.constants {
        let constant = constant.clone();
        registry.insert_handler(name.as_str(), move |_, _, _| Ok(constant_value(&constant)));
    }
    registry
}

/// Handler value for a configured constant.
///
/// Non-text constants follow the handler contract: `false` and `0` keep the
/// tag, other numbers and `true` are rejected when the tag is rendered.
fn constant_value(constant: &Constant) -> HandlerValue {
    match constant {
        Constant::Bool(b) => HandlerValue::Bool(*b),
        Constant::Integer(i) => HandlerValue::from(*i),
        Constant::Float(x) => HandlerValue::Number(*x),
        Constant::Text(s) => HandlerValue::from(s.as_str()),
    }
}

fn render_options(config: &RenderConfig) -> Result<RenderOptions, CliError> {
    Ok(RenderOptions {
        encoding: config.encoding.parse()?,
        preserve_bom: config.preserve_bom,
        timeout: config.timeout,
        reject_leftover_attrs: config.reject_leftover_attrs,
        base_dir: config.base_dir.clone(),
    })
}

/// Parse a `NAME=VALUE` pair.
fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}
