//! `luabridge run` — execute a file and print its results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use luabridge_engine::{Bridge, BridgeConfig, HostValue, SharedMap, StateOptions};

use crate::output::{resolve_color_choice, StyledOutput};

pub struct RunArgs {
    pub file: PathBuf,
    pub steps: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub map: bool,
    pub json: bool,
    pub color: Option<String>,
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let config = load_config(args.config.as_deref())?;
    let options = build_options(&args, &config);

    let bridge = Bridge::new();
    let state = bridge.new_state(&options)?;
    let name = chunk_name(&args.file);

    tracing::debug!(file = %args.file.display(), "running");
    let started = Instant::now();
    let result = state.eval_named(&source, &name);
    let elapsed = started.elapsed();

    let mut out = StyledOutput::new(resolve_color_choice(args.color.as_deref()));
    let summary = format!(
        "{} steps in {:.1} ms",
        state.step(),
        elapsed.as_secs_f64() * 1000.0
    );

    let value = match result {
        Ok(value) => value,
        Err(e) => {
            out.stderr_error("error:", &e.to_string());
            out.stderr_dim(&summary);
            // Already printed in full above
            anyhow::bail!("{} failed", name);
        }
    };

    if let Some(text) = render(&value, args.json)? {
        out.plain(&text);
        out.newline();
    }

    if args.map {
        let entries: BTreeMap<String, HostValue> = state.shared_map().snapshot().into_iter().collect();
        out.dim("map: ");
        out.plain(&render_map(&entries, args.json)?);
        out.newline();
    }

    if !args.json {
        out.success("ok");
        out.dim(&format!("  {}", summary));
        out.newline();
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

/// Merge command-line overrides into the config-derived options
fn build_options(args: &RunArgs, config: &BridgeConfig) -> StateOptions {
    let mut options = StateOptions::from(config);
    if let Some(steps) = args.steps {
        options = options.with_step_limit(steps);
    }
    if let Some(ms) = args.timeout_ms {
        options.timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    if args.map {
        options = options.with_shared_map(SharedMap::new(config.builtins.map_size_limit));
    }
    options
}

fn chunk_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Text for a returned value; `None` when a plain run returned nothing
fn render(value: &HostValue, json: bool) -> anyhow::Result<Option<String>> {
    if json {
        return Ok(Some(serde_json::to_string_pretty(value)?));
    }
    Ok((!value.is_nil()).then(|| value.to_string()))
}

fn render_map(entries: &BTreeMap<String, HostValue>, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string(entries)?);
    }
    let parts: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect();
    Ok(format!("{{{}}}", parts.join(", ")))
}
