use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".cf2outline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub staging_source: ValueSource,
    pub output_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})\nstaging_dir={} ({})\noutput_dir={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.staging_dir),
            self.staging_source.as_str(),
            normalize_for_display(&self.output_dir),
            self.output_source.as_str(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("CF2OUTLINE_PROJECT_ROOT")) {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = resolve_one(
        overrides.config.as_deref(),
        &lookup_env,
        "CF2OUTLINE_CONFIG",
        &project_root,
        state_dir.join("config.toml"),
    );
    let (staging_dir, staging_source) = resolve_one(
        overrides.staging_dir.as_deref(),
        &lookup_env,
        "CF2OUTLINE_STAGING_DIR",
        &project_root,
        state_dir.join("staging"),
    );
    let (output_dir, output_source) = resolve_one(
        overrides.output_dir.as_deref(),
        &lookup_env,
        "CF2OUTLINE_OUTPUT_DIR",
        &project_root,
        project_root.clone(),
    );

    Ok(ResolvedPaths {
        project_root,
        state_dir,
        config_path,
        staging_dir,
        output_dir,
        root_source,
        config_source,
        staging_source,
        output_source,
    })
}

fn resolve_one<F>(
    flag: Option<&Path>,
    lookup_env: &F,
    env_key: &str,
    project_root: &Path,
    default: PathBuf,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = flag {
        (absolutize(path, project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env(env_key)) {
        (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Env,
        )
    } else {
        (default, ValueSource::Default)
    }
}

/// Create the staging directory used for exported blobs.
pub fn ensure_staging_dir(paths: &ResolvedPaths) -> Result<()> {
    fs::create_dir_all(&paths.staging_dir)
        .with_context(|| format!("failed to create {}", paths.staging_dir.display()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
