//! Run settings: CLI flags over an optional TOML file over defaults.

use anatomist::path_util::module_name;
use anyhow::{bail, Context};
use clap::Args;
use common::{MarkPolicy, Presentation};
use oracle::CheckMode;
use resolver::ResolverConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "retrotype.toml";

/// Every setting as a command-line option. Unset options fall back to the
/// config file, then to the defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct Options {
    /// Python files or directories to annotate (default: the project root).
    pub paths: Vec<PathBuf>,
    /// TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root that module names and absolute imports resolve against.
    #[arg(long)]
    pub project_root: Option<PathBuf>,
    /// Registry module receiving synthesized interfaces.
    #[arg(long)]
    pub interfaces_path: Option<PathBuf>,
    /// Directory for probe files.
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
    /// Files resolved in parallel.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Annotate with `Any` when nothing was learned about a parameter.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub allow_any: Option<bool>,
    /// Keep a parameter's previous annotation as part of the new one.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub keep_hints: Option<bool>,
    /// Longest rendered generic annotation; longer ones stay unparametrized.
    #[arg(long)]
    pub max_hint_length: Option<usize>,
    /// Which parameters get resolved.
    #[arg(long)]
    pub mark: Option<MarkPolicy>,
    /// How per-site interfaces are presented after deduplication.
    #[arg(long)]
    pub presentation: Option<Presentation>,
    /// Libraries whose public classes become candidates.
    #[arg(long = "external-library")]
    pub external_libraries: Vec<String>,
    /// Libraries never scanned.
    #[arg(long = "excluded-library")]
    pub excluded_libraries: Vec<String>,
    /// Run the checker in strict mode.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub strict: Option<bool>,
    /// Type checker executable.
    #[arg(long)]
    pub mypy: Option<String>,
    /// Interpreter used for the library scan.
    #[arg(long)]
    pub python: Option<String>,
    /// Synthesize an interface even when a builtin candidate fits.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub add_protocols_on_builtin: Option<bool>,
    /// Never propose `memoryview`.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub exclude_memoryview: Option<bool>,
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub project_root: Option<PathBuf>,
    pub paths: Option<Vec<PathBuf>>,
    pub interfaces_path: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub allow_any: Option<bool>,
    pub keep_hints: Option<bool>,
    pub max_hint_length: Option<usize>,
    pub mark: Option<MarkPolicy>,
    pub presentation: Option<Presentation>,
    pub external_libraries: Option<Vec<String>>,
    pub excluded_libraries: Option<Vec<String>>,
    pub strict: Option<bool>,
    pub mypy: Option<String>,
    pub python: Option<String>,
    pub add_protocols_on_builtin: Option<bool>,
    pub exclude_memoryview: Option<bool>,
}

impl FileConfig {
    /// # Errors
    /// Unreadable files and invalid TOML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Fully resolved settings. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_root: PathBuf,
    pub paths: Vec<PathBuf>,
    pub interfaces_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub workers: usize,
    pub allow_any: bool,
    pub keep_hints: bool,
    pub max_hint_length: Option<usize>,
    pub mark: MarkPolicy,
    pub presentation: Presentation,
    pub external_libraries: Vec<String>,
    pub excluded_libraries: Vec<String>,
    pub strict: bool,
    pub mypy: String,
    pub python: String,
    pub add_protocols_on_builtin: bool,
    pub exclude_memoryview: bool,
}

impl Settings {
    /// Reads the config file (explicit, or [`DEFAULT_CONFIG_FILE`] when it
    /// exists in `cwd`) and merges it under `options`.
    ///
    /// # Errors
    /// Unreadable config, a missing project root, or a registry path outside it.
    pub fn load(options: &Options, cwd: &Path) -> anyhow::Result<Self> {
        let file = match &options.config {
            Some(path) => FileConfig::load(&cwd.join(path))?,
            None => {
                let default = cwd.join(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    FileConfig::load(&default)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::merge(options, file, cwd)
    }

    /// Layers `options` over `file` over the defaults.
    ///
    /// # Errors
    /// A project root that does not exist, or a registry path outside it.
    pub fn merge(options: &Options, file: FileConfig, cwd: &Path) -> anyhow::Result<Self> {
        let root = options
            .project_root
            .clone()
            .or(file.project_root)
            .map_or_else(|| cwd.to_path_buf(), |p| cwd.join(p));
        let project_root = dunce::canonicalize(&root)
            .with_context(|| format!("project root {}", root.display()))?;
        let within = |p: PathBuf| project_root.join(p);

        let paths: Vec<PathBuf> = if options.paths.is_empty() {
            file.paths.unwrap_or_default()
        } else {
            options.paths.clone()
        };
        let paths = if paths.is_empty() {
            vec![project_root.clone()]
        } else {
            paths.into_iter().map(within).collect()
        };

        let interfaces_path = within(
            options
                .interfaces_path
                .clone()
                .or(file.interfaces_path)
                .unwrap_or_else(|| PathBuf::from("interfaces/interfaces.py")),
        );
        let scratch_dir = within(
            options
                .scratch_dir
                .clone()
                .or(file.scratch_dir)
                .unwrap_or_else(|| PathBuf::from(".retrotype/scratch")),
        );
        let pick_list = |cli: &Vec<String>, file: Option<Vec<String>>| {
            if cli.is_empty() {
                file.unwrap_or_default()
            } else {
                cli.clone()
            }
        };

        let settings = Self {
            paths,
            interfaces_path,
            scratch_dir,
            workers: options.workers.or(file.workers).unwrap_or(1).max(1),
            allow_any: options.allow_any.or(file.allow_any).unwrap_or(false),
            keep_hints: options.keep_hints.or(file.keep_hints).unwrap_or(true),
            max_hint_length: options.max_hint_length.or(file.max_hint_length),
            mark: options.mark.or(file.mark).unwrap_or_default(),
            presentation: options.presentation.or(file.presentation).unwrap_or_default(),
            external_libraries: pick_list(&options.external_libraries, file.external_libraries),
            excluded_libraries: pick_list(&options.excluded_libraries, file.excluded_libraries),
            strict: options.strict.or(file.strict).unwrap_or(true),
            mypy: options
                .mypy
                .clone()
                .or(file.mypy)
                .unwrap_or_else(|| String::from("mypy")),
            python: options
                .python
                .clone()
                .or(file.python)
                .unwrap_or_else(|| String::from("python3")),
            add_protocols_on_builtin: options
                .add_protocols_on_builtin
                .or(file.add_protocols_on_builtin)
                .unwrap_or(false),
            exclude_memoryview: options
                .exclude_memoryview
                .or(file.exclude_memoryview)
                .unwrap_or(false),
            project_root,
        };
        settings.registry_module()?;
        Ok(settings)
    }

    /// Dotted module path of the registry file.
    ///
    /// # Errors
    /// When the registry file is not a `.py` file under the project root.
    pub fn registry_module(&self) -> anyhow::Result<String> {
        match module_name(&self.interfaces_path, &self.project_root) {
            Some(module) => Ok(module),
            None => bail!(
                "interfaces path {} must be a .py file under the project root {}",
                self.interfaces_path.display(),
                self.project_root.display()
            ),
        }
    }

    pub fn check_mode(&self) -> CheckMode {
        if self.strict {
            CheckMode::Strict
        } else {
            CheckMode::Lenient
        }
    }

    /// # Errors
    /// See [`Settings::registry_module`].
    pub fn resolver_config(&self) -> anyhow::Result<ResolverConfig> {
        Ok(ResolverConfig {
            allow_any: self.allow_any,
            keep_hints: self.keep_hints,
            max_hint_length: self.max_hint_length,
            mark: self.mark,
            mode: self.check_mode(),
            add_protocols_on_builtin: self.add_protocols_on_builtin,
            exclude_memoryview: self.exclude_memoryview,
            registry_module: self.registry_module()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let settings = Settings::merge(&Options::default(), FileConfig::default(), &root).unwrap();
        assert_eq!(settings.paths, vec![root.clone()]);
        assert_eq!(settings.interfaces_path, root.join("interfaces/interfaces.py"));
        assert_eq!(settings.workers, 1);
        assert!(settings.keep_hints);
        assert!(!settings.allow_any);
        assert_eq!(settings.mark, MarkPolicy::All);
        assert_eq!(settings.presentation, Presentation::Combined);
        assert_eq!(settings.check_mode(), CheckMode::Strict);
        assert_eq!(settings.registry_module().unwrap(), "interfaces.interfaces");
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let file: FileConfig = toml::from_str(
            "workers = 4\nallow_any = true\nmark = \"unannotated-only\"\npresentation = \"both\"\n\
             interfaces_path = \"types/protocols.py\"\nexternal_libraries = [\"numpy\"]\n",
        )
        .unwrap();
        let options = Options {
            workers: Some(2),
            allow_any: Some(false),
            ..Options::default()
        };
        let settings = Settings::merge(&options, file, &root).unwrap();
        assert_eq!(settings.workers, 2);
        assert!(!settings.allow_any);
        assert_eq!(settings.mark, MarkPolicy::UnannotatedOnly);
        assert_eq!(settings.presentation, Presentation::Both);
        assert_eq!(settings.external_libraries, vec!["numpy".to_string()]);
        assert_eq!(settings.registry_module().unwrap(), "types.protocols");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(toml::from_str::<FileConfig>("wokers = 4\n").is_err());
    }

    #[test]
    fn test_registry_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let options = Options {
            interfaces_path: Some(PathBuf::from("/elsewhere/interfaces.py")),
            ..Options::default()
        };
        assert!(Settings::merge(&options, FileConfig::default(), &root).is_err());
    }
}
