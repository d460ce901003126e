//! Project config (`yasn.toml`/`yasny.toml`, §6). The resolver is the only part of this crate
//! that acts on it, and only on `[modules]`; `[dependencies]` and `[run]`/`[run.<mode>]` belong
//! to out-of-scope collaborators (a dependency fetcher, a dev-server launcher) but still need to
//! round-trip losslessly for tooling that shares the same file, so they deserialize as raw TOML
//! tables rather than being modeled field-by-field.

use serde::{Deserialize, Serialize};
use std::path::Path;
use yasny_core::Diagnostic;

/// The only section this crate reads. `root` rebases import paths (§6); `paths` adds extra
/// search directories searched in order after `root`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModulesConfig {
    pub root: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Whole project file. `dependencies` and `run` are opaque tables: this crate never reads or
/// validates their contents, only preserves them so a shared config file round-trips for the
/// collaborators that do.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub modules: Option<ModulesConfig>,
    #[serde(default)]
    pub dependencies: toml::value::Table,
    #[serde(default)]
    pub run: toml::value::Table,
}

impl ProjectConfig {
    pub fn parse(raw: &str) -> Result<ProjectConfig, Diagnostic> {
        toml::from_str(raw).map_err(|e| Diagnostic::new(format!("не удалось разобрать yasn.toml/yasny.toml: {e}")))
    }

    pub fn load(path: &Path) -> Result<ProjectConfig, Diagnostic> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Diagnostic::new(format!("не удалось прочитать {}: {e}", path.display())))?;
        Self::parse(&raw).map_err(|e| e.with_path(path.display().to_string()))
    }

    /// Serializes back to TOML text. Used to confirm the lossless round-trip for sections this
    /// crate never interprets.
    pub fn to_toml_string(&self) -> Result<String, Diagnostic> {
        toml::to_string(self).map_err(|e| Diagnostic::new(format!("не удалось сериализовать конфигурацию: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modules_section() {
        let config = ProjectConfig::parse(
            "[modules]\nroot = \"src\"\npaths = [\"vendor\", \"lib\"]\n",
        )
        .unwrap();
        let modules = config.modules.unwrap();
        assert_eq!(modules.root.as_deref(), Some("src"));
        assert_eq!(modules.paths, vec!["vendor".to_string(), "lib".to_string()]);
    }

    #[test]
    fn missing_modules_section_is_none() {
        let config = ProjectConfig::parse("[dependencies]\nfoo = \"1.0\"\n").unwrap();
        assert!(config.modules.is_none());
    }

    #[test]
    fn dependencies_and_run_round_trip_without_interpretation() {
        let raw = "[modules]\nroot = \".\"\n\n[dependencies]\nfoo = \"1.0\"\nbar = { source = \"git\", ref = \"main\" }\n\n[run]\nbackend = \"native\"\n\n[run.dev]\nhost = \"127.0.0.1\"\nport = 8080\n";
        let config = ProjectConfig::parse(raw).unwrap();
        assert_eq!(config.dependencies.get("foo").unwrap().as_str(), Some("1.0"));
        let bar = config.dependencies.get("bar").unwrap().as_table().unwrap();
        assert_eq!(bar.get("ref").unwrap().as_str(), Some("main"));
        assert_eq!(config.run.get("backend").unwrap().as_str(), Some("native"));
        let dev = config.run.get("dev").unwrap().as_table().unwrap();
        assert_eq!(dev.get("port").unwrap().as_integer(), Some(8080));

        let serialized = config.to_toml_string().unwrap();
        let reparsed = ProjectConfig::parse(&serialized).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn empty_file_parses_to_all_defaults() {
        let config = ProjectConfig::parse("").unwrap();
        assert_eq!(config, ProjectConfig::default());
    }
}
