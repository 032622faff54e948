use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::MAIN_REPOSITORY_IDENTIFIER;
use crate::upsert::ContentPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding one index per project plus the run history.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_file_max_size_kb")]
    pub file_max_size_kb: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            file_max_size_kb: default_file_max_size_kb(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data/reposearch")
}
fn default_file_max_size_kb() -> u64 {
    512
}

impl IndexConfig {
    pub fn content_policy(&self) -> ContentPolicy {
        ContentPolicy {
            max_file_size: self.file_max_size_kb * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoutingConfig {
    /// Prefix prepended to every generated locator (e.g. `https://code.example.org`).
    #[serde(default)]
    pub base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

impl ProjectConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub identifier: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub fetch: bool,
    /// Paths never read back for indexing.
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

fn default_exclude_globs() -> Vec<String> {
    vec!["**/node_modules/**".to_string(), "**/target/**".to_string()]
}

impl RepositoryConfig {
    /// Key under which this repository's runs are recorded.
    pub fn key(&self, project: &str) -> String {
        format!(
            "{}/{}",
            project,
            self.identifier
                .as_deref()
                .unwrap_or(MAIN_REPOSITORY_IDENTIFIER)
        )
    }
}

impl Config {
    pub fn project(&self, identifier: &str) -> Result<&ProjectConfig> {
        match self.projects.iter().find(|p| p.identifier == identifier) {
            Some(project) => Ok(project),
            None => bail!(
                "Unknown project: '{}'. Available: {}",
                identifier,
                self.projects
                    .iter()
                    .map(|p| p.identifier.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.index.file_max_size_kb == 0 {
        bail!("index.file_max_size_kb must be > 0");
    }

    if config.projects.is_empty() {
        bail!("at least one [[projects]] entry is required");
    }

    let mut seen_projects = HashSet::new();
    for project in &config.projects {
        if project.identifier.trim().is_empty() {
            bail!("projects.identifier must not be empty");
        }
        if !seen_projects.insert(project.identifier.as_str()) {
            bail!("duplicate project identifier: '{}'", project.identifier);
        }

        let mut seen_repos = HashSet::new();
        for repo in &project.repositories {
            let id = repo
                .identifier
                .as_deref()
                .unwrap_or(MAIN_REPOSITORY_IDENTIFIER);
            if !seen_repos.insert(id) {
                bail!(
                    "duplicate repository identifier '{}' in project '{}'",
                    id,
                    project.identifier
                );
            }
        }
    }

    Ok(config)
}
