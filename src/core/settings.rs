use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

const SETTINGS_FILE: &str = "projects.toml";
const KEY_HASH_LEN: usize = 8;

/// What a project remembers between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default)]
    pub run_command: String,
    #[serde(default)]
    pub execute_automatically: bool,
    #[serde(default, rename = "commandSectionVisible")]
    pub command_section_visible: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectsFile {
    #[serde(default)]
    projects: BTreeMap<String, ProjectSettings>,
}

/// TOML-backed store of per-project settings, one table per project key.
#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
    file: ProjectsFile,
}

impl ProjectStore {
    /// Open the store at an explicit path, starting empty if the file does
    /// not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            ProjectsFile::default()
        };
        Ok(Self { path, file })
    }

    /// Open the store at its default location under the platform config
    /// directory.
    pub fn load_default() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("com", "askuser", "askuser")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".askuser"));
        Self::open(config_dir.join(SETTINGS_FILE))
    }

    pub fn get(&self, key: &str) -> ProjectSettings {
        self.file.projects.get(key).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, settings: ProjectSettings) {
        self.file.projects.insert(key.to_string(), settings);
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Stable per-project key: the directory's base name plus a short hash of the
/// full path, so directories sharing a basename stay distinct while keys stay
/// readable.
pub fn project_key(project_directory: &str) -> String {
    let basename = Path::new(project_directory)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("project");

    let mut hasher = Sha1::new();
    hasher.update(project_directory.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}_{}", basename, &digest[..KEY_HASH_LEN])
}
