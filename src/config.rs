//! Configuration loading and validation.
//!
//! The TOML file is parsed into raw sections, then validated once into an immutable
//! [`Config`] that is handed to the reconciler at the start of a run. Any problem found here
//! is an [`Error::Configuration`] and aborts the run before a single source is touched.

use crate::hasher::HashAlgorithm;
use crate::ledger::{Ledger, SqliteLedger, UnavailableLedger};
use crate::producer::database::{DatabaseProducer, DumpSettings};
use crate::producer::directory::{ArchiveSettings, DirectoryProducer};
use crate::producer::SourceProducer;
use crate::reconcile::ReconcileSettings;
use crate::source::LogicalSource;
use crate::storage::local::LocalStorage;
use crate::storage::StorageClient;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DRIVESYNC_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub ledger: LedgerSection,
    #[serde(default)]
    pub staging: StagingSection,
    #[serde(default)]
    pub hashing: HashingSection,
    #[serde(default)]
    pub archive: ArchiveSettings,
    pub database: Option<DatabaseSection>,
    pub storage: StorageSection,
    #[serde(default)]
    pub sources: Vec<SourceSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StagingSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HashingSection {
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default = "default_db_host")]
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    /// Name of an environment variable holding the password
    pub password_env: Option<String>,
    #[serde(default = "default_dump_program")]
    pub dump_program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_dump_program() -> String {
    "mysqldump".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase", deny_unknown_fields)]
pub enum StorageSection {
    Drive {
        folder_id: String,
        access_token_env: Option<String>,
        token_command: Option<Vec<String>>,
        api_base: Option<String>,
    },
    Local {
        root: PathBuf,
        #[serde(default)]
        folder: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum SourceSection {
    Directory { path: PathBuf, id: Option<String> },
    Database { name: String, id: Option<String> },
}

/// Resolved remote storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    Drive {
        folder_id: String,
        token: TokenSetting,
        api_base: Option<String>,
    },
    Local {
        root: PathBuf,
        folder: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSetting {
    Env(String),
    Command(Vec<String>),
}

impl StorageSettings {
    /// Parent location new objects are created under
    pub fn parent_location(&self) -> &str {
        match self {
            StorageSettings::Drive { folder_id, .. } => folder_id,
            StorageSettings::Local { folder, .. } => folder,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageSettings::Drive { .. } => "drive",
            StorageSettings::Local { .. } => "local",
        }
    }
}

/// Validated, immutable configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_path: PathBuf,
    pub staging_dir: PathBuf,
    pub hash_algorithm: HashAlgorithm,
    pub archive: ArchiveSettings,
    pub database: Option<DumpSettings>,
    pub storage: StorageSettings,
    pub sources: Vec<LogicalSource>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::configuration("could not determine config directory"))?;
        Ok(config_dir.join("drivesync").join("config.toml"))
    }

    /// Load and validate the config file at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("malformed config: {e}")))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let database = raw.database.map(resolve_database).transpose()?;
        let storage = resolve_storage(raw.storage)?;
        let sources = resolve_sources(raw.sources)?;

        let has_database_source = sources
            .iter()
            .any(|s| matches!(s.kind, crate::source::SourceKind::Database { .. }));
        if has_database_source && database.is_none() {
            return Err(Error::configuration(
                "database sources are configured but the [database] section is missing",
            ));
        }

        if raw.archive.program.trim().is_empty() {
            return Err(Error::configuration("archive.program must not be empty"));
        }

        Ok(Self {
            ledger_path: raw.ledger.path,
            staging_dir: raw.staging.dir.unwrap_or_else(std::env::temp_dir),
            hash_algorithm: raw.hashing.algorithm,
            archive: raw.archive,
            database,
            storage,
            sources,
        })
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            staging_dir: self.staging_dir.clone(),
            hash_algorithm: self.hash_algorithm,
            remote_parent: self.storage.parent_location().to_string(),
        }
    }

    pub fn producer(&self) -> SourceProducer {
        SourceProducer::new(
            DirectoryProducer::new(self.archive.clone()),
            self.database.clone().map(DatabaseProducer::new),
        )
    }

    pub fn open_ledger(&self) -> Result<SqliteLedger> {
        SqliteLedger::open(&self.ledger_path)
    }

    /// Open the ledger for a run. An unreachable store becomes a ledger whose every
    /// operation fails, so sources are reported individually rather than the run aborting.
    pub fn open_run_ledger(&self) -> Arc<dyn Ledger> {
        match self.open_ledger() {
            Ok(ledger) => Arc::new(ledger),
            Err(e) => {
                warn!("Ledger {} unavailable: {}", self.ledger_path.display(), e);
                Arc::new(UnavailableLedger::new(format!(
                    "cannot open ledger {}: {e}",
                    self.ledger_path.display()
                )))
            }
        }
    }

    /// Build the storage client for the configured backend
    pub fn storage_client(&self) -> Result<Arc<dyn StorageClient>> {
        match &self.storage {
            StorageSettings::Local { root, .. } => Ok(Arc::new(LocalStorage::new(root))),
            #[cfg(feature = "drive")]
            StorageSettings::Drive {
                token, api_base, ..
            } => {
                use crate::storage::drive::{DriveStorage, TokenSource, DEFAULT_API_BASE};

                let token_source = match token {
                    TokenSetting::Env(var) => TokenSource::Env(var.clone()),
                    TokenSetting::Command(argv) => TokenSource::Command(argv.clone()),
                };
                let api_base = api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
                Ok(Arc::new(DriveStorage::with_api_base(token_source, api_base)?))
            }
            #[cfg(not(feature = "drive"))]
            StorageSettings::Drive { .. } => Err(Error::configuration(
                "the drive backend is not compiled in; rebuild with the `drive` feature",
            )),
        }
    }
}

fn resolve_database(section: DatabaseSection) -> Result<DumpSettings> {
    let password = match (&section.password, &section.password_env) {
        (Some(_), Some(_)) => {
            return Err(Error::configuration(
                "set only one of database.password and database.password_env",
            ))
        }
        (Some(password), None) => Some(password.clone()),
        (None, Some(var)) => Some(std::env::var(var).map_err(|_| {
            Error::configuration(format!("database password variable {var} is not set"))
        })?),
        (None, None) => None,
    };

    if section.user.trim().is_empty() {
        return Err(Error::configuration("database.user must not be empty"));
    }

    Ok(DumpSettings {
        host: section.host,
        port: section.port,
        user: section.user,
        password,
        program: section.dump_program,
        extra_args: section.extra_args,
    })
}

fn resolve_storage(section: StorageSection) -> Result<StorageSettings> {
    match section {
        StorageSection::Drive {
            folder_id,
            access_token_env,
            token_command,
            api_base,
        } => {
            if folder_id.trim().is_empty() {
                return Err(Error::configuration("storage.folder_id must not be empty"));
            }
            let token = match (access_token_env, token_command) {
                (Some(_), Some(_)) => {
                    return Err(Error::configuration(
                        "set only one of storage.access_token_env and storage.token_command",
                    ))
                }
                (Some(var), None) => TokenSetting::Env(var),
                (None, Some(argv)) if !argv.is_empty() => TokenSetting::Command(argv),
                (None, Some(_)) => {
                    return Err(Error::configuration("storage.token_command must not be empty"))
                }
                (None, None) => TokenSetting::Env("DRIVESYNC_ACCESS_TOKEN".to_string()),
            };
            Ok(StorageSettings::Drive {
                folder_id,
                token,
                api_base,
            })
        }
        StorageSection::Local { root, folder } => Ok(StorageSettings::Local { root, folder }),
    }
}

/// Turn source sections into logical sources, enforcing unique, non-empty ids
fn resolve_sources(sections: Vec<SourceSection>) -> Result<Vec<LogicalSource>> {
    if sections.is_empty() {
        return Err(Error::configuration("no [[sources]] configured"));
    }

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(sections.len());

    for section in sections {
        let source = match section {
            SourceSection::Directory { path, id } => {
                let id = match id {
                    Some(id) => id,
                    None => path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .ok_or_else(|| {
                            Error::configuration(format!(
                                "cannot derive an id from {}; set `id` explicitly",
                                path.display()
                            ))
                        })?,
                };
                LogicalSource::directory(id, path)
            }
            SourceSection::Database { name, id } => {
                if name.trim().is_empty() {
                    return Err(Error::configuration("database source name must not be empty"));
                }
                LogicalSource::database(id.unwrap_or_else(|| name.clone()), name)
            }
        };

        if source.id.trim().is_empty() {
            return Err(Error::configuration("source id must not be empty"));
        }
        if !seen.insert(source.id.clone()) {
            return Err(Error::configuration(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }
        sources.push(source);
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    const SAMPLE: &str = r#"
[ledger]
path = "/var/lib/drivesync/ledger.db"

[staging]
dir = "/var/tmp/drivesync"

[database]
user = "backup"
password = "hunter2"

[storage]
backend = "drive"
folder_id = "1AbCdEf"
token_command = ["gcloud", "auth", "print-access-token"]

[[sources]]
kind = "directory"
path = "/srv/www/site"

[[sources]]
kind = "database"
name = "shop"
"#;

    #[test]
    fn test_sample_config_resolves() -> Result<()> {
        let config = Config::from_toml_str(SAMPLE)?;

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].id, "site");
        assert_eq!(
            config.sources[1].kind,
            SourceKind::Database {
                name: "shop".to_string()
            }
        );
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.archive, ArchiveSettings::default());
        assert_eq!(config.staging_dir, PathBuf::from("/var/tmp/drivesync"));
        assert_eq!(config.storage.parent_location(), "1AbCdEf");

        let database = config.database.as_ref().expect("database settings");
        assert_eq!(database.host, "localhost");
        assert_eq!(database.program, "mysqldump");
        Ok(())
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let toml = r#"
[ledger]
path = "ledger.db"

[storage]
backend = "local"
root = "/mnt/nas"

[[sources]]
kind = "directory"
path = "/home/a/docs"

[[sources]]
kind = "directory"
path = "/home/b/docs"
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, Error::Configuration { ref reason } if reason.contains("duplicate source id 'docs'")));
    }

    #[test]
    fn test_explicit_id_resolves_collision() -> Result<()> {
        let toml = r#"
[ledger]
path = "ledger.db"

[storage]
backend = "local"
root = "/mnt/nas"
folder = "hosts/web1"

[[sources]]
kind = "directory"
path = "/home/a/docs"

[[sources]]
kind = "directory"
path = "/home/b/docs"
id = "b-docs"
"#;
        let config = Config::from_toml_str(toml)?;
        assert_eq!(config.sources[1].id, "b-docs");
        assert_eq!(config.reconcile_settings().remote_parent, "hosts/web1");
        Ok(())
    }

    #[test]
    fn test_database_source_requires_database_section() {
        let toml = r#"
[ledger]
path = "ledger.db"

[storage]
backend = "local"
root = "/mnt/nas"

[[sources]]
kind = "database"
name = "shop"
"#;
        assert!(matches!(
            Config::from_toml_str(toml),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_malformed_and_empty_configs_are_configuration_errors() {
        assert!(matches!(
            Config::from_toml_str("[ledger"),
            Err(Error::Configuration { .. })
        ));

        let no_sources = r#"
[ledger]
path = "ledger.db"

[storage]
backend = "local"
root = "/mnt/nas"
"#;
        assert!(matches!(
            Config::from_toml_str(no_sources),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_drive_token_defaults_to_environment() -> Result<()> {
        let toml = r#"
[ledger]
path = "ledger.db"

[hashing]
algorithm = "sha256"

[storage]
backend = "drive"
folder_id = "folder"

[[sources]]
kind = "directory"
path = "/etc"
"#;
        let config = Config::from_toml_str(toml)?;
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert!(matches!(
            config.storage,
            StorageSettings::Drive { token: TokenSetting::Env(ref var), .. } if var == "DRIVESYNC_ACCESS_TOKEN"
        ));
        Ok(())
    }
}
