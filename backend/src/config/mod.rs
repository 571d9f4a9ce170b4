//! Entity configuration store.
//!
//! The export configuration (API base URL + target entities) lives in one
//! JSON document on disk, read and written as a whole. A missing document is
//! simply an empty configuration; a broken one is also treated as empty,
//! with a notice for the user instead of a hard failure.

pub mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{ExportConfig, FieldKind, TargetEntitySpec};
use crate::validation::compile_field_pattern;

pub use settings::Settings;

/// Default location of the configuration document (relative to current dir)
pub const DEFAULT_CONFIG_PATH: &str = ".datamend/export-config.json";

const CONFIG_SCHEMA: &str = include_str!("../../schemas/export-config.schema.json");

/// Parse and check a configuration document.
pub fn parse_config(text: &str) -> ConfigResult<ExportConfig> {
    config_from_value(serde_json::from_str(text)?)
}

/// Check an already-parsed document (e.g. a request body).
pub fn config_from_value(document: Value) -> ConfigResult<ExportConfig> {
    check_schema(&document)?;
    let config: ExportConfig = serde_json::from_value(document)?;
    config.check()?;
    Ok(config)
}

fn check_schema(document: &Value) -> ConfigResult<()> {
    let schema: Value = serde_json::from_str(CONFIG_SCHEMA)?;
    let validator = jsonschema::draft7::new(&schema)
        .map_err(|e| ConfigError::Schema(vec![format!("invalid embedded schema: {}", e)]))?;

    let errors: Vec<String> = validator.iter_errors(document).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Schema(errors))
    }
}

/// Load a document; a missing file is an empty configuration.
pub fn load(path: &Path) -> ConfigResult<ExportConfig> {
    match fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ExportConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Non-fatal problems worth showing when a configuration is saved.
///
/// Patterns that do not compile are ignored during validation, so a typo in
/// one silently disables the constraint.
pub fn lint(config: &ExportConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    for entity in &config.entities {
        if entity.fields.is_empty() {
            warnings.push(format!("Entity '{}' has no fields", entity.id));
        }
        for field in &entity.fields {
            if let FieldKind::Text(c) | FieldKind::Email(c) = &field.kind {
                if let Some(pattern) = &c.pattern {
                    if let Err(e) = compile_field_pattern(pattern) {
                        warnings.push(format!(
                            "Entity '{}', field '{}': pattern '{}' is invalid and will be ignored ({})",
                            entity.id, field.name, pattern, e
                        ));
                    }
                }
                if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
                    if min > max {
                        warnings.push(format!(
                            "Entity '{}', field '{}': minLength {} exceeds maxLength {}",
                            entity.id, field.name, min, max
                        ));
                    }
                }
            }
            if let FieldKind::Number(c) = &field.kind {
                if let (Some(min), Some(max)) = (c.min_value, c.max_value) {
                    if min > max {
                        warnings.push(format!(
                            "Entity '{}', field '{}': minValue {} exceeds maxValue {}",
                            entity.id, field.name, min, max
                        ));
                    }
                }
            }
        }
    }
    warnings
}

/// The configuration document plus where it lives.
pub struct ConfigStore {
    path: PathBuf,
    config: ExportConfig,
    notice: Option<String>,
}

impl ConfigStore {
    /// Open the store, falling back to an empty configuration on any problem.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = PathBuf::from(path.as_ref());
        let (config, notice) = match load(&path) {
            Ok(config) => (config, None),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "export configuration unusable, starting empty");
                let notice = format!(
                    "Export configuration at {} could not be loaded ({}); no entities are available",
                    path.display(),
                    e
                );
                (ExportConfig::default(), Some(notice))
            }
        };
        Self { path, config, notice }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Why the document on disk was ignored, if it was.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn entities(&self) -> &[TargetEntitySpec] {
        &self.config.entities
    }

    pub fn entity(&self, id: &str) -> ConfigResult<&TargetEntitySpec> {
        self.config
            .entity(id)
            .ok_or_else(|| ConfigError::EntityNotFound(id.to_string()))
    }

    /// Partial edits start from the in-memory config, which is only an
    /// empty stand-in when the document on disk was ignored.
    fn ensure_editable(&self) -> ConfigResult<()> {
        match self.notice {
            Some(_) => Err(ConfigError::DocumentIgnored(self.path.display().to_string())),
            None => Ok(()),
        }
    }

    /// Replace the whole document and save it. Returns lint warnings.
    ///
    /// Also the way out of an ignored document: the notice is cleared.
    pub fn replace(&mut self, config: ExportConfig) -> ConfigResult<Vec<String>> {
        config.check()?;
        self.config = config;
        self.save()?;
        self.notice = None;
        Ok(lint(&self.config))
    }

    /// Insert or replace one entity (matched by id) and save.
    pub fn upsert_entity(&mut self, entity: TargetEntitySpec) -> ConfigResult<Vec<String>> {
        self.ensure_editable()?;
        let mut next = self.config.clone();
        match next.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => next.entities.push(entity),
        }
        self.replace(next)
    }

    pub fn remove_entity(&mut self, id: &str) -> ConfigResult<()> {
        self.ensure_editable()?;
        let before = self.config.entities.len();
        self.config.entities.retain(|e| e.id != id);
        if self.config.entities.len() == before {
            return Err(ConfigError::EntityNotFound(id.to_string()));
        }
        self.save()
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> ConfigResult<()> {
        self.ensure_editable()?;
        self.config.base_url = base_url.into();
        self.save()
    }

    /// Import a file holding either a whole document or a single entity.
    ///
    /// A whole document replaces the current one; a single entity is upserted.
    pub fn import(&mut self, path: &Path) -> ConfigResult<Vec<String>> {
        let text = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)?;

        if document.get("entities").is_some() {
            self.replace(config_from_value(document)?)
        } else {
            let entity: TargetEntitySpec = serde_json::from_value(document)?;
            entity.check()?;
            self.upsert_entity(entity)
        }
    }

    /// Write the full document, replacing what is on disk.
    pub fn save(&self) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, content)?;
        tracing::debug!(path = %self.path.display(), entities = self.config.entities.len(), "saved export configuration");
        Ok(())
    }
}
