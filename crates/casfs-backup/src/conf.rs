//! `casbak.conf.json`: maps component names to `[class_name, version,
//! params]` triples. `cas` component's `path` param is stored relative to
//! the backup directory so the directory tree stays relocatable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BackupError;

pub const CAS_COMPONENT: &str = "cas";
pub const SCANNER_COMPONENT: &str = "scanner";
pub const EXTRACTOR_COMPONENT: &str = "extractor";
pub const DATE_FORMAT_COMPONENT: &str = "date_format";

/// `[class_name, version, params]`. Serializes as a JSON array via serde's
/// default tuple-struct encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec(pub String, pub String, pub Value);

impl ComponentSpec {
    pub fn new(class_name: impl Into<String>, version: impl Into<String>, params: Value) -> Self {
        ComponentSpec(class_name.into(), version.into(), params)
    }

    pub fn class_name(&self) -> &str {
        &self.0
    }

    pub fn version(&self) -> &str {
        &self.1
    }

    pub fn params(&self) -> &Value {
        &self.2
    }
}

/// The full `casbak.conf.json` document: a flat component-name -> triple map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupConfig {
    components: BTreeMap<String, ComponentSpec>,
}

impl BackupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, component: &str) -> Option<&ComponentSpec> {
        self.components.get(component)
    }

    pub fn set(&mut self, component: impl Into<String>, spec: ComponentSpec) {
        self.components.insert(component.into(), spec);
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, &ComponentSpec)> {
        self.components.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Default config for a freshly-initialized backup directory: a `cas`
    /// component pointing at `./cas` relative to the backup root, a plain
    /// filesystem scanner/extractor pair, and ISO-8601 as the date format.
    pub fn for_new_backup() -> Self {
        let mut cfg = Self::new();
        cfg.set(
            CAS_COMPONENT,
            ComponentSpec::new("CasStore", "1", serde_json::json!({ "path": "cas" })),
        );
        cfg.set(
            SCANNER_COMPONENT,
            ComponentSpec::new("WalkdirScanner", "1", Value::Null),
        );
        cfg.set(
            EXTRACTOR_COMPONENT,
            ComponentSpec::new("FsExtractor", "1", Value::Null),
        );
        cfg.set(
            DATE_FORMAT_COMPONENT,
            ComponentSpec::new("iso8601", "1", Value::Null),
        );
        cfg
    }

    /// Resolve the `cas` component's `path` param against `backup_dir`.
    pub fn cas_path(&self, backup_dir: &Path) -> Result<PathBuf, BackupError> {
        let spec = self
            .get(CAS_COMPONENT)
            .ok_or_else(|| BackupError::MissingComponent(CAS_COMPONENT.to_string()))?;
        let relative = spec
            .params()
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| BackupError::MissingComponent("cas.path".to_string()))?;
        Ok(backup_dir.join(relative))
    }

    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), BackupError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_serializes_as_json_array() {
        let spec = ComponentSpec::new("CasStore", "1", serde_json::json!({"path": "cas"}));
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"["CasStore","1",{"path":"cas"}]"#);
    }

    #[test]
    fn default_backup_config_resolves_cas_path() {
        let cfg = BackupConfig::for_new_backup();
        let resolved = cfg.cas_path(Path::new("/backups/foo")).unwrap();
        assert_eq!(resolved, PathBuf::from("/backups/foo/cas"));
    }

    #[test]
    fn missing_cas_component_is_an_error() {
        let cfg = BackupConfig::new();
        assert!(cfg.cas_path(Path::new("/backups/foo")).is_err());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casbak.conf.json");
        let cfg = BackupConfig::for_new_backup();
        cfg.save(&path).unwrap();
        let loaded = BackupConfig::load(&path).unwrap();
        assert_eq!(loaded.get(CAS_COMPONENT), cfg.get(CAS_COMPONENT));
    }

    #[test]
    fn flat_json_has_no_wrapper_key() {
        let cfg = BackupConfig::for_new_backup();
        let value: Value = serde_json::to_value(&cfg).unwrap();
        assert!(value.get("components").is_none());
        assert!(value.get(CAS_COMPONENT).is_some());
    }
}
