//! Load entity descriptors from a directory of JSON files.

use crate::config::resolved::{resolve_entity, ResolvedModel};
use crate::config::types::EntityConfig;
use crate::config::validator::validate;
use crate::error::ConfigError;
use std::path::Path;

/// Scan `dir` for `*.json` entity descriptors, parse and validate them, and
/// build the runtime model. Files are read in name order so mounting is
/// deterministic.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<ResolvedModel, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let config: EntityConfig = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::info!(entity = %config.name, file = %path.display(), "loaded entity config");
        configs.push(config);
    }

    resolve(configs)
}

/// Validate and flatten parsed configs. Split from the directory scan so
/// tests can build models from inline JSON.
pub fn resolve(configs: Vec<EntityConfig>) -> Result<ResolvedModel, ConfigError> {
    validate(&configs)?;
    Ok(ResolvedModel::new(
        configs.iter().map(resolve_entity).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_builds_lookup_maps() {
        let configs: Vec<EntityConfig> = vec![
            serde_json::from_str(r#"{"name": "organization"}"#).unwrap(),
            serde_json::from_str(
                r#"{"name": "order", "relationships": {"organization": {"type": "manyToOne", "target": "organization"}}}"#,
            )
            .unwrap(),
        ];
        let model = resolve(configs).unwrap();
        assert_eq!(model.entities.len(), 2);
        assert!(model.entity_by_path("orders").is_some());
        assert!(model.entity_by_name("organization").is_some());
        assert!(model.entity_by_path("order").is_none());
    }

    #[tokio::test]
    async fn load_from_missing_dir_fails() {
        let err = load_from_dir("no/such/dir").await.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
