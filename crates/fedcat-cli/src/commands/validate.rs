//! Validate command implementation.

use anyhow::Result;
use fedcat_core::{Config, PluginRegistry};

/// Check the configuration beyond what parsing already enforces: every
/// catalog must name a connector type this binary ships.
pub fn run(config: &Config) -> Result<()> {
    config.validate()?;
    check_connector_types(config, &PluginRegistry::with_defaults())?;
    Ok(())
}

fn check_connector_types(config: &Config, plugins: &PluginRegistry) -> fedcat_core::Result<()> {
    for catalog in &config.catalogs {
        if plugins.get(&catalog.connector_type).is_none() {
            return Err(fedcat_core::Error::UnknownPlugin {
                catalog: catalog.name.clone(),
                connector_type: catalog.connector_type.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_connector_type() {
        let config = Config::from_toml_str(
            r#"
            [[catalogs]]
            name = "prodhive"
            type = "hive"
            properties = { "hive.metastore.uris" = "thrift://localhost:9083" }

            [[catalogs]]
            name = "legacy"
            type = "oracle"
            "#,
        )
        .unwrap();
        let err = check_connector_types(&config, &PluginRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, fedcat_core::Error::UnknownPlugin { ref catalog, .. } if catalog == "legacy"));
    }

    #[test]
    fn test_accepts_shipped_connector_types() {
        let config = Config::from_toml_str(
            r#"
            [[catalogs]]
            name = "lake"
            type = "iceberg-rest"
            properties = { "rest.uri" = "http://localhost:8181" }

            [[catalogs]]
            name = "warehouse"
            type = "postgresql"
            properties = { "postgresql.url" = "postgres://etl@localhost:5432/warehouse" }
            "#,
        )
        .unwrap();
        check_connector_types(&config, &PluginRegistry::with_defaults()).unwrap();
    }
}
