//! Catalogs command implementation.

use anyhow::Result;
use fedcat_core::connector::CatalogInfo;
use fedcat_core::metrics::CatalogMetrics;
use fedcat_core::{Config, ConnectorManager, PluginRegistry};
use std::sync::Arc;

/// Build every configured connector, print what was registered, then stop them.
pub async fn run(config: &Config, json: bool) -> Result<()> {
    let metrics = Arc::new(CatalogMetrics::new()?);
    let manager =
        ConnectorManager::from_config(PluginRegistry::with_defaults(), metrics, &config.catalogs).await?;
    let catalogs = manager.catalogs();
    manager.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalogs)?);
    } else {
        print!("{}", render(&catalogs));
    }
    Ok(())
}

fn render(catalogs: &[CatalogInfo]) -> String {
    let width = catalogs
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("CATALOG".len());
    let mut out = format!(
        "{:<width$}  {:<14}  {:<9}  {}\n",
        "CATALOG",
        "TYPE",
        "FAST PATH",
        "AUX PORT",
        width = width
    );
    for catalog in catalogs {
        let aux = catalog
            .aux_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<width$}  {:<14}  {:<9}  {}\n",
            catalog.name,
            catalog.connector_type,
            if catalog.fast_path { "yes" } else { "no" },
            aux,
            width = width
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table() {
        let catalogs = vec![
            CatalogInfo {
                name: "prodhive".to_string(),
                connector_name: "prodhive".to_string(),
                connector_type: "hive".to_string(),
                fast_path: true,
                aux_port: Some(9083),
            },
            CatalogInfo {
                name: "lake".to_string(),
                connector_name: "lake".to_string(),
                connector_type: "iceberg-rest".to_string(),
                fast_path: false,
                aux_port: None,
            },
        ];
        let out = render(&catalogs);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CATALOG "));
        assert!(lines[1].starts_with("prodhive  hive"));
        assert!(lines[1].ends_with("9083"));
        assert!(lines[2].contains("iceberg-rest"));
        assert!(lines[2].ends_with("-"));
    }
}
