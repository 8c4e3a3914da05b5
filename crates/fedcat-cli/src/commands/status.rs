//! Status command implementation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Health response from the server.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    uptime_seconds: u64,
    components: BTreeMap<String, ComponentStatus>,
}

/// Component status from the server.
#[derive(Debug, Deserialize)]
struct ComponentStatus {
    status: String,
    message: Option<String>,
}

/// Totals pulled out of the Prometheus exposition.
#[derive(Debug, Default, PartialEq)]
struct Summary {
    published: u64,
    failed: u64,
    rejected: u64,
    connector_errors: u64,
    /// Failed requests per catalog
    errors_by_catalog: BTreeMap<String, u64>,
}

/// Show status and health.
pub async fn run(url: &str) -> Result<()> {
    println!("Checking health at {}...\n", url);

    let health_url = format!("{}/health", url.trim_end_matches('/'));
    let client = reqwest::Client::new();

    match client.get(&health_url).send().await {
        Ok(response) => {
            let status_code = response.status();
            match response.json::<HealthResponse>().await {
                Ok(health) => print_health_status(&health, status_code.as_u16()),
                Err(e) => {
                    println!("Failed to parse health response: {}", e);
                    println!("HTTP Status: {}", status_code);
                }
            }
        }
        Err(e) => {
            println!("Failed to connect to health endpoint: {}", e);
            println!("\nIs the fedcat service running?");
            println!("Start it with: fedcat serve --config <path-to-config>");
            return Ok(());
        }
    }

    // Metrics live on their own port; assume the default pairing
    let metrics_url = url
        .replace(":8080", ":9090")
        .replace("/health", "")
        .trim_end_matches('/')
        .to_string()
        + "/metrics";

    println!("\n--- Metrics ---");
    println!("Fetching from {}...\n", metrics_url);

    match client.get(&metrics_url).send().await {
        Ok(response) => {
            let text = response.text().await.context("Failed to read metrics")?;
            print_summary(&summarize(&text));
        }
        Err(e) => println!("Failed to fetch metrics: {}", e),
    }

    Ok(())
}

fn marker(status: &str) -> &'static str {
    match status {
        "healthy" => "[OK]",
        "degraded" => "[WARN]",
        "unhealthy" => "[FAIL]",
        _ => "[?]",
    }
}

fn print_health_status(health: &HealthResponse, status_code: u16) {
    println!(
        "{} Overall Status: {} (HTTP {})",
        marker(&health.status),
        health.status.to_uppercase(),
        status_code
    );
    println!(
        "Ready: {}   Uptime: {}s",
        if health.ready { "yes" } else { "no" },
        health.uptime_seconds
    );
    println!();

    if !health.components.is_empty() {
        println!("Components:");
        for (name, status) in &health.components {
            match &status.message {
                Some(msg) => println!("  {} {}: {} ({})", marker(&status.status), name, status.status, msg),
                None => println!("  {} {}: {}", marker(&status.status), name, status.status),
            }
        }
    }
}

/// Parse `name{labels} value` lines into a label map and value.
fn parse_sample(line: &str) -> Option<(&str, BTreeMap<&str, &str>, f64)> {
    let (series, value) = line.rsplit_once(' ')?;
    let value = value.parse::<f64>().ok()?;
    let (name, labels) = match series.split_once('{') {
        Some((name, rest)) => {
            let body = rest.strip_suffix('}')?;
            let labels = body
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k, v.trim_matches('"')))
                .collect();
            (name, labels)
        }
        None => (series, BTreeMap::new()),
    };
    Some((name, labels, value))
}

fn summarize(metrics_text: &str) -> Summary {
    let mut summary = Summary::default();
    for line in metrics_text.lines() {
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let Some((name, labels, value)) = parse_sample(line) else {
            continue;
        };
        let value = value as u64;
        match name {
            "fedcat_notification_count" => match (labels.get("outcome"), labels.get("reason")) {
                (Some(&"success"), _) => summary.published += value,
                (_, Some(&"rejected")) => summary.rejected += value,
                _ => summary.failed += value,
            },
            "fedcat_connector_errors_total" => {
                summary.connector_errors += value;
                if let Some(catalog) = labels.get("catalog") {
                    *summary.errors_by_catalog.entry(catalog.to_string()).or_default() += value;
                }
            }
            _ => {}
        }
    }
    summary
}

fn print_summary(summary: &Summary) {
    if *summary == Summary::default() {
        println!("No metrics available yet.");
        return;
    }
    println!("Notifications Published: {}", format_number(summary.published));
    println!("Notifications Failed:    {}", summary.failed);
    println!("Events Rejected:         {}", summary.rejected);
    println!("Connector Errors:        {}", summary.connector_errors);
    for (catalog, count) in &summary.errors_by_catalog {
        println!("  {}: {}", catalog, count);
    }
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_exposition() {
        let text = r#"
# HELP fedcat_notification_count Notification publish attempts by message type and outcome
# TYPE fedcat_notification_count counter
fedcat_notification_count{outcome="success",reason="none",type="table.create"} 1200
fedcat_notification_count{outcome="failure",reason="transport",type="table.create"} 3
fedcat_notification_count{outcome="failure",reason="rejected",type="partition.add"} 2
fedcat_connector_errors_total{catalog="prodhive",kind="entity_not_found",request="table.get"} 5
fedcat_connector_errors_total{catalog="lake",kind="backend_unavailable",request="table.list"} 1
"#;
        let summary = summarize(text);
        assert_eq!(summary.published, 1200);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.connector_errors, 6);
        assert_eq!(summary.errors_by_catalog.get("prodhive"), Some(&5));
        assert_eq!(format_number(summary.published), "1.20K");
    }

    #[test]
    fn test_parse_health_response() {
        let json = r#"{
            "status": "degraded",
            "ready": true,
            "uptime_seconds": 42,
            "components": {
                "catalog:prodhive": {"status": "degraded", "message": "metastore timed out"},
                "notifications": {"status": "healthy"}
            }
        }"#;
        let health: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(health.status, "degraded");
        assert!(health.ready);
        assert_eq!(
            health.components["catalog:prodhive"].message.as_deref(),
            Some("metastore timed out")
        );
    }
}
