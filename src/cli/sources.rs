// src/cli/sources.rs — `surfwatch sources`: configured sources and relay ports

use crate::analysis::ports;
use crate::infra::config::{Config, SourceCatalog};

/// One printable row per source, in id order. Numeric ids always get the
/// printed port. Other ids draw fallback ports first-come at runtime, so
/// theirs is the port they would get if started in id order.
pub fn source_rows(config: &Config) -> Vec<String> {
    let catalog = SourceCatalog::from_config(config);
    let plan = ports::plan(&config.relay, catalog.iter().map(|s| s.id.as_str()));

    catalog
        .iter()
        .zip(plan)
        .map(|(source, (_, port))| {
            let port = match port {
                Ok(port) => port.to_string(),
                Err(e) => format!("unassigned ({e})"),
            };
            format!(
                "{:<12} {:<24} {:<28} {}",
                source.id, source.display_name, source.location, port
            )
        })
        .collect()
}

fn header() -> String {
    format!(
        "{:<12} {:<24} {:<28} {}",
        "ID", "NAME", "LOCATION", "PLANNED PORT"
    )
}

pub fn run_sources(config: &Config) -> anyhow::Result<()> {
    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }
    println!("{}", header());
    for row in source_rows(config) {
        println!("{row}");
    }
    println!();
    println!("Non-numeric ids are assigned fallback ports in the order they start.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_sources_take_fallback_ports() {
        let rows = source_rows(&Config::default());
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("Emerald Isle"));
        assert!(rows[0].ends_with("8600"));
        assert!(rows[2].starts_with("Windansea"));
        assert!(rows[2].ends_with("8602"));
    }

    #[test]
    fn test_header_marks_ports_as_planned() {
        assert!(header().ends_with("PLANNED PORT"));
    }

    #[test]
    fn test_numeric_sources_get_derived_ports() {
        let mut config = Config::default();
        for (i, source) in config.sources.iter_mut().enumerate() {
            source.id = (i + 1).to_string();
        }
        let rows = source_rows(&config);
        assert!(rows[0].ends_with("8551"));
        assert!(rows[2].ends_with("8553"));
    }
}
