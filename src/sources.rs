use anyhow::Result;

use crate::config::Config;
use crate::sync::check_source;

/// Print every configured content source and whether it is usable.
pub fn list_sources(config: &Config) -> Result<()> {
    let sources = config.content_sources();
    if sources.is_empty() {
        println!("No content sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<16} {:<24} STATUS",
        "SOURCE", "TYPE", "NAMESPACE", "PROJECT"
    );
    for source in &sources {
        let status = match check_source(source) {
            Ok(()) => "OK".to_string(),
            Err(e) => format!("NOT USABLE ({})", e),
        };
        let project = if source.project_id.is_empty() {
            "-"
        } else {
            source.project_id.as_str()
        };
        println!(
            "{:<16} {:<8} {:<16} {:<24} {}",
            source.name, source.source_type, source.namespace, project, status
        );
    }

    Ok(())
}
