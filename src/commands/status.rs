// ABOUTME: Status command implementation.
// ABOUTME: Prints the stored live color and version of configured services.

use cutover::config::Config;
use cutover::error::Result;
use cutover::output::Output;
use cutover::store::StateStore;
use cutover::types::ServiceName;
use serde::Serialize;

#[derive(Serialize)]
struct StatusLine<'a> {
    service: &'a ServiceName,
    deployed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    endpoints: usize,
}

pub fn status(config: &Config, service: Option<&ServiceName>, output: &Output) -> Result<()> {
    let store = StateStore::new(config.state_dir());

    let names: Vec<&ServiceName> = match service {
        Some(name) => vec![&config.service(name)?.name],
        None => config.services.iter().map(|s| &s.name).collect(),
    };

    for name in names {
        let record = store.load(name)?;
        let line = StatusLine {
            service: name,
            deployed: record.is_some(),
            active: record.as_ref().map(|r| r.active.to_string()),
            version: record.as_ref().and_then(|r| r.live_version.as_deref()),
            endpoints: record.as_ref().map_or(0, |r| r.endpoints.len()),
        };

        let text = match &record {
            Some(r) => format!(
                "{}: {} ({}), {} endpoint(s), updated {}",
                name,
                r.active,
                r.live_version.as_deref().unwrap_or("unknown version"),
                r.endpoints.len(),
                r.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => format!("{name}: not deployed"),
        };
        output.record(&text, &line);
    }

    Ok(())
}
