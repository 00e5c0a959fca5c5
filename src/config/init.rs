// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented cutover.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ServiceName;

use super::CONFIG_FILENAME;

const DEFAULT_SERVICE: &str = "my-service";

pub fn init_config(dir: &Path, service: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let name = ServiceName::new(service.unwrap_or(DEFAULT_SERVICE))
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    std::fs::write(&config_path, generate_template_yaml(&name))?;

    Ok(())
}

fn generate_template_yaml(service: &ServiceName) -> String {
    format!(
        r#"# Rollback policy: default | strict | majority
policy: default
provision_timeout: 5m
hook_timeout: 2m

health:
  interval: 5s
  probe_timeout: 2s
  success_threshold: 3
  failure_threshold: 2
  timeout: 2m
  bakeout: 5m
  quorum: 1.0

services:
  - name: {service}
    replicas: 2
    task:
      cpu: 256
      memory: 512
      ports: ["8080/tcp"]
    pools:
      blue: ["10.0.1.10:8080", "10.0.1.11:8080"]
      green: ["10.0.2.10:8080", "10.0.2.11:8080"]
"#
    )
}
