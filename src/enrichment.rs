//! Device identifier and software version attached to every record.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;

/// Reported when a lookup yields nothing.
pub const UNKNOWN: &str = "none";

const INSTALLED: &str = "install ok installed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub device_id: String,
    pub software_version: String,
}

impl Enrichment {
    pub fn new(device_id: impl Into<String>, software_version: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            software_version: software_version.into(),
        }
    }

    /// Resolves both fields once per pass. Lookup failures degrade to [`UNKNOWN`].
    pub fn resolve(config: &EnrichmentConfig) -> Self {
        let device_id = config
            .device_id
            .clone()
            .or_else(local_hostname)
            .unwrap_or_else(|| UNKNOWN.to_string());

        let software_version = match (&config.software_version, &config.software_package) {
            (Some(version), _) => version.clone(),
            (None, Some(package)) => installed_version(&config.dpkg_status_path, package)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            (None, None) => UNKNOWN.to_string(),
        };

        debug!(%device_id, %software_version, "resolved enrichment");
        Self {
            device_id,
            software_version,
        }
    }
}

fn local_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => name.into_string().ok().filter(|s| !s.is_empty()),
        Err(e) => {
            warn!(error = %e, "hostname lookup failed");
            None
        }
    }
}

/// Looks up the installed version of `package` in a dpkg status database.
pub fn installed_version(status_path: &Path, package: &str) -> Option<String> {
    let contents = match fs::read_to_string(status_path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %status_path.display(), error = %e, "cannot read dpkg status");
            return None;
        }
    };
    find_installed_version(&contents, package)
}

/// Stanzas are separated by blank lines and hold `Field: value` lines.
/// Continuation lines start with whitespace and are ignored.
fn find_installed_version(contents: &str, package: &str) -> Option<String> {
    for stanza in contents.split("\n\n") {
        let mut name = None;
        let mut status = None;
        let mut version = None;

        for line in stanza.lines() {
            if line.starts_with(char::is_whitespace) {
                continue;
            }
            if let Some((field, value)) = line.split_once(':') {
                let value = value.trim();
                match field {
                    "Package" => name = Some(value),
                    "Status" => status = Some(value),
                    "Version" => version = Some(value),
                    _ => {}
                }
            }
        }

        if name == Some(package) {
            return match (status, version) {
                (Some(INSTALLED), Some(v)) if !v.is_empty() => Some(v.to_string()),
                _ => None,
            };
        }
    }
    None
}
