//! Local device identity (hardware address of the uplink interface)

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AgentError, AgentResult};

/// Where Linux exposes per-interface attributes
const SYSFS_NET: &str = "/sys/class/net";

/// Resolve the identity: explicit override first, else the interface's MAC
pub async fn resolve_identity(identity: Option<&str>, interface: &str) -> AgentResult<String> {
    match identity {
        Some(id) => {
            let id = id.trim();
            if id.is_empty() {
                return Err(AgentError::Identity("empty identity override".into()));
            }
            info!("Using configured identity: {}", id);
            Ok(id.to_string())
        }
        None => {
            let path = PathBuf::from(SYSFS_NET).join(interface).join("address");
            read_hardware_address(&path).await
        }
    }
}

/// Read and validate a hardware address file
async fn read_hardware_address(path: &Path) -> AgentResult<String> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        AgentError::Identity(format!("cannot read {}: {}", path.display(), e))
    })?;
    validate_mac(raw.trim())
}

/// Accept six colon-separated hex octets that are not all zero
fn validate_mac(mac: &str) -> AgentResult<String> {
    let octets: Vec<&str> = mac.split(':').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if !well_formed {
        return Err(AgentError::Identity(format!(
            "not a hardware address: {:?}",
            mac
        )));
    }
    if octets.iter().all(|o| *o == "00") {
        return Err(AgentError::Identity("interface has no hardware address".into()));
    }

    Ok(mac.to_string())
}
