//! Emulator configuration: deserialized from TOML or built from CLI flags.

use std::path::{Path, PathBuf};

use doip_core::{ConfigError, ServerIdentity, VehicleIdentity};
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    13400
}

/// `server_addr_func` has no safe default per `spec.md` §9's third Open
/// Question — the source disagrees with itself between `0x1FFF` and
/// `0x7DF`. This crate ships `0x1FFF` as a placeholder so
/// `EmulatorConfig::default()` is usable out of the box, but callers are
/// expected to set it explicitly for a real vehicle profile.
fn default_server_addr_func() -> u16 {
    0x1FFF
}

fn default_server_addr() -> u16 {
    0x1001
}

fn default_client_addr() -> u16 {
    0x0E80
}

/// Top-level emulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Interface address to bind the TCP listener and UDP socket to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP/UDP port, 13400 by default per ISO 13400.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Physical logical address this emulator answers to.
    #[serde(default = "default_server_addr")]
    pub server_addr: u16,
    /// Functional (group) logical address. No safe default — see
    /// `default_server_addr_func`.
    #[serde(default = "default_server_addr_func")]
    pub server_addr_func: u16,
    /// Expected tester logical address.
    #[serde(default = "default_client_addr")]
    pub client_addr: u16,
    /// Path to the JSON response catalog. Missing/absent is not an error —
    /// the catalog is simply empty.
    #[serde(default)]
    pub response_file: Option<PathBuf>,
    /// Vehicle identification fields reported in `0x0004` responses.
    #[serde(default)]
    pub vehicle: VehicleIdentityConfig,
    /// Whether to broadcast three Vehicle Announcement Messages at startup.
    #[serde(default)]
    pub announce_on_start: bool,
    /// Payload-length ceiling enforced by the wire codec.
    #[serde(default = "default_max_payload")]
    pub max_payload: u32,
}

fn default_max_payload() -> u32 {
    doip_core::codec::DEFAULT_MAX_PAYLOAD
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_addr: default_server_addr(),
            server_addr_func: default_server_addr_func(),
            client_addr: default_client_addr(),
            response_file: None,
            vehicle: VehicleIdentityConfig::default(),
            announce_on_start: false,
            max_payload: default_max_payload(),
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid(format!(
            "reading {}: {e}",
            path.display()
        )))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Invalid(format!("parsing {}: {e}", path.display())))
    }

    /// Convert to the immutable identity triple the protocol engine uses.
    pub fn server_identity(&self) -> ServerIdentity {
        ServerIdentity {
            server_addr: self.server_addr,
            server_addr_func: self.server_addr_func,
            client_addr: self.client_addr,
        }
    }

    /// Convert to the vehicle identity used in `0x0004` responses, validating
    /// the VIN/EID/GID field widths.
    pub fn vehicle_identity(&self) -> Result<VehicleIdentity, ConfigError> {
        self.vehicle.to_identity()
    }
}

/// Vehicle identification fields as they appear in a configuration document
/// (human-friendly ASCII VIN, hex strings for EID/GID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleIdentityConfig {
    #[serde(default = "default_vin")]
    pub vin: String,
    #[serde(default = "default_eid")]
    pub eid: String,
    #[serde(default = "default_gid")]
    pub gid: String,
    #[serde(default)]
    pub further_action: u8,
    #[serde(default = "default_sync_status")]
    pub sync_status: u8,
}

fn default_vin() -> String {
    "1HGBH41JXMN109186".to_string()
}

fn default_eid() -> String {
    "010203040506".to_string()
}

fn default_gid() -> String {
    "0708090A0B0C".to_string()
}

fn default_sync_status() -> u8 {
    0x10
}

impl Default for VehicleIdentityConfig {
    fn default() -> Self {
        Self {
            vin: default_vin(),
            eid: default_eid(),
            gid: default_gid(),
            further_action: 0,
            sync_status: default_sync_status(),
        }
    }
}

impl VehicleIdentityConfig {
    fn to_identity(&self) -> Result<VehicleIdentity, ConfigError> {
        let vin_bytes = self.vin.as_bytes();
        if vin_bytes.len() != 17 {
            return Err(ConfigError::Invalid(format!(
                "VIN must be exactly 17 bytes, got {}",
                vin_bytes.len()
            )));
        }
        let mut vin = [0u8; 17];
        vin.copy_from_slice(vin_bytes);

        let eid = parse_fixed_hex::<6>(&self.eid, "EID")?;
        let gid = parse_fixed_hex::<6>(&self.gid, "GID")?;

        Ok(VehicleIdentity {
            vin,
            eid,
            gid,
            further_action: self.further_action,
            sync_status: self.sync_status,
        })
    }
}

fn parse_fixed_hex<const N: usize>(s: &str, field: &str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(s).map_err(|e| ConfigError::Invalid(format!("{field} is not valid hex: {e}")))?;
    if bytes.len() != N {
        return Err(ConfigError::Invalid(format!(
            "{field} must be exactly {N} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_produces_valid_identities() {
        let config = EmulatorConfig::default();
        let vehicle = config.vehicle_identity().unwrap();
        assert_eq!(&vehicle.vin, b"1HGBH41JXMN109186");
        assert_eq!(vehicle.eid, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(vehicle.gid, [0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn rejects_wrong_length_vin() {
        let mut config = EmulatorConfig::default();
        config.vehicle.vin = "SHORT".to_string();
        assert!(config.vehicle_identity().is_err());
    }

    #[test]
    fn loads_from_toml() {
        let toml_src = r#"
            host = "127.0.0.1"
            port = 13400
            server_addr = 0x1001
            server_addr_func = 0x1FFF
            client_addr = 0x0E80
        "#;
        let config: EmulatorConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.server_addr, 0x1001);
    }
}
