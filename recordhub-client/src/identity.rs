//! Stable per-machine client ids

use std::fs;
use uuid::Uuid;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Client id derived from this machine, stable across runs.
///
/// A name-based UUID over the OS machine id, falling back to the host name.
pub fn machine_client_id() -> String {
    client_id_from_seed(&machine_seed())
}

/// Name-based UUID for an arbitrary seed
pub fn client_id_from_seed(seed: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

fn machine_seed() -> String {
    MACHINE_ID_PATHS
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .or_else(host_name)
        .unwrap_or_else(|| "localhost".to_string())
}

fn host_name() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_id_is_stable() {
        assert_eq!(machine_client_id(), machine_client_id());
    }

    #[test]
    fn test_seeded_ids() {
        let a = client_id_from_seed("host-a");
        assert_eq!(a, client_id_from_seed("host-a"));
        assert_ne!(a, client_id_from_seed("host-b"));
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
