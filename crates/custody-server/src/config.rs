use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use custody_client::LedgerClientConfig;
use custody_machine::MachineConfig;
use custody_types::{PartyDirectory, PartyId, Role};

use crate::error::{ServerError, ServerResult};

/// Full service configuration, usually loaded from `custody.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    pub server: ServerConfig,
    /// Notarization ledger. When absent the in-memory fallback store is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerClientConfig>,
    /// Custodial party for each supply-chain role.
    pub parties: PartyDirectory,
    pub machine: MachineConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Answer CORS preflights from any origin (for a browser portal).
    pub allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            allow_any_origin: false,
        }
    }
}

impl CustodyConfig {
    /// Configuration for local demos: demo parties, fallback store.
    pub fn demo() -> Self {
        Self {
            parties: PartyDirectory::demo(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Apply `CUSTODY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> ServerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CUSTODY_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("CUSTODY_BIND_ADDR") {
            self.server.bind_addr = addr
                .parse()
                .map_err(|e| ServerError::Config(format!("CUSTODY_BIND_ADDR: {e}")))?;
        }
        if let Some(url) = get("CUSTODY_LEDGER_URL") {
            match &mut self.ledger {
                Some(ledger) => ledger.endpoint = url,
                None => self.ledger = Some(LedgerClientConfig::new(url)),
            }
        }
        if let Some(token) = get("CUSTODY_LEDGER_TOKEN") {
            match &mut self.ledger {
                Some(ledger) => ledger.api_token = Some(token),
                None => {
                    return Err(ServerError::Config(
                        "CUSTODY_LEDGER_TOKEN set without a ledger endpoint".into(),
                    ))
                }
            }
        }
        for (key, role) in [
            ("CUSTODY_MANUFACTURER", Role::Manufacturer),
            ("CUSTODY_LOGISTICS", Role::Logistics),
            ("CUSTODY_RETAILER", Role::Retailer),
        ] {
            if let Some(party) = get(key) {
                self.parties.set(role, PartyId::new(party.trim()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = CustodyConfig::default();
        assert_eq!(c.server.bind_addr, "127.0.0.1:8787".parse::<SocketAddr>().unwrap());
        assert!(c.ledger.is_none());
        assert_eq!(c.parties.resolve(Role::Manufacturer), None);
        assert_eq!(c.machine, MachineConfig::default());
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [server]
            bind_addr = "0.0.0.0:9000"

            [ledger]
            endpoint = "https://ledger.example.com"
            request_timeout_ms = 2000

            [parties]
            manufacturer = "0xmfg"
            retailer = "0xret"

            [machine]
            max_conflict_retries = 5
        "#;
        let c = CustodyConfig::from_toml_str(raw).unwrap();
        assert_eq!(c.server.bind_addr.port(), 9000);
        let ledger = c.ledger.unwrap();
        assert_eq!(ledger.request_timeout_ms, 2000);
        assert_eq!(ledger.connect_timeout_ms, 5000);
        assert_eq!(c.parties.resolve(Role::Manufacturer), Some(&PartyId::from("0xmfg")));
        assert_eq!(c.parties.resolve(Role::Logistics), None);
        assert_eq!(c.machine.max_conflict_retries, 5);
        assert_eq!(c.machine.commit_deadline_ms, 10_000);
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(matches!(
            CustodyConfig::from_toml_str("[server]\nbind_addr = 12"),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[parties]\nlogistics = \"0xlog\"").unwrap();
        let c = CustodyConfig::load(file.path()).unwrap();
        assert_eq!(c.parties.resolve(Role::Logistics), Some(&PartyId::from("0xlog")));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CustodyConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn toml_round_trip_keeps_parties() {
        let c = CustodyConfig::demo();
        let back = CustodyConfig::from_toml_str(&c.to_toml_string().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CUSTODY_BIND_ADDR", "0.0.0.0:7000"),
            ("CUSTODY_LEDGER_URL", "http://ledger:8080"),
            ("CUSTODY_LEDGER_TOKEN", "tok"),
            ("CUSTODY_RETAILER", " 0xret "),
            ("CUSTODY_LOGISTICS", ""),
        ]
        .into_iter()
        .collect();

        let mut c = CustodyConfig::demo();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.server.bind_addr.port(), 7000);
        let ledger = c.ledger.unwrap();
        assert_eq!(ledger.endpoint, "http://ledger:8080");
        assert_eq!(ledger.api_token.as_deref(), Some("tok"));
        assert_eq!(c.parties.resolve(Role::Retailer), Some(&PartyId::from("0xret")));
        assert_eq!(c.parties.resolve(Role::Logistics), Some(&PartyId::from("log-addr")));
    }

    #[test]
    fn token_without_endpoint_is_rejected() {
        let mut c = CustodyConfig::default();
        let err = c
            .apply_overrides(|k| (k == "CUSTODY_LEDGER_TOKEN").then(|| "tok".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn bad_bind_addr_override() {
        let mut c = CustodyConfig::default();
        let err = c
            .apply_overrides(|k| (k == "CUSTODY_BIND_ADDR").then(|| "nowhere".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
