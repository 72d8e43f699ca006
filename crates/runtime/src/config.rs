// Path: crates/runtime/src/config.rs

//! Runtime configuration.
//!
//! Invalid configuration is exit-code-3 territory: it surfaces as
//! [`RuntimeError::Config`] before the runtime starts ticking.

use serde::{Deserialize, Serialize};
use xln_types::entity::QuorumConfig;
use xln_types::error::RuntimeError;

/// Host-facing runtime settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RuntimeConfig {
    /// Human-readable server identifier, used in logs only.
    pub server_id: String,
    /// Upper bound on inputs consumed per tick; 0 means unlimited.
    pub max_batch: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server_id: "xln-server".into(),
            max_batch: 0,
        }
    }
}

impl RuntimeConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.server_id.is_empty() {
            return Err(RuntimeError::Config("server_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Validates a quorum configuration before it is attached to a replica.
pub fn validate_quorum(config: &QuorumConfig) -> Result<(), RuntimeError> {
    if config.validators.is_empty() {
        return Err(RuntimeError::Config("empty validator set".into()));
    }
    let total = config.total_shares();
    if config.threshold == 0 || config.threshold > total {
        return Err(RuntimeError::Config(format!(
            "threshold {} outside (0, {}]",
            config.threshold, total
        )));
    }
    let mut seen = std::collections::BTreeSet::new();
    for validator in &config.validators {
        if !seen.insert(validator.signer) {
            return Err(RuntimeError::Config(format!(
                "duplicate validator {}",
                validator.signer
            )));
        }
        if validator.shares == 0 {
            return Err(RuntimeError::Config(format!(
                "validator {} has zero shares",
                validator.signer
            )));
        }
        if validator.pubkey.is_empty() {
            return Err(RuntimeError::Config(format!(
                "validator {} has no public key",
                validator.signer
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_types::entity::ValidatorRecord;
    use xln_types::primitives::SignerIdx;

    #[test]
    fn toml_roundtrip() {
        let config = RuntimeConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: RuntimeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server_id, config.server_id);
    }

    #[test]
    fn empty_server_id_is_a_config_error() {
        let config = RuntimeConfig {
            server_id: String::new(),
            max_batch: 0,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    fn record(signer: u64, shares: u128) -> ValidatorRecord {
        ValidatorRecord {
            signer: SignerIdx(signer),
            pubkey: vec![1],
            shares,
        }
    }

    #[test]
    fn quorum_bounds_checked() {
        assert!(validate_quorum(&QuorumConfig {
            threshold: 0,
            validators: vec![record(0, 1)],
        })
        .is_err());
        assert!(validate_quorum(&QuorumConfig {
            threshold: 2,
            validators: vec![record(0, 1)],
        })
        .is_err());
        assert!(validate_quorum(&QuorumConfig {
            threshold: 67,
            validators: vec![record(0, 40), record(1, 35), record(2, 25)],
        })
        .is_ok());
        assert!(validate_quorum(&QuorumConfig {
            threshold: 1,
            validators: vec![record(0, 1), record(0, 1)],
        })
        .is_err());
    }
}
