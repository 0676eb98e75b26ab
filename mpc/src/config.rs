use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{MpcError, Result},
    rings::{Ring, Z128, Z64},
};

/// Parameters fixed for a whole protocol run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Ring size in bits, 64 or 128.
    pub ring_bits: u32,
    /// Number of fractional bits of fixed-point values.
    pub precision: u32,
    pub num_parties: usize,
    pub batch_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ring_bits: 64,
            precision: 16,
            num_parties: 2,
            batch_size: 10,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: ProtocolConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ProtocolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all parameters are usable together.
    pub fn validate(&self) -> Result<()> {
        let safe_bits = match self.ring_bits {
            64 => Z64::SAFE_BITS,
            128 => Z128::SAFE_BITS,
            bits => return Err(invalid(format!("unsupported ring size {}", bits))),
        };
        // A product of two encoded values must still fit below 2^(SAFE_BITS-1).
        if self.precision == 0 || 2 * self.precision >= safe_bits - 1 {
            return Err(invalid(format!(
                "precision {} out of range for a {}-bit ring",
                self.precision, self.ring_bits
            )));
        }
        if self.num_parties < 2 {
            return Err(invalid(format!(
                "at least 2 parties required, got {}",
                self.num_parties
            )));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch size must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Check that `party_id` names one of the parties.
    pub fn check_party(&self, party_id: usize) -> Result<()> {
        if party_id >= self.num_parties {
            return Err(invalid(format!(
                "party {} out of range for {} parties",
                party_id, self.num_parties
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn invalid(msg: String) -> MpcError {
    MpcError::InvalidConfig(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_default_timeout() {
        let config = ProtocolConfig::from_json(
            r#"{"ring_bits": 128, "precision": 20, "num_parties": 3, "batch_size": 4}"#,
        )
        .unwrap();
        assert_eq!(config.ring_bits, 128);
        assert_eq!(config.num_parties, 3);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation() {
        assert!(ProtocolConfig::default().validate().is_ok());

        let invalid_configs = [
            ProtocolConfig {
                ring_bits: 32,
                ..Default::default()
            },
            ProtocolConfig {
                precision: 24,
                ..Default::default()
            },
            ProtocolConfig {
                num_parties: 1,
                ..Default::default()
            },
            ProtocolConfig {
                batch_size: 0,
                ..Default::default()
            },
            ProtocolConfig {
                timeout_ms: 0,
                ..Default::default()
            },
        ];
        for config in invalid_configs {
            assert!(matches!(config.validate(), Err(MpcError::InvalidConfig(_))));
        }

        let wide = ProtocolConfig {
            ring_bits: 128,
            precision: 24,
            ..Default::default()
        };
        assert!(wide.validate().is_ok());
        assert!(wide.check_party(1).is_ok());
        assert!(wide.check_party(2).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ProtocolConfig::from_json(r#"{"ring_bits": 64}"#),
            Err(MpcError::Serialization(_))
        ));
    }
}
