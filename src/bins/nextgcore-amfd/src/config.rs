//! AMF configuration
//!
//! YAML layout:
//!
//! ```yaml
//! logger:
//!   level: info
//! max:
//!   ue: 1024
//! amf:
//!   amf_name: nextgcore-amf0
//!   guami:
//!     - plmn_id: { mcc: 999, mnc: "70" }
//!       amf_id: { region: 2, set: 1 }
//!   tai:
//!     - plmn_id: { mcc: 999, mnc: "70" }
//!       tac: 1
//!   plmn_support:
//!     - plmn_id: { mcc: 999, mnc: "70" }
//!       s_nssai: [ { sst: 1 } ]
//!   security:
//!     integrity_order: [ NIA2, NIA1, NIA0 ]
//!     ciphering_order: [ NEA0, NEA1, NEA2 ]
//!   network_name: { full: NextGCore, short: Next }
//!   time:
//!     t3512: { value: 540 }
//!     t3560: { value: 6, max_count: 4 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::security::algorithm;
use crate::timer::{AmfTimerConfigs, TimerConfig};
use crate::types::{AmfId, Guami, GutiError, PlmnId, Tai5gs};

/// Default maximum number of UEs
pub const DEFAULT_MAX_NUM_OF_UE: usize = 1024;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid identity in config: {0}")]
    Identity(#[from] GutiError),

    #[error("unknown security algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("missing config item: {0}")]
    Missing(&'static str),

    #[error("invalid config item: {0}")]
    Invalid(&'static str),
}

// ============================================================================
// File layout
// ============================================================================

/// MCC/MNC written as a string or a bare number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Digits {
    Text(String),
    Number(u32),
}

#[derive(Debug, Clone, Deserialize)]
struct PlmnIdEntry {
    mcc: Digits,
    mnc: Digits,
}

impl PlmnIdEntry {
    fn to_plmn_id(&self) -> Result<PlmnId, ConfigError> {
        // MCC is always three digits. A bare number MNC has lost its
        // leading zeros, so "01" and "001" cannot be told apart.
        let mcc = match &self.mcc {
            Digits::Text(s) => s.clone(),
            Digits::Number(n) => format!("{:03}", n),
        };
        let Digits::Text(mnc) = &self.mnc else {
            return Err(ConfigError::Invalid("plmn_id.mnc must be a quoted string"));
        };
        Ok(PlmnId::new(&mcc, mnc)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AmfIdEntry {
    region: u8,
    set: u16,
    #[serde(default)]
    pointer: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct GuamiEntry {
    plmn_id: PlmnIdEntry,
    amf_id: AmfIdEntry,
}

#[derive(Debug, Clone, Deserialize)]
struct TaiEntry {
    plmn_id: PlmnIdEntry,
    tac: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct SNssaiEntry {
    sst: u8,
    #[serde(default)]
    sd: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlmnSupportEntry {
    plmn_id: PlmnIdEntry,
    #[serde(default)]
    s_nssai: Vec<SNssaiEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SecuritySection {
    #[serde(default)]
    integrity_order: Vec<String>,
    #[serde(default)]
    ciphering_order: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NetworkNameSection {
    full: Option<String>,
    short: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct TimeValue {
    value: u64,
    max_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TimeSection {
    t3512: Option<TimeValue>,
    t3502: Option<TimeValue>,
    t3513: Option<TimeValue>,
    t3522: Option<TimeValue>,
    t3550: Option<TimeValue>,
    t3555: Option<TimeValue>,
    t3560: Option<TimeValue>,
    t3570: Option<TimeValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AmfSection {
    amf_name: Option<String>,
    #[serde(default)]
    guami: Vec<GuamiEntry>,
    #[serde(default)]
    tai: Vec<TaiEntry>,
    #[serde(default)]
    plmn_support: Vec<PlmnSupportEntry>,
    #[serde(default)]
    security: SecuritySection,
    #[serde(default)]
    network_name: NetworkNameSection,
    #[serde(default)]
    time: TimeSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggerSection {
    level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MaxSection {
    ue: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    logger: LoggerSection,
    #[serde(default)]
    max: MaxSection,
    amf: Option<AmfSection>,
}

// ============================================================================
// Validated configuration
// ============================================================================

/// S-NSSAI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SNssai {
    /// Slice/Service Type
    pub sst: u8,
    /// Slice Differentiator (24 bits)
    pub sd: Option<u32>,
}

/// PLMN support item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlmnSupport {
    pub plmn_id: PlmnId,
    pub s_nssai: Vec<SNssai>,
}

/// Network name sent in the configuration update command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkName {
    pub full: Option<String>,
    pub short: Option<String>,
}

/// Validated AMF configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmfConfig {
    pub amf_name: Option<String>,
    pub served_guami: Vec<Guami>,
    pub served_tai: Vec<Tai5gs>,
    pub plmn_support: Vec<PlmnSupport>,
    /// Integrity algorithms in preference order
    pub integrity_order: Vec<u8>,
    /// Ciphering algorithms in preference order
    pub ciphering_order: Vec<u8>,
    pub network_name: NetworkName,
    /// Periodic registration update timer
    pub t3512: Duration,
    /// Registration retry timer
    pub t3502: Duration,
    /// GMM procedure timers
    pub timers: AmfTimerConfigs,
    pub max_num_of_ue: usize,
    pub log_level: Option<String>,
}

impl Default for AmfConfig {
    fn default() -> Self {
        // 999/70 is the test PLMN used by the sample configuration
        let plmn_id = PlmnId {
            mcc1: 9,
            mcc2: 9,
            mcc3: 9,
            mnc1: 7,
            mnc2: 0,
            mnc3: 0xf,
        };
        Self {
            amf_name: None,
            served_guami: vec![Guami {
                plmn_id,
                amf_id: AmfId {
                    region: 2,
                    set: 1,
                    pointer: 0,
                },
            }],
            served_tai: vec![Tai5gs { plmn_id, tac: 1 }],
            plmn_support: vec![PlmnSupport {
                plmn_id,
                s_nssai: vec![SNssai { sst: 1, sd: None }],
            }],
            integrity_order: vec![algorithm::NIA2, algorithm::NIA1, algorithm::NIA0],
            ciphering_order: vec![algorithm::NEA0, algorithm::NEA1, algorithm::NEA2],
            network_name: NetworkName::default(),
            t3512: Duration::from_secs(540),
            t3502: Duration::from_secs(720),
            timers: AmfTimerConfigs::default(),
            max_num_of_ue: DEFAULT_MAX_NUM_OF_UE,
            log_level: None,
        }
    }
}

/// Parse an algorithm name of the given family, e.g. `NIA2`
fn parse_algorithm(prefix: &str, name: &str) -> Result<u8, ConfigError> {
    let upper = name.trim().to_ascii_uppercase();
    upper
        .strip_prefix(prefix)
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| *n <= 3)
        .ok_or_else(|| ConfigError::UnknownAlgorithm(name.to_string()))
}

fn apply_timer(config: &mut TimerConfig, value: Option<TimeValue>) {
    if let Some(value) = value {
        config.duration = Duration::from_secs(value.value);
        if let Some(max_count) = value.max_count {
            config.max_count = max_count;
        }
    }
}

impl AmfConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let mut config = AmfConfig {
            log_level: file.logger.level,
            ..AmfConfig::default()
        };
        if let Some(ue) = file.max.ue {
            config.max_num_of_ue = ue;
        }

        let Some(amf) = file.amf else {
            log::warn!("No 'amf' section in config file");
            return Ok(config);
        };

        config.amf_name = amf.amf_name;

        if amf.guami.is_empty() {
            return Err(ConfigError::Missing("amf.guami"));
        }
        config.served_guami = amf
            .guami
            .iter()
            .map(|entry| {
                Ok(Guami {
                    plmn_id: entry.plmn_id.to_plmn_id()?,
                    amf_id: AmfId::new(entry.amf_id.region, entry.amf_id.set, entry.amf_id.pointer)?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;

        if !amf.tai.is_empty() {
            config.served_tai = amf
                .tai
                .iter()
                .map(|entry| {
                    Ok(Tai5gs {
                        plmn_id: entry.plmn_id.to_plmn_id()?,
                        tac: entry.tac,
                    })
                })
                .collect::<Result<_, ConfigError>>()?;
        }

        if !amf.plmn_support.is_empty() {
            config.plmn_support = amf
                .plmn_support
                .iter()
                .map(|entry| {
                    let s_nssai = entry
                        .s_nssai
                        .iter()
                        .map(|s| SNssai {
                            sst: s.sst,
                            sd: s.sd.as_deref().and_then(|sd| u32::from_str_radix(sd, 16).ok()),
                        })
                        .collect();
                    Ok(PlmnSupport {
                        plmn_id: entry.plmn_id.to_plmn_id()?,
                        s_nssai,
                    })
                })
                .collect::<Result<_, ConfigError>>()?;
        }

        if !amf.security.integrity_order.is_empty() {
            config.integrity_order = amf
                .security
                .integrity_order
                .iter()
                .map(|name| parse_algorithm("NIA", name))
                .collect::<Result<_, _>>()?;
        }
        if !amf.security.ciphering_order.is_empty() {
            config.ciphering_order = amf
                .security
                .ciphering_order
                .iter()
                .map(|name| parse_algorithm("NEA", name))
                .collect::<Result<_, _>>()?;
        }

        config.network_name = NetworkName {
            full: amf.network_name.full,
            short: amf.network_name.short,
        };

        let time = amf.time;
        if let Some(t3512) = time.t3512 {
            config.t3512 = Duration::from_secs(t3512.value);
        }
        if let Some(t3502) = time.t3502 {
            config.t3502 = Duration::from_secs(t3502.value);
        }
        apply_timer(&mut config.timers.t3513, time.t3513);
        apply_timer(&mut config.timers.t3522, time.t3522);
        apply_timer(&mut config.timers.t3550, time.t3550);
        apply_timer(&mut config.timers.t3555, time.t3555);
        apply_timer(&mut config.timers.t3560, time.t3560);
        apply_timer(&mut config.timers.t3570, time.t3570);

        for guami in &config.served_guami {
            log::info!(
                "Configured GUAMI: PLMN {}, AMF ID {}",
                guami.plmn_id,
                guami.amf_id
            );
        }

        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Could not read config file '{}': {}. Using defaults.",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
logger:
  level: debug
max:
  ue: 4096
amf:
  amf_name: nextgcore-amf0
  guami:
    - plmn_id: { mcc: "001", mnc: "01" }
      amf_id: { region: 2, set: 1, pointer: 3 }
  tai:
    - plmn_id: { mcc: "001", mnc: "01" }
      tac: 7
  plmn_support:
    - plmn_id: { mcc: "001", mnc: "01" }
      s_nssai:
        - sst: 1
          sd: "000001"
  security:
    integrity_order: [ NIA1, NIA2 ]
    ciphering_order: [ NEA2, NEA0 ]
  network_name:
    full: NextGCore
  time:
    t3512:
      value: 3240
    t3560:
      value: 2
      max_count: 1
"#;

    #[test]
    fn test_parse_sample() {
        let config = AmfConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.amf_name.as_deref(), Some("nextgcore-amf0"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.max_num_of_ue, 4096);

        let guami = config.served_guami[0];
        assert_eq!(guami.plmn_id.to_string(), "00101");
        assert_eq!(guami.amf_id, AmfId { region: 2, set: 1, pointer: 3 });
        assert_eq!(config.served_tai[0].tac, 7);
        assert_eq!(config.plmn_support[0].s_nssai[0], SNssai { sst: 1, sd: Some(1) });

        assert_eq!(config.integrity_order, vec![1, 2]);
        assert_eq!(config.ciphering_order, vec![2, 0]);
        assert_eq!(config.network_name.full.as_deref(), Some("NextGCore"));

        assert_eq!(config.t3512, Duration::from_secs(3240));
        assert_eq!(config.timers.t3560, TimerConfig::new(1, 2));
        assert_eq!(config.timers.t3570, TimerConfig::new(4, 3));
    }

    #[test]
    fn test_numeric_mcc() {
        let yaml = r#"
amf:
  guami:
    - plmn_id: { mcc: 1, mnc: "070" }
      amf_id: { region: 2, set: 1 }
"#;
        let config = AmfConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.served_guami[0].plmn_id.to_string(), "001070");
    }

    #[test]
    fn test_numeric_mnc_rejected() {
        for mnc in [70, 1] {
            let yaml = format!(
                r#"
amf:
  guami:
    - plmn_id: {{ mcc: "001", mnc: {} }}
      amf_id: {{ region: 2, set: 1 }}
"#,
                mnc
            );
            assert!(
                matches!(AmfConfig::from_yaml_str(&yaml), Err(ConfigError::Invalid(_))),
                "mnc: {}",
                mnc
            );
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        let yaml = r#"
amf:
  guami:
    - plmn_id: { mcc: "001", mnc: "01" }
      amf_id: { region: 2, set: 1 }
  security:
    integrity_order: [ NIA9 ]
"#;
        assert!(matches!(
            AmfConfig::from_yaml_str(yaml),
            Err(ConfigError::UnknownAlgorithm(name)) if name == "NIA9"
        ));
    }

    #[test]
    fn test_missing_guami() {
        let yaml = "amf:\n  amf_name: x\n";
        assert!(matches!(
            AmfConfig::from_yaml_str(yaml),
            Err(ConfigError::Missing("amf.guami"))
        ));
    }

    #[test]
    fn test_invalid_amf_set() {
        let yaml = r#"
amf:
  guami:
    - plmn_id: { mcc: "001", mnc: "01" }
      amf_id: { region: 2, set: 1024 }
"#;
        assert!(matches!(
            AmfConfig::from_yaml_str(yaml),
            Err(ConfigError::Identity(GutiError::InvalidAmfId(_)))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AmfConfig::load("/nonexistent/amf.yaml").unwrap();
        assert_eq!(config, AmfConfig::default());
        assert_eq!(config.served_guami[0].plmn_id.to_string(), "99970");
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("NIA", "nia2").unwrap(), 2);
        assert_eq!(parse_algorithm("NEA", "NEA0").unwrap(), 0);
        assert!(parse_algorithm("NEA", "NIA1").is_err());
    }
}
