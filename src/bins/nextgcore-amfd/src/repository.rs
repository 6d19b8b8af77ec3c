//! Subscriber repository
//!
//! Authentication and subscription data come from peer network functions
//! (AUSF/UDM) in production. The procedure driver only sees this trait.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::{NetworkName, SNssai};
use crate::context::UeIdentity;
use crate::error::{AmfError, AmfResult};
use crate::types::PlmnId;

/// Result of a successful primary authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberProfile {
    /// Permanent identity, `imsi-...`
    pub supi: String,
    /// Anchor key Kseaf as 64 hex characters
    pub kseaf: String,
    pub abba: Vec<u8>,
    /// Subscribed S-NSSAIs
    pub s_nssai: Vec<SNssai>,
}

/// Serving-operator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    pub plmn_id: PlmnId,
    pub network_name: NetworkName,
}

pub trait SubscriberRepository: Send + Sync {
    /// Authenticate and fetch the subscriber behind a SUCI, SUPI or GUTI
    fn get_subscriber_by_identity(&self, identity: &UeIdentity) -> AmfResult<SubscriberProfile>;

    fn get_operator_info(&self, plmn_id: &PlmnId) -> AmfResult<OperatorInfo>;
}

/// Repository backed by a map, keyed by any identity string
#[derive(Default)]
pub struct MemoryRepository {
    subscribers: RwLock<HashMap<String, SubscriberProfile>>,
    operators: RwLock<HashMap<PlmnId, OperatorInfo>>,
}

fn identity_key(identity: &UeIdentity) -> String {
    match identity {
        UeIdentity::Supi(supi) => supi.clone(),
        UeIdentity::Suci(suci) => suci.clone(),
        UeIdentity::Guti(guti) => guti.to_string(),
        UeIdentity::AmfUeNgapId(id) => format!("amf-ue-ngap-id-{}", id),
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `profile` reachable through `identity`
    pub fn insert_subscriber(&self, identity: &UeIdentity, profile: SubscriberProfile) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity_key(identity), profile);
    }

    pub fn insert_operator(&self, info: OperatorInfo) {
        self.operators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(info.plmn_id, info);
    }
}

impl SubscriberRepository for MemoryRepository {
    fn get_subscriber_by_identity(&self, identity: &UeIdentity) -> AmfResult<SubscriberProfile> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&identity_key(identity))
            .cloned()
            .ok_or(AmfError::NotFound("subscriber"))
    }

    fn get_operator_info(&self, plmn_id: &PlmnId) -> AmfResult<OperatorInfo> {
        self.operators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(plmn_id)
            .cloned()
            .ok_or(AmfError::NotFound("operator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_repository() {
        let repo = MemoryRepository::new();
        let suci = UeIdentity::Suci("suci-0-001-01-0000-0-0-0000000001".into());
        repo.insert_subscriber(
            &suci,
            SubscriberProfile {
                supi: "imsi-001010000000001".into(),
                kseaf: "00".repeat(32),
                abba: vec![0x00, 0x00],
                s_nssai: vec![SNssai { sst: 1, sd: None }],
            },
        );

        let profile = repo.get_subscriber_by_identity(&suci).unwrap();
        assert_eq!(profile.supi, "imsi-001010000000001");
        assert_eq!(
            repo.get_subscriber_by_identity(&UeIdentity::Supi("imsi-1".into())),
            Err(AmfError::NotFound("subscriber"))
        );

        let plmn_id = PlmnId::new("001", "01").unwrap();
        repo.insert_operator(OperatorInfo {
            plmn_id,
            network_name: NetworkName {
                full: Some("NextGCore".into()),
                short: None,
            },
        });
        assert_eq!(repo.get_operator_info(&plmn_id).unwrap().plmn_id, plmn_id);
    }
}
