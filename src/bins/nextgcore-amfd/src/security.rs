//! 5GS security key chain
//!
//! Kseaf -> Kamf -> {KNASint, KNASenc, KgNB -> NH -> NH ...}, plus NAS
//! algorithm selection and NAS COUNT bookkeeping. All derivations return
//! fresh values; callers commit them only once every step has succeeded.

use ogs_crypt::kdf::{
    ogs_kdf_kamf, ogs_kdf_kgnb_and_kn3iwf, ogs_kdf_nas_5gs, ogs_kdf_nh_gnb, ogs_key_from_hex,
    Key128, Key256, OGS_KDF_NAS_ENC_ALG, OGS_KDF_NAS_INT_ALG,
};
use ogs_crypt::CryptError;

use crate::error::AmfResult;
use crate::types::ogs_id_get_value;

// ============================================================================
// Constants
// ============================================================================

/// ngKSI value meaning "no key is available"
pub const OGS_NAS_KSI_NO_KEY_IS_AVAILABLE: u8 = 7;

/// Maximum ABBA length
pub const OGS_NAS_MAX_ABBA_LEN: usize = 2;

/// NAS security algorithm identifiers (TS 24.501 9.11.3.34)
pub mod algorithm {
    pub const NEA0: u8 = 0;
    pub const NEA1: u8 = 1;
    pub const NEA2: u8 = 2;
    pub const NEA3: u8 = 3;
    pub const NIA0: u8 = 0;
    pub const NIA1: u8 = 1;
    pub const NIA2: u8 = 2;
    pub const NIA3: u8 = 3;
}

/// Get algorithm name for logging
pub fn get_encryption_algorithm_name(algo: u8) -> &'static str {
    match algo {
        0 => "NEA0",
        1 => "128-NEA1",
        2 => "128-NEA2",
        3 => "128-NEA3",
        _ => "Unknown",
    }
}

/// Get algorithm name for logging
pub fn get_integrity_algorithm_name(algo: u8) -> &'static str {
    match algo {
        0 => "NIA0",
        1 => "128-NIA1",
        2 => "128-NIA2",
        3 => "128-NIA3",
        _ => "Unknown",
    }
}

// ============================================================================
// UE security capability / algorithm selection
// ============================================================================

/// UE security capability (TS 24.501 9.11.3.54). Bit `0x80 >> n` marks
/// algorithm `n` as supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UeSecurityCapability {
    /// 5G-EA algorithms (bitmap)
    pub nr_ea: u8,
    /// 5G-IA algorithms (bitmap)
    pub nr_ia: u8,
    /// EEA algorithms (bitmap)
    pub eutra_ea: u8,
    /// EIA algorithms (bitmap)
    pub eutra_ia: u8,
}

impl UeSecurityCapability {
    pub fn supports_ea(&self, alg: u8) -> bool {
        alg < 8 && self.nr_ea & (0x80 >> alg) != 0
    }

    pub fn supports_ia(&self, alg: u8) -> bool {
        alg < 8 && self.nr_ia & (0x80 >> alg) != 0
    }
}

/// Algorithms chosen for a NAS security context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectedAlgorithms {
    pub enc: u8,
    pub int: u8,
}

/// Pick the first configured algorithm the UE supports, integrity first.
///
/// Without a capability, or with no overlap, the null algorithm is chosen
/// and a warning is logged.
pub fn select_security_algorithms(
    integrity_order: &[u8],
    ciphering_order: &[u8],
    capability: Option<&UeSecurityCapability>,
) -> SelectedAlgorithms {
    let Some(capability) = capability else {
        log::warn!("No UE security capability, falling back to NIA0/NEA0");
        return SelectedAlgorithms {
            enc: algorithm::NEA0,
            int: algorithm::NIA0,
        };
    };

    let int = integrity_order
        .iter()
        .copied()
        .find(|&alg| capability.supports_ia(alg))
        .unwrap_or_else(|| {
            log::warn!(
                "No common integrity algorithm [UE:{:#04x}], falling back to NIA0",
                capability.nr_ia
            );
            algorithm::NIA0
        });

    let enc = ciphering_order
        .iter()
        .copied()
        .find(|&alg| capability.supports_ea(alg))
        .unwrap_or_else(|| {
            log::warn!(
                "No common ciphering algorithm [UE:{:#04x}], falling back to NEA0",
                capability.nr_ea
            );
            algorithm::NEA0
        });

    log::debug!(
        "Selected security algorithms: enc={} int={}",
        get_encryption_algorithm_name(enc),
        get_integrity_algorithm_name(int)
    );

    SelectedAlgorithms { enc, int }
}

// ============================================================================
// Key derivation
// ============================================================================

/// NAS integrity and ciphering keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NasKeys {
    pub knas_int: Key128,
    pub knas_enc: Key128,
}

/// Decode the hex anchor key (Kseaf) delivered by the AUSF
pub fn anchor_key_from_hex(kseaf: &str) -> AmfResult<Key256> {
    Ok(ogs_key_from_hex(kseaf)?)
}

/// Kamf from Kseaf, the SUPI digits and ABBA
pub fn derive_kamf(kseaf: &Key256, supi: &str, abba: &[u8]) -> AmfResult<Key256> {
    let supi_value = ogs_id_get_value(supi).ok_or(CryptError::MissingParameter("SUPI"))?;
    Ok(ogs_kdf_kamf(supi_value, abba, kseaf)?)
}

/// KNASint and KNASenc for the selected algorithms
pub fn derive_algorithm_keys(kamf: &Key256, enc_alg: u8, int_alg: u8) -> AmfResult<NasKeys> {
    let knas_int = ogs_kdf_nas_5gs(OGS_KDF_NAS_INT_ALG, int_alg, kamf)?;
    let knas_enc = ogs_kdf_nas_5gs(OGS_KDF_NAS_ENC_ALG, enc_alg, kamf)?;
    Ok(NasKeys { knas_int, knas_enc })
}

/// KgNB (or Kn3iwf) bound to the uplink NAS COUNT
pub fn derive_access_network_key(kamf: &Key256, ul_count: u32, access_type: u8) -> AmfResult<Key256> {
    Ok(ogs_kdf_kgnb_and_kn3iwf(kamf, ul_count, access_type)?)
}

/// Next hop. `sync_input` is KgNB for the first NH, then the previous NH.
pub fn derive_next_hop(kamf: &Key256, sync_input: &Key256) -> AmfResult<Key256> {
    Ok(ogs_kdf_nh_gnb(kamf, sync_input)?)
}

// ============================================================================
// NAS COUNT
// ============================================================================

/// 24-bit NAS COUNT: 16-bit overflow and 8-bit sequence number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NasCount(u32);

impl NasCount {
    const MASK: u32 = 0x00ff_ffff;

    pub fn new(value: u32) -> Self {
        Self(value & Self::MASK)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn sqn(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    pub fn overflow(&self) -> u16 {
        (self.0 >> 8) as u16
    }

    /// Advance by one after sending a protected message
    pub fn increment(&mut self) {
        self.0 = (self.0 + 1) & Self::MASK;
    }

    /// Estimate the full COUNT from a received 8-bit SQN
    pub fn update_from_sqn(&mut self, sqn: u8) {
        let mut overflow = self.overflow();
        if self.sqn() > sqn {
            overflow = overflow.wrapping_add(1);
        }
        self.0 = ((overflow as u32) << 8) | sqn as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AmfError;

    const KSEAF: Key256 = [0x5a; 32];

    fn cap(nr_ea: u8, nr_ia: u8) -> UeSecurityCapability {
        UeSecurityCapability {
            nr_ea,
            nr_ia,
            ..Default::default()
        }
    }

    #[test]
    fn test_select_in_configured_order() {
        // UE supports 0, 1, 2
        let ue = cap(0xe0, 0xe0);
        let selected = select_security_algorithms(&[2, 1, 0], &[0, 1, 2], Some(&ue));
        assert_eq!(selected, SelectedAlgorithms { enc: 0, int: 2 });

        let selected = select_security_algorithms(&[3, 1], &[3, 2], Some(&ue));
        assert_eq!(selected, SelectedAlgorithms { enc: 2, int: 1 });
    }

    #[test]
    fn test_select_falls_back_to_null() {
        let selected = select_security_algorithms(&[2], &[2], None);
        assert_eq!(selected, SelectedAlgorithms { enc: 0, int: 0 });

        let selected = select_security_algorithms(&[3], &[3], Some(&cap(0x40, 0x40)));
        assert_eq!(selected, SelectedAlgorithms { enc: 0, int: 0 });
    }

    #[test]
    fn test_capability_bits() {
        let ue = cap(0x20, 0x10);
        assert!(ue.supports_ea(2));
        assert!(!ue.supports_ea(1));
        assert!(ue.supports_ia(3));
        assert!(!ue.supports_ia(8));
    }

    #[test]
    fn test_derive_kamf_uses_supi_value() {
        let kamf = derive_kamf(&KSEAF, "imsi-001010000000001", &[0, 0]).unwrap();
        let direct = ogs_kdf_kamf("001010000000001", &[0, 0], &KSEAF).unwrap();
        assert_eq!(kamf, direct);

        assert_eq!(
            derive_kamf(&KSEAF, "001010000000001", &[0, 0]),
            Err(AmfError::CryptoDerivation(CryptError::MissingParameter("SUPI")))
        );
    }

    #[test]
    fn test_anchor_key_decode_failure() {
        assert!(matches!(
            anchor_key_from_hex("not-hex"),
            Err(AmfError::CryptoDerivation(CryptError::Decode(_)))
        ));
        assert_eq!(anchor_key_from_hex(&"5a".repeat(32)).unwrap(), KSEAF);
    }

    #[test]
    fn test_key_chain() {
        let kamf = derive_kamf(&KSEAF, "imsi-001010000000001", &[0, 0]).unwrap();
        let keys = derive_algorithm_keys(&kamf, 2, 2).unwrap();
        assert_ne!(keys.knas_int, keys.knas_enc);

        let kgnb = derive_access_network_key(&kamf, 0, 1).unwrap();
        let nh1 = derive_next_hop(&kamf, &kgnb).unwrap();
        let nh2 = derive_next_hop(&kamf, &nh1).unwrap();
        assert_ne!(nh1, [0u8; 32]);
        assert_ne!(nh1, nh2);
    }

    #[test]
    fn test_nas_count() {
        let mut count = NasCount::new(0x00ff_ffff);
        count.increment();
        assert_eq!(count.value(), 0);

        let mut ul = NasCount::new(0x01fe);
        ul.update_from_sqn(0xff);
        assert_eq!(ul.value(), 0x01ff);
        ul.update_from_sqn(0x02);
        assert_eq!(ul.overflow(), 2);
        assert_eq!(ul.sqn(), 2);
        assert_eq!(ul.value(), 0x0202);
    }
}
