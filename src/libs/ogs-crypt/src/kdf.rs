//! Key Derivation Functions
//!
//! 5GS key hierarchy derivations as defined in 3GPP TS 33.501 Annex A, all
//! built on the generic KDF of TS 33.220 clause B.2.0 (HMAC-SHA-256 over
//! `FC || P0 || L0 || P1 || L1 ...`).
//!
//! Every function validates its key and parameter lengths and returns
//! [`CryptError`] instead of producing key material from bad input.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptError;

/// Length of a 256-bit key (Kseaf, Kamf, KgNB, NH)
pub const OGS_SHA256_DIGEST_SIZE: usize = 32;
/// Length of a 128-bit NAS key
pub const OGS_KEY_LEN: usize = 16;
/// Maximum length of a single KDF parameter (`L` is 16 bits)
pub const OGS_KDF_MAX_PARAM_LEN: usize = u16::MAX as usize;

// FC (Function Code) values, TS 33.501 Annex A.1
const FC_FOR_5GS_ALGORITHM_KEY_DERIVATION: u8 = 0x69;
const FC_FOR_KSEAF_DERIVATION: u8 = 0x6C;
const FC_FOR_KAMF_DERIVATION: u8 = 0x6D;
const FC_FOR_KGNB_KN3IWF_DERIVATION: u8 = 0x6E;
const FC_FOR_NH_GNB_DERIVATION: u8 = 0x6F;

// Algorithm type distinguishers, TS 33.501 Annex A.8
pub const OGS_KDF_NAS_ENC_ALG: u8 = 0x01;
pub const OGS_KDF_NAS_INT_ALG: u8 = 0x02;

// Access type distinguishers, TS 33.501 Annex A.9
pub const OGS_KDF_ACCESS_TYPE_3GPP: u8 = 0x01;
pub const OGS_KDF_ACCESS_TYPE_NON_3GPP: u8 = 0x02;

type HmacSha256 = Hmac<Sha256>;

/// 256-bit derived key
pub type Key256 = [u8; OGS_SHA256_DIGEST_SIZE];
/// 128-bit derived key
pub type Key128 = [u8; OGS_KEY_LEN];

fn check_key_len(key: &[u8]) -> Result<(), CryptError> {
    if key.len() != OGS_SHA256_DIGEST_SIZE {
        return Err(CryptError::InvalidKeyLength {
            expected: OGS_SHA256_DIGEST_SIZE,
            actual: key.len(),
        });
    }
    Ok(())
}

/// Generic KDF, TS 33.220 clause B.2.0.
///
/// Empty parameters are skipped, as in the reference implementation.
pub fn ogs_kdf_common(key: &[u8], fc: u8, params: &[&[u8]]) -> Result<Key256, CryptError> {
    if key.is_empty() {
        return Err(CryptError::InvalidKeyLength {
            expected: OGS_SHA256_DIGEST_SIZE,
            actual: 0,
        });
    }

    let mut s = Vec::with_capacity(1 + params.iter().map(|p| p.len() + 2).sum::<usize>());
    s.push(fc);
    for param in params.iter().filter(|p| !p.is_empty()) {
        if param.len() > OGS_KDF_MAX_PARAM_LEN {
            return Err(CryptError::ParameterTooLong(param.len()));
        }
        s.extend_from_slice(param);
        s.extend_from_slice(&(param.len() as u16).to_be_bytes());
    }

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptError::Primitive(e.to_string()))?;
    mac.update(&s);

    let mut output = [0u8; OGS_SHA256_DIGEST_SIZE];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Ok(output)
}

/// TS 33.501 Annex A.6: Kseaf derivation from Kausf
pub fn ogs_kdf_kseaf(serving_network_name: &str, kausf: &[u8]) -> Result<Key256, CryptError> {
    check_key_len(kausf)?;
    ogs_kdf_common(
        kausf,
        FC_FOR_KSEAF_DERIVATION,
        &[serving_network_name.as_bytes()],
    )
}

/// TS 33.501 Annex A.7: Kamf derivation from Kseaf, the SUPI digits and ABBA
pub fn ogs_kdf_kamf(supi_value: &str, abba: &[u8], kseaf: &[u8]) -> Result<Key256, CryptError> {
    check_key_len(kseaf)?;
    if supi_value.is_empty() {
        return Err(CryptError::MissingParameter("SUPI"));
    }
    ogs_kdf_common(
        kseaf,
        FC_FOR_KAMF_DERIVATION,
        &[supi_value.as_bytes(), abba],
    )
}

/// TS 33.501 Annex A.8: NAS algorithm key derivation.
///
/// Returns the low 128 bits of the KDF output.
pub fn ogs_kdf_nas_5gs(
    algorithm_type_distinguisher: u8,
    algorithm_identity: u8,
    kamf: &[u8],
) -> Result<Key128, CryptError> {
    check_key_len(kamf)?;
    let output = ogs_kdf_common(
        kamf,
        FC_FOR_5GS_ALGORITHM_KEY_DERIVATION,
        &[&[algorithm_type_distinguisher], &[algorithm_identity]],
    )?;

    let mut knas = [0u8; OGS_KEY_LEN];
    knas.copy_from_slice(&output[OGS_KEY_LEN..]);
    Ok(knas)
}

/// TS 33.501 Annex A.9: KgNB / Kn3iwf derivation
pub fn ogs_kdf_kgnb_and_kn3iwf(
    kamf: &[u8],
    ul_count: u32,
    access_type_distinguisher: u8,
) -> Result<Key256, CryptError> {
    check_key_len(kamf)?;
    ogs_kdf_common(
        kamf,
        FC_FOR_KGNB_KN3IWF_DERIVATION,
        &[&ul_count.to_be_bytes(), &[access_type_distinguisher]],
    )
}

/// TS 33.501 Annex A.10: NH derivation
pub fn ogs_kdf_nh_gnb(kamf: &[u8], sync_input: &[u8]) -> Result<Key256, CryptError> {
    check_key_len(kamf)?;
    check_key_len(sync_input)?;
    ogs_kdf_common(kamf, FC_FOR_NH_GNB_DERIVATION, &[sync_input])
}

/// Decode a hex-encoded 256-bit key as delivered over SBI
pub fn ogs_key_from_hex(hex_key: &str) -> Result<Key256, CryptError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| CryptError::Decode(e.to_string()))?;
    check_key_len(&bytes)?;
    let mut key = [0u8; OGS_SHA256_DIGEST_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];

    #[test]
    fn test_kdf_common_deterministic() {
        let a = ogs_kdf_common(&KEY, 0x6D, &[b"0010100000001", &[0, 0]]).unwrap();
        let b = ogs_kdf_common(&KEY, 0x6D, &[b"0010100000001", &[0, 0]]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kdf_common_fc_separates_outputs() {
        let a = ogs_kdf_common(&KEY, 0x6E, &[&[1]]).unwrap();
        let b = ogs_kdf_common(&KEY, 0x6F, &[&[1]]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_kdf_common_rejects_empty_key() {
        assert_eq!(
            ogs_kdf_common(&[], 0x6D, &[b"x"]),
            Err(CryptError::InvalidKeyLength { expected: 32, actual: 0 })
        );
    }

    #[test]
    fn test_kdf_common_rejects_oversized_param() {
        let big = vec![0u8; OGS_KDF_MAX_PARAM_LEN + 1];
        assert_eq!(
            ogs_kdf_common(&KEY, 0x6D, &[&big]),
            Err(CryptError::ParameterTooLong(OGS_KDF_MAX_PARAM_LEN + 1))
        );
    }

    #[test]
    fn test_kamf_depends_on_supi_and_abba() {
        let a = ogs_kdf_kamf("001010000000001", &[0, 0], &KEY).unwrap();
        let b = ogs_kdf_kamf("001010000000002", &[0, 0], &KEY).unwrap();
        let c = ogs_kdf_kamf("001010000000001", &[0, 1], &KEY).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kamf_rejects_short_kseaf() {
        assert_eq!(
            ogs_kdf_kamf("001010000000001", &[0, 0], &KEY[..16]),
            Err(CryptError::InvalidKeyLength { expected: 32, actual: 16 })
        );
        assert_eq!(
            ogs_kdf_kamf("", &[0, 0], &KEY),
            Err(CryptError::MissingParameter("SUPI"))
        );
    }

    #[test]
    fn test_nas_keys_independent() {
        let enc = ogs_kdf_nas_5gs(OGS_KDF_NAS_ENC_ALG, 2, &KEY).unwrap();
        let int = ogs_kdf_nas_5gs(OGS_KDF_NAS_INT_ALG, 2, &KEY).unwrap();
        assert_ne!(enc, int);
        assert_eq!(enc.len(), OGS_KEY_LEN);
    }

    #[test]
    fn test_nas_key_is_low_half() {
        let full = ogs_kdf_common(
            &KEY,
            FC_FOR_5GS_ALGORITHM_KEY_DERIVATION,
            &[&[OGS_KDF_NAS_INT_ALG], &[1]],
        )
        .unwrap();
        let knas = ogs_kdf_nas_5gs(OGS_KDF_NAS_INT_ALG, 1, &KEY).unwrap();
        assert_eq!(&full[16..], &knas[..]);
    }

    #[test]
    fn test_kgnb_depends_on_count() {
        let a = ogs_kdf_kgnb_and_kn3iwf(&KEY, 0, OGS_KDF_ACCESS_TYPE_3GPP).unwrap();
        let b = ogs_kdf_kgnb_and_kn3iwf(&KEY, 1, OGS_KDF_ACCESS_TYPE_3GPP).unwrap();
        let c = ogs_kdf_kgnb_and_kn3iwf(&KEY, 0, OGS_KDF_ACCESS_TYPE_NON_3GPP).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_nh_chain() {
        let kgnb = ogs_kdf_kgnb_and_kn3iwf(&KEY, 0, OGS_KDF_ACCESS_TYPE_3GPP).unwrap();
        let nh1 = ogs_kdf_nh_gnb(&KEY, &kgnb).unwrap();
        let nh2 = ogs_kdf_nh_gnb(&KEY, &nh1).unwrap();
        assert_ne!(nh1, kgnb);
        assert_ne!(nh2, nh1);
        assert!(ogs_kdf_nh_gnb(&KEY, &kgnb[..31]).is_err());
    }

    #[test]
    fn test_key_from_hex() {
        let hex_key = "11".repeat(32);
        assert_eq!(ogs_key_from_hex(&hex_key).unwrap(), KEY);
        assert!(matches!(ogs_key_from_hex("zz"), Err(CryptError::Decode(_))));
        assert!(matches!(
            ogs_key_from_hex("1122"),
            Err(CryptError::InvalidKeyLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_kseaf() {
        let a = ogs_kdf_kseaf("5G:mnc001.mcc001.3gppnetwork.org", &KEY).unwrap();
        let b = ogs_kdf_kseaf("5G:mnc002.mcc001.3gppnetwork.org", &KEY).unwrap();
        assert_ne!(a, b);
    }

    mod property {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// NAS keys are the low half of the 256-bit KDF output
            #[test]
            fn prop_nas_key_is_low_half(key in any::<[u8; 32]>(), alg in 0u8..8) {
                let full = ogs_kdf_common(
                    &key,
                    FC_FOR_5GS_ALGORITHM_KEY_DERIVATION,
                    &[&[OGS_KDF_NAS_ENC_ALG], &[alg]],
                ).unwrap();
                let knas = ogs_kdf_nas_5gs(OGS_KDF_NAS_ENC_ALG, alg, &key).unwrap();
                prop_assert_eq!(&full[16..], &knas[..]);
            }

            /// Anything but a 256-bit anchor key is refused
            #[test]
            fn prop_kamf_rejects_wrong_key_length(
                key in prop::collection::vec(any::<u8>(), 1..64)
                    .prop_filter("not 32 bytes", |key| key.len() != 32)
            ) {
                prop_assert_eq!(
                    ogs_kdf_kamf("001010000000001", &[0, 0], &key),
                    Err(CryptError::InvalidKeyLength { expected: 32, actual: key.len() })
                );
            }

            /// Each NH differs from the value it was chained from
            #[test]
            fn prop_nh_moves_forward(kamf in any::<[u8; 32]>(), sync_input in any::<[u8; 32]>()) {
                let nh = ogs_kdf_nh_gnb(&kamf, &sync_input).unwrap();
                prop_assert_ne!(nh, sync_input);
                prop_assert_eq!(ogs_kdf_nh_gnb(&kamf, &sync_input).unwrap(), nh);
            }

            /// Hex transport encoding decodes to the same key
            #[test]
            fn prop_key_from_hex(key in any::<[u8; 32]>()) {
                prop_assert_eq!(ogs_key_from_hex(&hex::encode(key)).unwrap(), key);
            }
        }
    }
}
