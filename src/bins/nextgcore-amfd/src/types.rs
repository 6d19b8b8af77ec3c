//! Identity types
//!
//! PLMN, AMF ID, GUAMI, 5G-TMSI and 5G-GUTI with their text and binary
//! encodings (TS 23.003 clause 2.10, TS 24.501 clause 9.11.3.4).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Length of the 5GS mobile identity contents carrying a 5G-GUTI
pub const OGS_NAS_5GS_GUTI_LEN: usize = 11;
/// First octet of a GUTI mobile identity: filler `1111`, type `010`
pub const OGS_NAS_5GS_MOBILE_IDENTITY_GUTI_OCTET: u8 = 0xf2;
/// Type-of-identity value for 5G-GUTI
pub const OGS_NAS_5GS_MOBILE_IDENTITY_GUTI: u8 = 0x02;

/// Text GUTI length with a 2-digit MNC
const GUTI_TEXT_LEN_MNC2: usize = 19;
/// Text GUTI length with a 3-digit MNC
const GUTI_TEXT_LEN_MNC3: usize = 20;

/// GUTI and identity encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GutiError {
    #[error("invalid GUTI length: {0}")]
    InvalidLength(usize),

    #[error("invalid digit {value:#x} in {field}")]
    InvalidDigit { field: &'static str, value: u8 },

    #[error("invalid TMSI")]
    InvalidTmsi,

    #[error("invalid PLMN: {0}")]
    InvalidPlmn(String),

    #[error("invalid AMF ID: {0}")]
    InvalidAmfId(String),

    #[error("invalid mobile identity type: {0:#x}")]
    InvalidIdentityType(u8),
}

fn check_digit(field: &'static str, value: u8) -> Result<u8, GutiError> {
    if value > 9 {
        return Err(GutiError::InvalidDigit { field, value });
    }
    Ok(value)
}

fn parse_digits(field: &'static str, s: &str) -> Result<Vec<u8>, GutiError> {
    s.bytes()
        .map(|b| {
            if b.is_ascii_digit() {
                Ok(b - b'0')
            } else {
                Err(GutiError::InvalidDigit { field, value: b })
            }
        })
        .collect()
}

// ============================================================================
// PLMN ID
// ============================================================================

/// PLMN ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlmnId {
    /// MCC digit 1
    pub mcc1: u8,
    /// MCC digit 2
    pub mcc2: u8,
    /// MCC digit 3
    pub mcc3: u8,
    /// MNC digit 1
    pub mnc1: u8,
    /// MNC digit 2
    pub mnc2: u8,
    /// MNC digit 3 (0xf if 2-digit MNC)
    pub mnc3: u8,
}

impl PlmnId {
    /// Build a PLMN ID from a 3-digit MCC and a 2- or 3-digit MNC
    pub fn new(mcc: &str, mnc: &str) -> Result<Self, GutiError> {
        if mcc.len() != 3 || !(2..=3).contains(&mnc.len()) {
            return Err(GutiError::InvalidPlmn(format!("{}/{}", mcc, mnc)));
        }
        let mcc_digits = parse_digits("MCC", mcc)?;
        let mnc_digits = parse_digits("MNC", mnc)?;

        Ok(Self {
            mcc1: mcc_digits[0],
            mcc2: mcc_digits[1],
            mcc3: mcc_digits[2],
            mnc1: mnc_digits[0],
            mnc2: mnc_digits[1],
            mnc3: mnc_digits.get(2).copied().unwrap_or(0xf),
        })
    }

    /// Number of MNC digits
    pub fn mnc_len(&self) -> usize {
        if self.mnc3 == 0xf {
            2
        } else {
            3
        }
    }

    /// MCC as a 3-digit string
    pub fn mcc(&self) -> String {
        format!("{}{}{}", self.mcc1, self.mcc2, self.mcc3)
    }

    /// MNC as a 2- or 3-digit string
    pub fn mnc(&self) -> String {
        if self.mnc_len() == 2 {
            format!("{}{}", self.mnc1, self.mnc2)
        } else {
            format!("{}{}{}", self.mnc1, self.mnc2, self.mnc3)
        }
    }

    /// Encode to 3-byte BCD (TS 24.008 10.5.1.13)
    pub fn encode(&self) -> [u8; 3] {
        [
            (self.mcc2 << 4) | self.mcc1,
            (self.mnc3 << 4) | self.mcc3,
            (self.mnc2 << 4) | self.mnc1,
        ]
    }

    /// Decode from 3-byte BCD, rejecting nibbles outside 0-9 (MNC3 may be 0xf)
    pub fn decode(bytes: [u8; 3]) -> Result<Self, GutiError> {
        let mnc3 = bytes[1] >> 4;
        if mnc3 != 0xf {
            check_digit("MNC", mnc3)?;
        }
        Ok(Self {
            mcc1: check_digit("MCC", bytes[0] & 0x0f)?,
            mcc2: check_digit("MCC", bytes[0] >> 4)?,
            mcc3: check_digit("MCC", bytes[1] & 0x0f)?,
            mnc1: check_digit("MNC", bytes[2] & 0x0f)?,
            mnc2: check_digit("MNC", bytes[2] >> 4)?,
            mnc3,
        })
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mcc(), self.mnc())
    }
}

// ============================================================================
// AMF ID / GUAMI
// ============================================================================

/// AMF ID (Region + Set + Pointer)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AmfId {
    /// AMF Region ID (8 bits)
    pub region: u8,
    /// AMF Set ID (10 bits)
    pub set: u16,
    /// AMF Pointer (6 bits)
    pub pointer: u8,
}

impl AmfId {
    /// Create an AMF ID, checking the set and pointer widths
    pub fn new(region: u8, set: u16, pointer: u8) -> Result<Self, GutiError> {
        if set > 0x3ff || pointer > 0x3f {
            return Err(GutiError::InvalidAmfId(format!(
                "set={:#x} pointer={:#x}",
                set, pointer
            )));
        }
        Ok(Self {
            region,
            set,
            pointer,
        })
    }

    /// Parse the 6-hex-digit form, e.g. `"cafe42"`
    pub fn from_hex(s: &str) -> Result<Self, GutiError> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GutiError::InvalidAmfId(s.to_string()));
        }
        let value =
            u32::from_str_radix(s, 16).map_err(|_| GutiError::InvalidAmfId(s.to_string()))?;
        let bytes = value.to_be_bytes();
        Ok(Self::from_bytes([bytes[1], bytes[2], bytes[3]]))
    }

    /// Packed 3-byte form: region, set(10) | pointer(6)
    pub fn to_bytes(&self) -> [u8; 3] {
        [
            self.region,
            (self.set >> 2) as u8,
            (((self.set & 0x03) as u8) << 6) | (self.pointer & 0x3f),
        ]
    }

    /// Unpack the 3-byte form
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            region: bytes[0],
            set: ((bytes[1] as u16) << 2) | ((bytes[2] >> 6) as u16),
            pointer: bytes[2] & 0x3f,
        }
    }
}

impl fmt::Display for AmfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [region, hi, lo] = self.to_bytes();
        write!(f, "{:02x}{:02x}{:02x}", region, hi, lo)
    }
}

/// GUAMI (Globally Unique AMF Identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guami {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// AMF ID
    pub amf_id: AmfId,
}

/// 5GS TAI (Tracking Area Identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tai5gs {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// Tracking Area Code (24 bits)
    pub tac: u32,
}

// ============================================================================
// 5G-TMSI
// ============================================================================

/// 5G-TMSI. `0xFFFFFFFF` is reserved as invalid and cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tmsi(u32);

impl Tmsi {
    /// Reserved all-ones value
    pub const INVALID: u32 = 0xffff_ffff;

    /// Wrap a raw value
    pub fn new(value: u32) -> Result<Self, GutiError> {
        if value == Self::INVALID {
            return Err(GutiError::InvalidTmsi);
        }
        Ok(Self(value))
    }

    /// Raw value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Low 10 bits, the allocator's round-robin counter
    pub fn lsb10(&self) -> u16 {
        (self.0 & 0x3ff) as u16
    }
}

impl TryFrom<u32> for Tmsi {
    type Error = GutiError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Tmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

// ============================================================================
// 5G-GUTI
// ============================================================================

/// 5GS GUTI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guti5gs {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// AMF ID
    pub amf_id: AmfId,
    /// 5G-TMSI
    pub tmsi: Tmsi,
}

impl Guti5gs {
    /// Build a GUTI from a serving GUAMI and a TMSI
    pub fn new(guami: &Guami, tmsi: Tmsi) -> Self {
        Self {
            plmn_id: guami.plmn_id,
            amf_id: guami.amf_id,
            tmsi,
        }
    }

    /// GUAMI part of this GUTI
    pub fn guami(&self) -> Guami {
        Guami {
            plmn_id: self.plmn_id,
            amf_id: self.amf_id,
        }
    }

    /// Encode as 5GS mobile identity contents:
    /// `[0xF2, plmn(3), region, set/pointer(2), tmsi(4)]`
    pub fn encode(&self) -> [u8; OGS_NAS_5GS_GUTI_LEN] {
        let mut buf = [0u8; OGS_NAS_5GS_GUTI_LEN];
        buf[0] = OGS_NAS_5GS_MOBILE_IDENTITY_GUTI_OCTET;
        buf[1..4].copy_from_slice(&self.plmn_id.encode());
        buf[4..7].copy_from_slice(&self.amf_id.to_bytes());
        buf[7..11].copy_from_slice(&self.tmsi.value().to_be_bytes());
        buf
    }

    /// Decode 5GS mobile identity contents. Exactly 11 bytes are accepted.
    pub fn decode(buf: &[u8]) -> Result<Self, GutiError> {
        if buf.len() != OGS_NAS_5GS_GUTI_LEN {
            return Err(GutiError::InvalidLength(buf.len()));
        }
        if buf[0] & 0x07 != OGS_NAS_5GS_MOBILE_IDENTITY_GUTI {
            return Err(GutiError::InvalidIdentityType(buf[0] & 0x07));
        }

        let plmn_id = PlmnId::decode([buf[1], buf[2], buf[3]])?;
        let amf_id = AmfId::from_bytes([buf[4], buf[5], buf[6]]);
        let tmsi = Tmsi::new(u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]))?;

        Ok(Self {
            plmn_id,
            amf_id,
            tmsi,
        })
    }
}

impl fmt::Display for Guti5gs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.plmn_id, self.amf_id, self.tmsi)
    }
}

impl FromStr for Guti5gs {
    type Err = GutiError;

    /// Parse the text form. 19 characters means a 2-digit MNC, 20 a 3-digit one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mnc_len = match s.len() {
            GUTI_TEXT_LEN_MNC2 => 2,
            GUTI_TEXT_LEN_MNC3 => 3,
            len => return Err(GutiError::InvalidLength(len)),
        };
        if let Some(b) = s.bytes().find(|b| !b.is_ascii_hexdigit()) {
            return Err(GutiError::InvalidDigit {
                field: "GUTI",
                value: b,
            });
        }

        let (plmn, rest) = s.split_at(3 + mnc_len);
        let (amf_id, tmsi) = rest.split_at(6);

        let plmn_id = PlmnId::new(&plmn[..3], &plmn[3..])?;
        let amf_id = AmfId::from_hex(amf_id)?;
        let tmsi = u32::from_str_radix(tmsi, 16).map_err(|_| GutiError::InvalidTmsi)?;

        Ok(Self {
            plmn_id,
            amf_id,
            tmsi: Tmsi::new(tmsi)?,
        })
    }
}

/// Text GUTI from its parts: `mcc + mnc + amf_id(6 hex) + tmsi(8 hex)`
pub fn encode_guti(mcc: &str, mnc: &str, amf_id: &str, tmsi: u32) -> Result<String, GutiError> {
    let guti = Guti5gs {
        plmn_id: PlmnId::new(mcc, mnc)?,
        amf_id: AmfId::from_hex(amf_id)?,
        tmsi: Tmsi::new(tmsi)?,
    };
    Ok(guti.to_string())
}

// ============================================================================
// SUPI / SUCI
// ============================================================================

/// Type prefix of an identity string (`"imsi"` for `"imsi-00101..."`)
pub fn ogs_id_get_type(id: &str) -> Option<&str> {
    id.split_once('-').map(|(t, _)| t).filter(|t| !t.is_empty())
}

/// Value part of an identity string (`"00101..."` for `"imsi-00101..."`)
pub fn ogs_id_get_value(id: &str) -> Option<&str> {
    id.split_once('-').map(|(_, v)| v).filter(|v| !v.is_empty())
}
