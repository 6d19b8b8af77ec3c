//! Decoded 5GMM messages
//!
//! The NAS codec lives outside this crate. These are the decoded forms the
//! procedure driver consumes.

use std::time::Duration;

use crate::config::{NetworkName, SNssai};
use crate::context::UeIdentity;
use crate::security::{SelectedAlgorithms, UeSecurityCapability};
use crate::types::{Guti5gs, GutiError, Tai5gs};

/// 5GMM message types sent by the AMF
pub mod message_type {
    pub const REGISTRATION_ACCEPT: u8 = 0x42;
    pub const REGISTRATION_REJECT: u8 = 0x44;
    pub const DEREGISTRATION_ACCEPT_FROM_UE: u8 = 0x46;
    pub const DEREGISTRATION_REQUEST_TO_UE: u8 = 0x47;
    pub const CONFIGURATION_UPDATE_COMMAND: u8 = 0x54;
    pub const AUTHENTICATION_REQUEST: u8 = 0x56;
    pub const AUTHENTICATION_REJECT: u8 = 0x58;
    pub const IDENTITY_REQUEST: u8 = 0x5b;
    pub const SECURITY_MODE_COMMAND: u8 = 0x5d;
}

/// 5GMM cause values (TS 24.501 9.11.3.2)
pub mod gmm_cause {
    pub const ILLEGAL_UE: u8 = 3;
    pub const UE_IDENTITY_CANNOT_BE_DERIVED_BY_THE_NETWORK: u8 = 9;
    pub const CONGESTION: u8 = 22;
    pub const SECURITY_MODE_REJECTED_UNSPECIFIED: u8 = 24;
    pub const PROTOCOL_ERROR_UNSPECIFIED: u8 = 111;
}

/// 5GS mobile identity type (TS 24.501 9.11.3.4)
pub mod mobile_identity_type {
    pub const NO_IDENTITY: u8 = 0;
    pub const SUCI: u8 = 1;
    pub const GUTI: u8 = 2;
    pub const IMEI: u8 = 3;
    pub const S_TMSI: u8 = 4;
    pub const IMEISV: u8 = 5;
}

/// Security header type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityHeaderType {
    #[default]
    Plain,
    IntegrityProtected,
    IntegrityProtectedAndCiphered,
    IntegrityProtectedWithNewContext,
    IntegrityProtectedAndCipheredWithNewContext,
}

impl SecurityHeaderType {
    /// Parse the 4-bit header type; reserved values give `None`
    pub fn from_byte(header_type: u8) -> Option<Self> {
        match header_type & 0x0f {
            0 => Some(Self::Plain),
            1 => Some(Self::IntegrityProtected),
            2 => Some(Self::IntegrityProtectedAndCiphered),
            3 => Some(Self::IntegrityProtectedWithNewContext),
            4 => Some(Self::IntegrityProtectedAndCipheredWithNewContext),
            _ => None,
        }
    }

    pub fn integrity_protected(&self) -> bool {
        !matches!(self, Self::Plain)
    }

    pub fn ciphered(&self) -> bool {
        matches!(
            self,
            Self::IntegrityProtectedAndCiphered | Self::IntegrityProtectedAndCipheredWithNewContext
        )
    }

    pub fn new_security_context(&self) -> bool {
        matches!(
            self,
            Self::IntegrityProtectedWithNewContext | Self::IntegrityProtectedAndCipheredWithNewContext
        )
    }
}

/// Decoded 5GS mobile identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MobileIdentity {
    NoIdentity,
    /// SUCI in its `suci-...` text form
    Suci(String),
    Guti(Guti5gs),
    Imei(String),
    Imeisv(String),
}

impl MobileIdentity {
    /// Decode a GUTI mobile identity from its 11 content bytes
    pub fn from_guti_bytes(buf: &[u8]) -> Result<Self, GutiError> {
        Ok(Self::Guti(Guti5gs::decode(buf)?))
    }

    pub fn type_of_identity(&self) -> u8 {
        match self {
            Self::NoIdentity => mobile_identity_type::NO_IDENTITY,
            Self::Suci(_) => mobile_identity_type::SUCI,
            Self::Guti(_) => mobile_identity_type::GUTI,
            Self::Imei(_) => mobile_identity_type::IMEI,
            Self::Imeisv(_) => mobile_identity_type::IMEISV,
        }
    }

    /// Registry lookup key, if this identity can find a UE
    pub fn to_ue_identity(&self) -> Option<UeIdentity> {
        match self {
            Self::Suci(suci) => Some(UeIdentity::Suci(suci.clone())),
            Self::Guti(guti) => Some(UeIdentity::Guti(*guti)),
            _ => None,
        }
    }
}

/// 5GS registration type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationType {
    #[default]
    Initial,
    MobilityUpdating,
    PeriodicUpdating,
    Emergency,
}

impl RegistrationType {
    pub fn value(&self) -> u8 {
        match self {
            Self::Initial => 1,
            Self::MobilityUpdating => 2,
            Self::PeriodicUpdating => 3,
            Self::Emergency => 4,
        }
    }
}

/// Decoded Registration Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub security_header_type: SecurityHeaderType,
    pub registration_type: RegistrationType,
    pub follow_on_request: bool,
    /// ngKSI the UE holds (7 when it has none)
    pub ngksi: u8,
    pub mobile_identity: MobileIdentity,
    pub ue_security_capability: Option<UeSecurityCapability>,
    pub requested_nssai: Vec<SNssai>,
    pub last_visited_tai: Option<Tai5gs>,
    /// Outcome of the codec's MAC check; meaningful only when protected
    pub mac_verified: bool,
    /// NAS sequence number of a protected message
    pub sequence_number: u8,
}

impl RegistrationRequest {
    /// Whether the UE's current security context may be reused
    pub fn can_reuse_security_context(&self) -> bool {
        self.security_header_type.integrity_protected() && self.mac_verified
    }
}

/// Decoded Security Mode Complete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityModeComplete {
    /// Outcome of the codec's MAC check under the new context
    pub mac_verified: bool,
    pub sequence_number: u8,
    pub imeisv: Option<String>,
}

/// Decoded UE-originating Deregistration Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregistrationRequest {
    pub switch_off: bool,
    pub access_type: u8,
    pub ngksi: u8,
    pub mobile_identity: MobileIdentity,
}

/// Downlink 5GMM message, handed to the NAS codec for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmmMessage {
    IdentityRequest,
    AuthenticationRequest {
        ngksi: u8,
    },
    AuthenticationReject,
    SecurityModeCommand {
        ngksi: u8,
        algorithms: SelectedAlgorithms,
        /// Replayed UE security capability
        ue_security_capability: Option<UeSecurityCapability>,
    },
    RegistrationAccept {
        guti: Guti5gs,
        t3512: Duration,
    },
    RegistrationReject {
        cause: u8,
    },
    DeregistrationAccept,
    DeregistrationRequest {
        access_type: u8,
    },
    ConfigurationUpdateCommand {
        network_name: NetworkName,
    },
}

impl GmmMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            Self::IdentityRequest => message_type::IDENTITY_REQUEST,
            Self::AuthenticationRequest { .. } => message_type::AUTHENTICATION_REQUEST,
            Self::AuthenticationReject => message_type::AUTHENTICATION_REJECT,
            Self::SecurityModeCommand { .. } => message_type::SECURITY_MODE_COMMAND,
            Self::RegistrationAccept { .. } => message_type::REGISTRATION_ACCEPT,
            Self::RegistrationReject { .. } => message_type::REGISTRATION_REJECT,
            Self::DeregistrationAccept => message_type::DEREGISTRATION_ACCEPT_FROM_UE,
            Self::DeregistrationRequest { .. } => message_type::DEREGISTRATION_REQUEST_TO_UE,
            Self::ConfigurationUpdateCommand { .. } => message_type::CONFIGURATION_UPDATE_COMMAND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_header_type() {
        assert_eq!(SecurityHeaderType::from_byte(0), Some(SecurityHeaderType::Plain));
        let header = SecurityHeaderType::from_byte(4).unwrap();
        assert!(header.integrity_protected());
        assert!(header.ciphered());
        assert!(header.new_security_context());
        assert!(!SecurityHeaderType::IntegrityProtected.ciphered());
        assert_eq!(SecurityHeaderType::from_byte(7), None);
    }

    #[test]
    fn test_mobile_identity_guti() {
        let bytes = [0xf2, 0x00, 0xf1, 0x10, 0x02, 0x00, 0x40, 0xde, 0xad, 0xbe, 0xef];
        let identity = MobileIdentity::from_guti_bytes(&bytes).unwrap();
        assert_eq!(identity.type_of_identity(), mobile_identity_type::GUTI);
        let Some(UeIdentity::Guti(guti)) = identity.to_ue_identity() else {
            panic!("expected GUTI identity");
        };
        assert_eq!(guti.tmsi.value(), 0xdeadbeef);
    }

    #[test]
    fn test_mobile_identity_wrong_type() {
        let mut bytes = [0xf2, 0x00, 0xf1, 0x10, 0x02, 0x00, 0x40, 0xde, 0xad, 0xbe, 0xef];
        bytes[0] = 0xf1;
        assert_eq!(
            MobileIdentity::from_guti_bytes(&bytes),
            Err(GutiError::InvalidIdentityType(1))
        );
        bytes[0] = 0xf2;
        assert!(matches!(
            MobileIdentity::from_guti_bytes(&bytes[..10]),
            Err(GutiError::InvalidLength(10))
        ));
    }

    #[test]
    fn test_imei_has_no_lookup() {
        assert!(MobileIdentity::Imei("356938035643809".into())
            .to_ue_identity()
            .is_none());
    }
}
