//! AMF UE context
//!
//! Per-subscriber state: identities, GMM state, the NAS security context,
//! PDU sessions and running GMM timers. Every field lives behind one mutex so
//! multi-field updates (security refresh, link change) are atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ogs_core::TimerHandle;
use ogs_crypt::kdf::{Key128, Key256, OGS_KDF_ACCESS_TYPE_3GPP};
use ogs_crypt::CryptError;

use crate::error::{AmfError, AmfResult};
use crate::gmm_sm::{GmmFsm, GmmState};
use crate::ran_ue::RanUe;
use crate::security::{
    anchor_key_from_hex, derive_access_network_key, derive_algorithm_keys, derive_kamf,
    derive_next_hop, select_security_algorithms, NasCount, SelectedAlgorithms,
    UeSecurityCapability, OGS_NAS_KSI_NO_KEY_IS_AVAILABLE,
};
use crate::timer::AmfTimerId;
use crate::types::{Guami, Guti5gs, Tai5gs};

// ============================================================================
// Security context
// ============================================================================

/// NAS security context of a UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    /// Key for AMF; `None` until authentication succeeds
    pub kamf: Option<Key256>,
    /// ABBA used for Kamf
    pub abba: Vec<u8>,
    /// Integrity key
    pub knas_int: Key128,
    /// Ciphering key
    pub knas_enc: Key128,
    /// gNB key
    pub kgnb: Key256,
    /// Next hop key
    pub nh: Key256,
    /// Next hop chaining counter; the IE carries `nhcc & 7`
    pub nhcc: u8,
    /// Downlink NAS COUNT
    pub dl_count: NasCount,
    /// Uplink NAS COUNT
    pub ul_count: NasCount,
    pub selected_enc_algorithm: u8,
    pub selected_int_algorithm: u8,
    /// Type of security context flag
    pub tsc: u8,
    /// ngKSI
    pub ksi: u8,
    /// Last uplink message failed integrity check
    pub mac_failed: bool,
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self {
            kamf: None,
            abba: Vec::new(),
            knas_int: [0; 16],
            knas_enc: [0; 16],
            kgnb: [0; 32],
            nh: [0; 32],
            nhcc: 0,
            dl_count: NasCount::default(),
            ul_count: NasCount::default(),
            selected_enc_algorithm: 0,
            selected_int_algorithm: 0,
            tsc: 0,
            ksi: OGS_NAS_KSI_NO_KEY_IS_AVAILABLE,
            mac_failed: false,
        }
    }
}

// ============================================================================
// Sessions / NAS state
// ============================================================================

/// PDU session reference held by the AMF
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmfSess {
    /// PDU Session Identity
    pub psi: u8,
    /// Data network name
    pub dnn: Option<String>,
    /// SM context reference at the SMF
    pub sm_context_ref: Option<String>,
    /// SM context resource URI
    pub sm_context_resource_uri: Option<String>,
}

impl AmfSess {
    pub fn new(psi: u8) -> Self {
        Self {
            psi,
            ..Default::default()
        }
    }

    /// Check if SMF holds a session context
    pub fn session_context_in_smf(&self) -> bool {
        self.sm_context_ref.is_some()
    }

    pub fn store_session_context(&mut self, resource_uri: &str, context_ref: &str) {
        self.sm_context_resource_uri = Some(resource_uri.to_string());
        self.sm_context_ref = Some(context_ref.to_string());
    }

    pub fn clear_session_context(&mut self) {
        self.sm_context_resource_uri = None;
        self.sm_context_ref = None;
    }
}

/// Fields of the last registration request
#[derive(Debug, Clone, Default)]
pub struct NasState {
    /// 5GS registration type
    pub registration_type: u8,
    /// Follow-on request pending
    pub follow_on_request: bool,
    /// Access type (1: 3GPP, 2: non-3GPP)
    pub access_type: u8,
    /// ngKSI sent by the UE
    pub ue_ksi: u8,
    /// ngKSI assigned to the next Kamf
    pub amf_ksi: u8,
}

impl NasState {
    /// ngKSI for a new authentication: one past the UE's, skipping 7
    pub fn next_ksi(&self) -> u8 {
        if self.ue_ksi < OGS_NAS_KSI_NO_KEY_IS_AVAILABLE - 1 {
            self.ue_ksi + 1
        } else {
            0
        }
    }
}

// ============================================================================
// AmfUe
// ============================================================================

/// Mutable part of an AMF UE
#[derive(Debug)]
pub struct AmfUeState {
    /// GMM state machine
    pub gmm: GmmFsm,
    /// SUCI from the registration request
    pub suci: Option<String>,
    /// SUPI resolved by authentication
    pub supi: Option<String>,
    /// GUTI in use
    pub current_guti: Option<Guti5gs>,
    /// The current GUTI's TMSI came from our allocator
    pub current_guti_allocated: bool,
    /// GUTI assigned but not yet confirmed by the UE
    pub next_guti: Option<Guti5gs>,
    /// GUTI the UE presented, if it was not ours
    pub old_guti: Option<Guti5gs>,
    /// Serving GUAMI
    pub guami: Option<Guami>,
    pub nr_tai: Option<Tai5gs>,
    /// Non-owning link to the current RAN UE
    pub ran_ue: Weak<RanUe>,
    pub nas: NasState,
    pub ue_security_capability: Option<UeSecurityCapability>,
    /// Active security context
    pub security: SecurityContext,
    memento: Option<SecurityContext>,
    sessions: BTreeMap<u8, AmfSess>,
    timers: HashMap<AmfTimerId, TimerHandle>,
}

impl AmfUeState {
    fn new(amf_ue_id: u64) -> Self {
        Self {
            gmm: GmmFsm::new(amf_ue_id),
            suci: None,
            supi: None,
            current_guti: None,
            current_guti_allocated: false,
            next_guti: None,
            old_guti: None,
            guami: None,
            nr_tai: None,
            ran_ue: Weak::new(),
            nas: NasState {
                access_type: OGS_KDF_ACCESS_TYPE_3GPP,
                ue_ksi: OGS_NAS_KSI_NO_KEY_IS_AVAILABLE,
                amf_ksi: OGS_NAS_KSI_NO_KEY_IS_AVAILABLE,
                ..Default::default()
            },
            ue_security_capability: None,
            security: SecurityContext::default(),
            memento: None,
            sessions: BTreeMap::new(),
            timers: HashMap::new(),
        }
    }

    /// Identity for log lines
    pub fn display_id(&self) -> &str {
        self.supi
            .as_deref()
            .or(self.suci.as_deref())
            .unwrap_or("unknown")
    }

    // ========================================================================
    // GMM
    // ========================================================================

    pub fn gmm_state(&self) -> GmmState {
        self.gmm.current_state()
    }

    /// GMM transition; entering `Registered` needs a valid security context
    pub fn gmm_transition(&mut self, to: GmmState) -> AmfResult<()> {
        if to == GmmState::Registered && !self.security_context_is_valid() {
            log::error!("[{}] Cannot register without a valid security context", self.display_id());
            return Err(AmfError::SecurityContextInvalid);
        }
        self.gmm.transition(to)
    }

    // ========================================================================
    // Security
    // ========================================================================

    /// Kamf present, ngKSI usable, last MAC check passed
    pub fn security_context_is_valid(&self) -> bool {
        self.security.kamf.is_some()
            && self.security.ksi != OGS_NAS_KSI_NO_KEY_IS_AVAILABLE
            && !self.security.mac_failed
    }

    pub fn clear_security_context(&mut self) {
        self.security = SecurityContext::default();
    }

    fn check_key_derivation_allowed(&self) -> AmfResult<()> {
        let state = self.gmm_state();
        if !state.allows_key_derivation() {
            log::error!("[{}] Key derivation refused in {}", self.display_id(), state.name());
            return Err(AmfError::InvalidState(state));
        }
        Ok(())
    }

    fn kamf(&self) -> AmfResult<Key256> {
        self.security
            .kamf
            .ok_or(AmfError::CryptoDerivation(CryptError::MissingParameter("Kamf")))
    }

    /// Install a new Kamf from the hex anchor key. Resets the NH chain and
    /// NAS COUNTs. Nothing changes on failure.
    pub fn set_anchor_key(&mut self, kseaf_hex: &str, abba: &[u8], ksi: u8) -> AmfResult<()> {
        self.check_key_derivation_allowed()?;
        let supi = self
            .supi
            .as_deref()
            .ok_or(AmfError::CryptoDerivation(CryptError::MissingParameter("SUPI")))?;

        let kseaf = anchor_key_from_hex(kseaf_hex)?;
        let kamf = derive_kamf(&kseaf, supi, abba)?;

        self.security = SecurityContext {
            kamf: Some(kamf),
            abba: abba.to_vec(),
            ksi,
            ..SecurityContext::default()
        };
        log::debug!("[{}] New Kamf installed [ngKSI:{}]", self.display_id(), ksi);
        Ok(())
    }

    /// Select NAS algorithms and derive KNASint/KNASenc
    pub fn derive_nas_keys(
        &mut self,
        integrity_order: &[u8],
        ciphering_order: &[u8],
    ) -> AmfResult<SelectedAlgorithms> {
        self.check_key_derivation_allowed()?;
        let kamf = self.kamf()?;

        let selected = select_security_algorithms(
            integrity_order,
            ciphering_order,
            self.ue_security_capability.as_ref(),
        );
        let keys = derive_algorithm_keys(&kamf, selected.enc, selected.int)?;

        self.security.selected_enc_algorithm = selected.enc;
        self.security.selected_int_algorithm = selected.int;
        self.security.knas_int = keys.knas_int;
        self.security.knas_enc = keys.knas_enc;
        Ok(selected)
    }

    /// Derive KgNB from the current uplink COUNT and the first NH. NCC = 1.
    pub fn update_security_context(&mut self) -> AmfResult<()> {
        let kamf = self.kamf()?;
        let kgnb =
            derive_access_network_key(&kamf, self.security.ul_count.value(), self.nas.access_type)?;
        let nh = derive_next_hop(&kamf, &kgnb)?;

        self.security.kgnb = kgnb;
        self.security.nh = nh;
        self.security.nhcc = 1;
        log::debug!("[{}] Security context updated [NCC:1]", self.display_id());
        Ok(())
    }

    /// Advance the NH chain by one. Returns the 3-bit NCC to signal.
    pub fn update_nh(&mut self) -> AmfResult<u8> {
        let kamf = self.kamf()?;
        let nh = derive_next_hop(&kamf, &self.security.nh)?;

        self.security.nh = nh;
        self.security.nhcc = self.security.nhcc.wrapping_add(1);
        log::debug!("[{}] NH updated [NCC:{}]", self.display_id(), self.security.nhcc);
        Ok(self.security.nhcc & 0x07)
    }

    /// Keep a copy of the security context before re-authentication
    pub fn save_memento(&mut self) {
        self.memento = Some(self.security.clone());
    }

    /// Bring back the saved security context. Returns `false` if none was saved.
    pub fn restore_memento(&mut self) -> bool {
        match self.memento.take() {
            Some(saved) => {
                self.security = saved;
                log::debug!("[{}] Security context restored", self.display_id());
                true
            }
            None => false,
        }
    }

    pub fn discard_memento(&mut self) {
        self.memento = None;
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Add or replace the session with `psi`
    pub fn sess_add(&mut self, psi: u8) -> &mut AmfSess {
        let sess = self.sessions.entry(psi).or_default();
        *sess = AmfSess::new(psi);
        sess
    }

    pub fn sess_find_by_psi(&self, psi: u8) -> Option<&AmfSess> {
        self.sessions.get(&psi)
    }

    pub fn sess_find_by_psi_mut(&mut self, psi: u8) -> Option<&mut AmfSess> {
        self.sessions.get_mut(&psi)
    }

    pub fn sess_remove(&mut self, psi: u8) -> Option<AmfSess> {
        self.sessions.remove(&psi)
    }

    pub fn sess_remove_all(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    /// Sessions in PSI order
    pub fn sess_list(&self) -> impl Iterator<Item = &AmfSess> {
        self.sessions.values()
    }

    pub fn sess_count(&self) -> usize {
        self.sessions.len()
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Remember a running timer. Returns the handle it replaces, which the
    /// caller must stop.
    pub fn set_timer(&mut self, timer_id: AmfTimerId, handle: TimerHandle) -> Option<TimerHandle> {
        self.timers.insert(timer_id, handle)
    }

    pub fn timer(&self, timer_id: AmfTimerId) -> Option<TimerHandle> {
        self.timers.get(&timer_id).copied()
    }

    /// Forget a timer so it is stopped at most once
    pub fn take_timer(&mut self, timer_id: AmfTimerId) -> Option<TimerHandle> {
        self.timers.remove(&timer_id)
    }

    pub fn take_all_timers(&mut self) -> Vec<TimerHandle> {
        self.timers.drain().map(|(_, handle)| handle).collect()
    }
}

/// AMF UE context
#[derive(Debug)]
pub struct AmfUe {
    /// Pool ID
    pub id: u64,
    state: Mutex<AmfUeState>,
}

impl AmfUe {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(AmfUeState::new(id)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, AmfUeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current RAN UE, if still alive
    pub fn ran_ue(&self) -> Option<Arc<RanUe>> {
        self.lock().ran_ue.upgrade()
    }

    pub fn supi(&self) -> Option<String> {
        self.lock().supi.clone()
    }

    pub fn suci(&self) -> Option<String> {
        self.lock().suci.clone()
    }

    pub fn current_guti(&self) -> Option<Guti5gs> {
        self.lock().current_guti
    }

    pub fn gmm_state(&self) -> GmmState {
        self.lock().gmm_state()
    }
}
