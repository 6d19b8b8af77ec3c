//! GMM (5G Mobility Management) State Machine
//!
//! Registration state of one AMF UE, the table of allowed transitions, and
//! the abort gate that keeps two registrations of the same UE from running
//! at once.

use crate::error::{AmfError, AmfResult};

/// GMM FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GmmState {
    /// De-registered state - UE is not registered
    #[default]
    DeRegistered,
    /// Authentication state - performing authentication
    Authentication,
    /// Security mode state - establishing security
    SecurityMode,
    /// Initial context setup state - setting up initial context
    InitialContextSetup,
    /// Registered state - UE is registered
    Registered,
    /// Network- or UE-initiated de-registration pending
    DeRegistrationInitiated,
}

impl GmmState {
    /// All states, for table checks
    pub const ALL: [GmmState; 6] = [
        GmmState::DeRegistered,
        GmmState::Authentication,
        GmmState::SecurityMode,
        GmmState::InitialContextSetup,
        GmmState::Registered,
        GmmState::DeRegistrationInitiated,
    ];

    /// Get the name of the state
    pub fn name(&self) -> &'static str {
        match self {
            GmmState::DeRegistered => "GMM_STATE_DE_REGISTERED",
            GmmState::Authentication => "GMM_STATE_AUTHENTICATION",
            GmmState::SecurityMode => "GMM_STATE_SECURITY_MODE",
            GmmState::InitialContextSetup => "GMM_STATE_INITIAL_CONTEXT_SETUP",
            GmmState::Registered => "GMM_STATE_REGISTERED",
            GmmState::DeRegistrationInitiated => "GMM_STATE_DE_REGISTRATION_INITIATED",
        }
    }

    /// Transition table
    pub fn can_transition_to(self, to: GmmState) -> bool {
        use GmmState::*;

        if to == DeRegistered {
            return true;
        }
        matches!(
            (self, to),
            (DeRegistered | Registered, Authentication | SecurityMode)
                | (Authentication, Authentication | SecurityMode)
                | (SecurityMode, InitialContextSetup)
                | (InitialContextSetup, Registered)
                | (Registered, DeRegistrationInitiated)
        )
    }

    /// A registration procedure is running
    pub fn is_registration_in_flight(self) -> bool {
        matches!(
            self,
            GmmState::Authentication | GmmState::SecurityMode | GmmState::InitialContextSetup
        )
    }

    /// Kamf and NAS keys may only be (re)derived in these states
    pub fn allows_key_derivation(self) -> bool {
        matches!(self, GmmState::Authentication | GmmState::SecurityMode)
    }
}

/// GMM State Machine
#[derive(Debug, Clone)]
pub struct GmmFsm {
    state: GmmState,
    abort: bool,
    /// AMF UE ID associated with this FSM
    pub amf_ue_id: u64,
}

impl GmmFsm {
    /// Create a new GMM FSM in `DeRegistered`
    pub fn new(amf_ue_id: u64) -> Self {
        Self {
            state: GmmState::DeRegistered,
            abort: false,
            amf_ue_id,
        }
    }

    pub fn current_state(&self) -> GmmState {
        self.state
    }

    pub fn is_state(&self, state: GmmState) -> bool {
        self.state == state
    }

    pub fn is_registered(&self) -> bool {
        self.state == GmmState::Registered
    }

    /// Move to `to` if the table allows it
    pub fn transition(&mut self, to: GmmState) -> AmfResult<()> {
        if !self.state.can_transition_to(to) {
            log::error!(
                "[amf_ue_id={}] Invalid GMM transition: {} -> {}",
                self.amf_ue_id,
                self.state.name(),
                to.name()
            );
            return Err(AmfError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        log::debug!(
            "GMM state transition: {} -> {} (amf_ue_id={})",
            self.state.name(),
            to.name(),
            self.amf_ue_id
        );
        self.state = to;
        Ok(())
    }

    /// Start a registration procedure.
    ///
    /// If one is already running, the running one is flagged to abort and
    /// this call fails with `RegistrationInProgress`.
    pub fn begin_registration(&mut self, reuse_security_context: bool) -> AmfResult<GmmState> {
        if self.state.is_registration_in_flight() {
            log::warn!(
                "[amf_ue_id={}] Registration while in {}, aborting the running one",
                self.amf_ue_id,
                self.state.name()
            );
            self.abort = true;
            return Err(AmfError::RegistrationInProgress);
        }

        let next = if reuse_security_context {
            GmmState::SecurityMode
        } else {
            GmmState::Authentication
        };
        self.transition(next)?;
        self.abort = false;
        Ok(next)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort
    }

    /// Consume a pending abort, resetting to `DeRegistered`
    pub fn take_abort(&mut self) -> bool {
        if !self.abort {
            return false;
        }
        self.abort = false;
        log::info!(
            "[amf_ue_id={}] Registration aborted in {}",
            self.amf_ue_id,
            self.state.name()
        );
        self.state = GmmState::DeRegistered;
        true
    }

    /// Unconditional reset, used on teardown
    pub fn reset(&mut self) {
        self.abort = false;
        self.state = GmmState::DeRegistered;
    }
}
