//! RAN UE context
//!
//! One NG-connection of a UE on one gNB. The gNB owns its RAN UEs; every
//! other reference to a RAN UE (from the AMF UE, from a handover peer) is a
//! `Weak` and may dangle once the gNB lets go.
//!
//! Lock order: gNB -> AMF UE -> RAN UE. Two RAN UEs are always locked in
//! ascending `id` order.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::amf_ue::AmfUe;
use crate::error::{AmfError, AmfResult};
use crate::gnb::AmfGnb;
use crate::types::Tai5gs;

/// What to do once the gNB confirms a UE context release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NgapUeCtxRelAction {
    #[default]
    Invalid,
    /// Release the NG connection only
    NgContextRemove,
    /// Release the NG connection and the AMF UE
    NgRemoveAndUnlink,
    /// Source side of a completed handover
    NgHandoverComplete,
    /// Target side of a cancelled handover
    NgHandoverCancel,
}

/// Mutable part of a RAN UE
#[derive(Debug, Default)]
pub struct RanUeState {
    /// Non-owning link to the AMF UE
    pub amf_ue: Weak<AmfUe>,
    /// Set on the target of a handover
    pub source_ue: Weak<RanUe>,
    /// Set on the source of a handover
    pub target_ue: Weak<RanUe>,
    /// UE context requested by the gNB
    pub ue_context_requested: bool,
    /// Initial context setup request sent
    pub initial_context_setup_request_sent: bool,
    /// Release action
    pub ue_ctx_rel_action: NgapUeCtxRelAction,
    /// Last reported TAI
    pub nr_tai: Option<Tai5gs>,
}

/// RAN UE context
#[derive(Debug)]
pub struct RanUe {
    /// Pool ID
    pub id: u64,
    /// RAN UE NGAP ID assigned by the gNB
    pub ran_ue_ngap_id: u64,
    /// AMF UE NGAP ID, owned by this context until it leaves its gNB
    pub amf_ue_ngap_id: i64,
    gnb: Weak<AmfGnb>,
    state: Mutex<RanUeState>,
}

impl RanUe {
    pub(crate) fn new(id: u64, ran_ue_ngap_id: u64, amf_ue_ngap_id: i64, gnb: Weak<AmfGnb>) -> Self {
        Self {
            id,
            ran_ue_ngap_id,
            amf_ue_ngap_id,
            gnb,
            state: Mutex::new(RanUeState::default()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RanUeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The owning gNB, if it still exists and still holds this context
    pub fn gnb(&self) -> Option<Arc<AmfGnb>> {
        let gnb = self.gnb.upgrade()?;
        if !gnb.has_ran_ue(self.id) {
            return None;
        }
        Some(gnb)
    }

    pub fn amf_ue(&self) -> Option<Arc<AmfUe>> {
        self.lock().amf_ue.upgrade()
    }

    pub fn source_ue(&self) -> Option<Arc<RanUe>> {
        self.lock().source_ue.upgrade()
    }

    pub fn target_ue(&self) -> Option<Arc<RanUe>> {
        self.lock().target_ue.upgrade()
    }
}

/// Lock two distinct RAN UEs in ascending id order; guards are returned in
/// argument order.
fn lock_pair<'a>(
    a: &'a RanUe,
    b: &'a RanUe,
) -> (MutexGuard<'a, RanUeState>, MutexGuard<'a, RanUeState>) {
    if a.id < b.id {
        let ga = a.lock();
        let gb = b.lock();
        (ga, gb)
    } else {
        let gb = b.lock();
        let ga = a.lock();
        (ga, gb)
    }
}

// ============================================================================
// AMF UE <-> RAN UE
// ============================================================================

/// Link `amf_ue` to `ran_ue`.
///
/// Does nothing if `ran_ue` is absent or its gNB is gone. A previous RAN UE
/// is only unlinked, never released; it still belongs to its gNB.
/// Returns whether the link was made.
pub fn attach_ran_ue(amf_ue: &Arc<AmfUe>, ran_ue: Option<&Arc<RanUe>>) -> bool {
    let Some(ran_ue) = ran_ue else {
        log::debug!("[amf_ue_id={}] No RAN UE to attach", amf_ue.id);
        return false;
    };
    if ran_ue.gnb().is_none() {
        log::warn!(
            "[amf_ue_id={}] gNB of RAN UE {} is gone, link unchanged",
            amf_ue.id,
            ran_ue.id
        );
        return false;
    }

    let this = Arc::downgrade(amf_ue);
    let mut ue = amf_ue.lock();

    let old = std::mem::replace(&mut ue.ran_ue, Arc::downgrade(ran_ue)).upgrade();
    ran_ue.lock().amf_ue = this.clone();

    if let Some(old) = old.filter(|old| !Arc::ptr_eq(old, ran_ue)) {
        let mut old_state = old.lock();
        if old_state.amf_ue.ptr_eq(&this) {
            old_state.amf_ue = Weak::new();
        }
        log::debug!(
            "[amf_ue_id={}] RAN UE {} replaced by {}",
            amf_ue.id,
            old.id,
            ran_ue.id
        );
    }

    log::debug!(
        "[amf_ue_id={}] attached to RAN UE {} [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
        amf_ue.id,
        ran_ue.id,
        ran_ue.ran_ue_ngap_id,
        ran_ue.amf_ue_ngap_id
    );
    true
}

/// Clear the AMF UE's link. The RAN UE keeps its back-reference until it is
/// released or re-attached.
pub fn detach_ran_ue(amf_ue: &AmfUe) {
    let mut ue = amf_ue.lock();
    ue.ran_ue = Weak::new();
}

// ============================================================================
// Handover source <-> target
// ============================================================================

/// Pair a handover source with its target. The target inherits the source's
/// AMF UE.
pub fn attach_source_target(source: Option<&Arc<RanUe>>, target: Option<&Arc<RanUe>>) -> AmfResult<()> {
    let (Some(source), Some(target)) = (source, target) else {
        return Err(AmfError::Consistency("handover source or target missing"));
    };
    if Arc::ptr_eq(source, target) {
        return Err(AmfError::Consistency("handover source and target are the same"));
    }

    let (mut s, mut t) = lock_pair(source, target);
    if s.amf_ue.upgrade().is_none() {
        return Err(AmfError::Consistency("handover source has no AMF UE"));
    }
    if s.source_ue.upgrade().is_some() || t.target_ue.upgrade().is_some() {
        return Err(AmfError::Consistency("RAN UE already in another handover"));
    }

    t.amf_ue = s.amf_ue.clone();
    t.source_ue = Arc::downgrade(source);
    s.target_ue = Arc::downgrade(target);

    log::debug!("Handover pair: source RAN UE {} -> target RAN UE {}", source.id, target.id);
    Ok(())
}

/// Undo whichever handover pairing `ran_ue` is part of, on both sides
pub fn detach_source_target(ran_ue: &Arc<RanUe>) {
    let (source, target) = {
        let state = ran_ue.lock();
        (state.source_ue.upgrade(), state.target_ue.upgrade())
    };

    if let Some(source) = source.filter(|s| !Arc::ptr_eq(s, ran_ue)) {
        let (mut s, mut t) = lock_pair(&source, ran_ue);
        if s.target_ue.ptr_eq(&Arc::downgrade(ran_ue)) {
            s.target_ue = Weak::new();
        }
        t.source_ue = Weak::new();
    } else if let Some(target) = target.filter(|t| !Arc::ptr_eq(t, ran_ue)) {
        let (mut s, mut t) = lock_pair(ran_ue, &target);
        if t.source_ue.ptr_eq(&Arc::downgrade(ran_ue)) {
            t.source_ue = Weak::new();
        }
        s.target_ue = Weak::new();
    }

    // Peer may already be gone
    let mut state = ran_ue.lock();
    state.source_ue = Weak::new();
    state.target_ue = Weak::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn new_gnb() -> Arc<AmfGnb> {
        let addr: SocketAddr = "127.0.0.1:38412".parse().unwrap();
        Arc::new(AmfGnb::new(1, addr, None))
    }

    #[test]
    fn test_attach_ran_ue() {
        let gnb = new_gnb();
        let ran_ue = gnb.ran_ue_add(10, 1, 100);
        let amf_ue = Arc::new(AmfUe::new(1));

        assert!(attach_ran_ue(&amf_ue, Some(&ran_ue)));
        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &ran_ue));
        assert!(Arc::ptr_eq(&ran_ue.amf_ue().unwrap(), &amf_ue));
    }

    #[test]
    fn test_attach_replaces_old_link() {
        let gnb = new_gnb();
        let old = gnb.ran_ue_add(10, 1, 100);
        let new = gnb.ran_ue_add(11, 2, 101);
        let amf_ue = Arc::new(AmfUe::new(1));

        attach_ran_ue(&amf_ue, Some(&old));
        attach_ran_ue(&amf_ue, Some(&new));

        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &new));
        assert!(old.amf_ue().is_none());
        // Old one is unlinked, not released
        assert!(gnb.has_ran_ue(old.id));
    }

    #[test]
    fn test_attach_none_is_noop() {
        let gnb = new_gnb();
        let ran_ue = gnb.ran_ue_add(10, 1, 100);
        let amf_ue = Arc::new(AmfUe::new(1));
        attach_ran_ue(&amf_ue, Some(&ran_ue));

        assert!(!attach_ran_ue(&amf_ue, None));
        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &ran_ue));
    }

    #[test]
    fn test_attach_with_gnb_gone() {
        let gnb = new_gnb();
        let first = gnb.ran_ue_add(10, 1, 100);
        let stale = gnb.ran_ue_add(11, 2, 101);
        let amf_ue = Arc::new(AmfUe::new(1));
        attach_ran_ue(&amf_ue, Some(&first));

        gnb.ran_ue_remove(stale.id);
        assert!(!attach_ran_ue(&amf_ue, Some(&stale)));
        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &first));

        let orphan = {
            let other = new_gnb();
            other.ran_ue_add(12, 3, 102)
        };
        assert!(orphan.gnb().is_none());
        assert!(!attach_ran_ue(&amf_ue, Some(&orphan)));
        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &first));
    }

    #[test]
    fn test_detach_ran_ue() {
        let gnb = new_gnb();
        let ran_ue = gnb.ran_ue_add(10, 1, 100);
        let amf_ue = Arc::new(AmfUe::new(1));
        attach_ran_ue(&amf_ue, Some(&ran_ue));

        detach_ran_ue(&amf_ue);
        assert!(amf_ue.ran_ue().is_none());
        assert!(ran_ue.amf_ue().is_some());
    }

    #[test]
    fn test_source_target() {
        let gnb = new_gnb();
        let source = gnb.ran_ue_add(10, 1, 100);
        let target = gnb.ran_ue_add(11, 2, 101);
        let amf_ue = Arc::new(AmfUe::new(1));
        attach_ran_ue(&amf_ue, Some(&source));

        attach_source_target(Some(&source), Some(&target)).unwrap();
        assert!(Arc::ptr_eq(&source.target_ue().unwrap(), &target));
        assert!(Arc::ptr_eq(&target.source_ue().unwrap(), &source));
        assert!(Arc::ptr_eq(&target.amf_ue().unwrap(), &amf_ue));
        assert!(source.source_ue().is_none());
        assert!(target.target_ue().is_none());

        detach_source_target(&target);
        assert!(source.target_ue().is_none());
        assert!(target.source_ue().is_none());

        // No pairing left: no-op
        detach_source_target(&source);
    }

    #[test]
    fn test_source_target_consistency() {
        let gnb = new_gnb();
        let source = gnb.ran_ue_add(10, 1, 100);
        let target = gnb.ran_ue_add(11, 2, 101);

        assert!(matches!(
            attach_source_target(None, Some(&target)),
            Err(AmfError::Consistency(_))
        ));
        assert!(matches!(
            attach_source_target(Some(&source), Some(&target)),
            Err(AmfError::Consistency(_))
        ));
        assert!(target.source_ue().is_none());
        assert!(source.target_ue().is_none());
    }
}
