//! GMM procedure driver
//!
//! Drives registration, de-registration and N2 handover for the UEs in an
//! [`AmfContext`]. The handler owns the event loop's [`TimerManager`] and
//! remembers the last message sent under each running GMM timer so an
//! expiry can retransmit it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ogs_core::{CancelToken, TimerEvent};
use ogs_crypt::kdf::Key256;

use crate::amf_ue::AmfUe;
use crate::context::{AmfContext, UeIdentity};
use crate::error::{AmfError, AmfResult};
use crate::gmm_sm::GmmState;
use crate::gnb::AmfGnb;
use crate::metrics::GlobalMetric;
use crate::nas::{
    gmm_cause, DeregistrationRequest, GmmMessage, RegistrationRequest, RegistrationType,
    SecurityModeComplete,
};
use crate::ran_ue::{attach_ran_ue, attach_source_target, detach_source_target, RanUe};
use crate::repository::SubscriberRepository;
use crate::timer::{AmfTimerId, TimerManager};
use crate::types::Guti5gs;

/// A message to deliver to a UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmmDownlink {
    pub amf_ue_id: u64,
    pub message: GmmMessage,
}

/// Outcome of handover preparation, sent to the target gNB
#[derive(Debug, Clone)]
pub struct HandoverRequest {
    /// RAN UE created on the target gNB
    pub target: Arc<RanUe>,
    pub nh: Key256,
    /// 3-bit NCC
    pub ncc: u8,
}

/// GMM procedure handler of one event loop
pub struct GmmHandler {
    context: Arc<AmfContext>,
    repository: Arc<dyn SubscriberRepository>,
    timers: TimerManager,
    /// Message to retransmit per running timer
    pending: HashMap<(u64, AmfTimerId), GmmMessage>,
    cancel: CancelToken,
}

impl GmmHandler {
    pub fn new(context: Arc<AmfContext>, repository: Arc<dyn SubscriberRepository>) -> Self {
        let timers = TimerManager::new(context.config.timers.clone());
        Self {
            context,
            repository,
            timers,
            pending: HashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn context(&self) -> &Arc<AmfContext> {
        &self.context
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn start_timer(&mut self, amf_ue: &AmfUe, timer_id: AmfTimerId, message: GmmMessage) {
        let handle = self.timers.start_ue_timer(timer_id, amf_ue.id);
        if let Some(previous) = amf_ue.lock().set_timer(timer_id, handle) {
            self.timers.stop(previous);
        }
        self.pending.insert((amf_ue.id, timer_id), message);
    }

    fn stop_timer(&mut self, amf_ue: &AmfUe, timer_id: AmfTimerId) {
        let handle = amf_ue.lock().take_timer(timer_id);
        if let Some(handle) = handle {
            self.timers.stop(handle);
        }
        self.pending.remove(&(amf_ue.id, timer_id));
    }

    fn stop_all_timers(&mut self, amf_ue: &AmfUe) {
        let handles = amf_ue.lock().take_all_timers();
        for handle in handles {
            self.timers.stop(handle);
        }
        self.pending.retain(|(id, _), _| *id != amf_ue.id);
    }

    /// Earliest GMM timer expiry, for the event loop's sleep
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn handle_timers(&mut self) -> Vec<GmmDownlink> {
        self.handle_timers_at(Instant::now())
    }

    /// Dispatch expired GMM timers. Returns the retransmissions to send.
    pub fn handle_timers_at(&mut self, now: Instant) -> Vec<GmmDownlink> {
        let mut retransmissions = Vec::new();

        for event in self.timers.poll_expired_at(now) {
            let token = *event.token();
            let Some(amf_ue) = self.context.amf_ue_find_by_id(token.amf_ue_id) else {
                log::debug!(
                    "[amf_ue_id={}] {} fired for a removed UE",
                    token.amf_ue_id,
                    token.timer_id.name()
                );
                self.pending.remove(&(token.amf_ue_id, token.timer_id));
                continue;
            };
            if amf_ue.lock().timer(token.timer_id) != Some(event.handle()) {
                continue;
            }

            match event {
                TimerEvent::Expired { expire_times, .. } => {
                    let Some(message) = self.pending.get(&(amf_ue.id, token.timer_id)) else {
                        continue;
                    };
                    log::warn!(
                        "[amf_ue_id={}] {} expired [{}], retransmitting",
                        amf_ue.id,
                        token.timer_id.name(),
                        expire_times
                    );
                    retransmissions.push(GmmDownlink {
                        amf_ue_id: amf_ue.id,
                        message: message.clone(),
                    });
                }
                TimerEvent::Exhausted { .. } => {
                    amf_ue.lock().take_timer(token.timer_id);
                    self.pending.remove(&(amf_ue.id, token.timer_id));
                    self.timer_exhausted(&amf_ue, token.timer_id);
                }
            }
        }
        retransmissions
    }

    /// gNB serving the downlink's UE right now
    pub fn downlink_gnb(&self, downlink: &GmmDownlink) -> Option<Arc<AmfGnb>> {
        self.context
            .amf_ue_find_by_id(downlink.amf_ue_id)?
            .ran_ue()?
            .gnb()
    }

    /// Send an encoded downlink over the serving gNB's association
    pub fn send_downlink(&self, downlink: &GmmDownlink, pdu: &[u8]) -> AmfResult<()> {
        let gnb = self
            .downlink_gnb(downlink)
            .ok_or(AmfError::NotFound("serving gNB"))?;
        gnb.send(pdu)
    }

    fn timer_exhausted(&mut self, amf_ue: &Arc<AmfUe>, timer_id: AmfTimerId) {
        log::warn!(
            "[amf_ue_id={}] Retransmission of {} failed. Stop",
            amf_ue.id,
            timer_id.name()
        );
        match timer_id {
            AmfTimerId::T3550 | AmfTimerId::T3560 | AmfTimerId::T3570 => {
                self.context.metrics.inc(GlobalMetric::RmRegInitFail);
                self.remove_ue(amf_ue);
            }
            AmfTimerId::T3522 => self.remove_ue(amf_ue),
            AmfTimerId::T3513 | AmfTimerId::T3555 => {}
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn remove_ue(&mut self, amf_ue: &Arc<AmfUe>) {
        self.stop_all_timers(amf_ue);
        for handle in self.context.amf_ue_remove(amf_ue) {
            self.timers.stop(handle);
        }
    }

    /// Tear down a context whose SUCI or SUPI another context took over
    fn remove_displaced(&mut self, displaced: Option<Arc<AmfUe>>) {
        if let Some(stale) = displaced {
            log::info!("[amf_ue_id={}] Removing stale context", stale.id);
            self.remove_ue(&stale);
        }
    }

    /// End the running registration attempt
    fn fail_registration(&mut self, amf_ue: &AmfUe) {
        self.stop_all_timers(amf_ue);
        let mut ue = amf_ue.lock();
        ue.discard_memento();
        ue.gmm.reset();
        log::warn!("[{}] Registration failed", ue.display_id());
        drop(ue);
        self.context.metrics.inc(GlobalMetric::RmRegInitFail);
    }

    /// Honour an abort raised by a newer registration
    fn check_abort(&mut self, amf_ue: &AmfUe) -> AmfResult<()> {
        let aborted = {
            let mut ue = amf_ue.lock();
            let aborted = ue.gmm.take_abort();
            if aborted {
                ue.restore_memento();
            }
            aborted
        };
        if aborted {
            self.stop_all_timers(amf_ue);
            return Err(AmfError::Cancelled);
        }
        Ok(())
    }

    fn expect_state(amf_ue: &AmfUe, state: GmmState) -> AmfResult<()> {
        let current = amf_ue.gmm_state();
        if current != state {
            log::error!(
                "[amf_ue_id={}] Unexpected message in {}",
                amf_ue.id,
                current.name()
            );
            return Err(AmfError::InvalidState(current));
        }
        Ok(())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Handle a Registration Request arriving on `ran_ue`
    pub fn registration_request(
        &mut self,
        ran_ue: &Arc<RanUe>,
        req: &RegistrationRequest,
    ) -> AmfResult<GmmMessage> {
        if req.registration_type == RegistrationType::Initial {
            self.context.metrics.inc(GlobalMetric::RmRegInitReq);
        }

        let Some(identity) = req.mobile_identity.to_ue_identity() else {
            log::warn!("Registration without SUCI or GUTI");
            self.context.metrics.inc(GlobalMetric::RmRegInitFail);
            return Ok(GmmMessage::RegistrationReject {
                cause: gmm_cause::UE_IDENTITY_CANNOT_BE_DERIVED_BY_THE_NETWORK,
            });
        };

        let (amf_ue, state) = match ran_ue
            .amf_ue()
            .or_else(|| self.context.find_by_any_identity(&identity))
        {
            Some(amf_ue) => {
                // A request rejected here must leave the UE as it was
                let state = {
                    let mut ue = amf_ue.lock();
                    let reuse =
                        req.can_reuse_security_context() && ue.security_context_is_valid();
                    ue.gmm.begin_registration(reuse)?
                };
                attach_ran_ue(&amf_ue, Some(ran_ue));
                (amf_ue, state)
            }
            None => match self.context.amf_ue_add(Some(ran_ue)) {
                Ok(amf_ue) => {
                    match &identity {
                        UeIdentity::Suci(suci) => {
                            let displaced = self.context.amf_ue_set_suci(&amf_ue, suci)?;
                            self.remove_displaced(displaced);
                        }
                        UeIdentity::Guti(guti) => {
                            self.context.amf_ue_set_current_guti(&amf_ue, *guti)?
                        }
                        _ => {}
                    }
                    let state = amf_ue.lock().gmm.begin_registration(false)?;
                    (amf_ue, state)
                }
                Err(AmfError::Exhausted(reason)) => {
                    log::error!("Registration rejected: {}", reason);
                    self.context.metrics.inc(GlobalMetric::RmRegInitFail);
                    return Ok(GmmMessage::RegistrationReject {
                        cause: gmm_cause::CONGESTION,
                    });
                }
                Err(e) => return Err(e),
            },
        };

        let nr_tai = ran_ue.lock().nr_tai;
        {
            let mut ue = amf_ue.lock();
            ue.nas.registration_type = req.registration_type.value();
            ue.nas.follow_on_request = req.follow_on_request;
            ue.nas.ue_ksi = req.ngksi;
            if req.ue_security_capability.is_some() {
                ue.ue_security_capability = req.ue_security_capability;
            }
            ue.nr_tai = nr_tai.or(req.last_visited_tai);

            if req.security_header_type.integrity_protected() {
                if req.mac_verified {
                    ue.security.ul_count.update_from_sqn(req.sequence_number);
                } else {
                    log::warn!("[{}] Registration Request MAC failed", ue.display_id());
                    ue.security.mac_failed = true;
                }
            }
        }

        log::info!(
            "[amf_ue_id={}] Registration request [type:{:?}] -> {}",
            amf_ue.id,
            req.registration_type,
            state.name()
        );

        if state == GmmState::SecurityMode {
            return self.enter_initial_context_setup(&amf_ue);
        }

        let known = {
            let ue = amf_ue.lock();
            ue.suci.is_some() || ue.supi.is_some()
        };
        if known {
            Ok(self.send_authentication_request(&amf_ue))
        } else {
            let message = GmmMessage::IdentityRequest;
            self.start_timer(&amf_ue, AmfTimerId::T3570, message.clone());
            Ok(message)
        }
    }

    /// Identity Response carrying the SUCI
    pub fn identity_response(&mut self, amf_ue: &Arc<AmfUe>, suci: &str) -> AmfResult<GmmMessage> {
        self.stop_timer(amf_ue, AmfTimerId::T3570);
        self.check_abort(amf_ue)?;
        Self::expect_state(amf_ue, GmmState::Authentication)?;

        let displaced = self.context.amf_ue_set_suci(amf_ue, suci)?;
        self.remove_displaced(displaced);
        Ok(self.send_authentication_request(amf_ue))
    }

    fn send_authentication_request(&mut self, amf_ue: &Arc<AmfUe>) -> GmmMessage {
        self.context.metrics.inc(GlobalMetric::AmfAuthReq);
        let ngksi = {
            let mut ue = amf_ue.lock();
            if ue.security_context_is_valid() {
                ue.save_memento();
            }
            let ngksi = ue.nas.next_ksi();
            ue.nas.amf_ksi = ngksi;
            ngksi
        };
        let message = GmmMessage::AuthenticationRequest { ngksi };
        self.start_timer(amf_ue, AmfTimerId::T3560, message.clone());
        message
    }

    fn authentication_failure(&mut self, amf_ue: &AmfUe) -> GmmMessage {
        self.context.metrics.inc(GlobalMetric::AmfAuthReject);
        amf_ue.lock().restore_memento();
        self.fail_registration(amf_ue);
        GmmMessage::AuthenticationReject
    }

    /// Authentication Response; `verified` is the AUSF's RES* verdict
    pub fn authentication_response(
        &mut self,
        amf_ue: &Arc<AmfUe>,
        verified: bool,
    ) -> AmfResult<GmmMessage> {
        self.stop_timer(amf_ue, AmfTimerId::T3560);
        self.check_abort(amf_ue)?;
        Self::expect_state(amf_ue, GmmState::Authentication)?;

        if !verified {
            log::warn!("[amf_ue_id={}] Authentication failed", amf_ue.id);
            return Ok(self.authentication_failure(amf_ue));
        }

        let identity = {
            let ue = amf_ue.lock();
            match (&ue.supi, &ue.suci) {
                (Some(supi), _) => UeIdentity::Supi(supi.clone()),
                (None, Some(suci)) => UeIdentity::Suci(suci.clone()),
                (None, None) => return Err(AmfError::NotFound("subscriber identity")),
            }
        };
        let profile = match self.repository.get_subscriber_by_identity(&identity) {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("[amf_ue_id={}] Subscriber lookup failed: {}", amf_ue.id, e);
                return Ok(self.authentication_failure(amf_ue));
            }
        };
        let displaced = self.context.amf_ue_set_supi(amf_ue, &profile.supi)?;
        self.remove_displaced(displaced);

        let integrity_order = &self.context.config.integrity_order;
        let ciphering_order = &self.context.config.ciphering_order;
        let result = {
            let mut ue = amf_ue.lock();
            let ksi = ue.nas.amf_ksi;
            ue.set_anchor_key(&profile.kseaf, &profile.abba, ksi)
                .and_then(|_| ue.gmm_transition(GmmState::SecurityMode))
                .and_then(|_| ue.derive_nas_keys(integrity_order, ciphering_order))
                .map(|algorithms| (ksi, algorithms, ue.ue_security_capability))
        };
        let (ngksi, algorithms, ue_security_capability) = match result {
            Ok(result) => result,
            Err(e) => {
                log::error!("[amf_ue_id={}] Key derivation failed: {}", amf_ue.id, e);
                amf_ue.lock().restore_memento();
                self.fail_registration(amf_ue);
                return Err(e);
            }
        };
        amf_ue.lock().discard_memento();

        let message = GmmMessage::SecurityModeCommand {
            ngksi,
            algorithms,
            ue_security_capability,
        };
        self.start_timer(amf_ue, AmfTimerId::T3560, message.clone());
        Ok(message)
    }

    /// Security Mode Complete
    pub fn security_mode_complete(
        &mut self,
        amf_ue: &Arc<AmfUe>,
        msg: &SecurityModeComplete,
    ) -> AmfResult<GmmMessage> {
        self.stop_timer(amf_ue, AmfTimerId::T3560);
        self.check_abort(amf_ue)?;
        Self::expect_state(amf_ue, GmmState::SecurityMode)?;

        {
            let mut ue = amf_ue.lock();
            if !msg.mac_verified {
                log::warn!("[{}] Security Mode Complete MAC failed", ue.display_id());
                ue.security.mac_failed = true;
                drop(ue);
                self.fail_registration(amf_ue);
                return Ok(GmmMessage::RegistrationReject {
                    cause: gmm_cause::SECURITY_MODE_REJECTED_UNSPECIFIED,
                });
            }
            ue.security.ul_count.update_from_sqn(msg.sequence_number);
        }

        self.enter_initial_context_setup(amf_ue)
    }

    /// Refresh KgNB/NH, stage a new GUTI and answer with Registration Accept
    fn enter_initial_context_setup(&mut self, amf_ue: &Arc<AmfUe>) -> AmfResult<GmmMessage> {
        let result = {
            let mut ue = amf_ue.lock();
            ue.update_security_context()
                .and_then(|_| ue.gmm_transition(GmmState::InitialContextSetup))
        };
        if let Err(e) = result {
            self.fail_registration(amf_ue);
            return Err(e);
        }

        let guti = match self.context.assign_new_guti(amf_ue, &self.cancel) {
            Ok(guti) => guti,
            Err(AmfError::Exhausted(reason)) => {
                log::error!("[amf_ue_id={}] No TMSI available: {}", amf_ue.id, reason);
                self.fail_registration(amf_ue);
                return Ok(GmmMessage::RegistrationReject {
                    cause: gmm_cause::CONGESTION,
                });
            }
            Err(e) => {
                self.fail_registration(amf_ue);
                return Err(e);
            }
        };

        let message = GmmMessage::RegistrationAccept {
            guti,
            t3512: self.context.config.t3512,
        };
        self.start_timer(amf_ue, AmfTimerId::T3550, message.clone());
        Ok(message)
    }

    /// Initial Context Setup Response followed by Registration Complete.
    ///
    /// Answers with a Configuration Update Command when a network name is
    /// known for the UE's PLMN.
    pub fn registration_complete(&mut self, amf_ue: &Arc<AmfUe>) -> AmfResult<Option<GmmMessage>> {
        self.stop_timer(amf_ue, AmfTimerId::T3550);
        self.check_abort(amf_ue)?;
        Self::expect_state(amf_ue, GmmState::InitialContextSetup)?;

        let guti = self.context.confirm_new_guti(amf_ue)?;
        let result = {
            let mut ue = amf_ue.lock();
            ue.gmm_transition(GmmState::Registered)
                .map(|_| ue.nas.registration_type)
        };
        match result {
            Ok(registration_type) => {
                if registration_type == RegistrationType::Initial.value() {
                    self.context.metrics.inc(GlobalMetric::RmRegInitSucc);
                }
                log::info!("[amf_ue_id={}] Registered [GUTI:{}]", amf_ue.id, guti);
                Ok(self.configuration_update_command(&guti))
            }
            Err(e) => {
                self.fail_registration(amf_ue);
                Err(e)
            }
        }
    }

    /// Network name of the serving operator, else the configured one
    fn configuration_update_command(&self, guti: &Guti5gs) -> Option<GmmMessage> {
        let network_name = match self.repository.get_operator_info(&guti.plmn_id) {
            Ok(info) => info.network_name,
            Err(e) => {
                log::debug!("No operator info for PLMN {}: {}", guti.plmn_id, e);
                self.context.config.network_name.clone()
            }
        };
        if network_name.full.is_none() && network_name.short.is_none() {
            return None;
        }
        Some(GmmMessage::ConfigurationUpdateCommand { network_name })
    }

    // ========================================================================
    // De-registration
    // ========================================================================

    /// UE-initiated De-registration Request. No answer when switching off.
    pub fn deregistration_request(
        &mut self,
        ran_ue: &Arc<RanUe>,
        req: &DeregistrationRequest,
    ) -> AmfResult<Option<GmmMessage>> {
        self.context.metrics.inc(GlobalMetric::MmDeRegReq);

        let amf_ue = ran_ue
            .amf_ue()
            .or_else(|| {
                req.mobile_identity
                    .to_ue_identity()
                    .and_then(|identity| self.context.find_by_any_identity(&identity))
            })
            .ok_or(AmfError::NotFound("AMF UE"))?;

        amf_ue.lock().gmm_transition(GmmState::DeRegistered)?;
        log::info!(
            "[amf_ue_id={}] De-registration [switch_off:{}]",
            amf_ue.id,
            req.switch_off
        );
        self.remove_ue(&amf_ue);

        Ok((!req.switch_off).then_some(GmmMessage::DeregistrationAccept))
    }

    /// Network-initiated de-registration of a registered UE
    pub fn deregister_ue(&mut self, amf_ue: &Arc<AmfUe>) -> AmfResult<GmmMessage> {
        let access_type = {
            let mut ue = amf_ue.lock();
            ue.gmm_transition(GmmState::DeRegistrationInitiated)?;
            ue.nas.access_type
        };
        let message = GmmMessage::DeregistrationRequest { access_type };
        self.start_timer(amf_ue, AmfTimerId::T3522, message.clone());
        Ok(message)
    }

    /// De-registration Accept for a network-initiated de-registration
    pub fn deregistration_accept(&mut self, amf_ue: &Arc<AmfUe>) -> AmfResult<()> {
        self.stop_timer(amf_ue, AmfTimerId::T3522);
        Self::expect_state(amf_ue, GmmState::DeRegistrationInitiated)?;
        amf_ue.lock().gmm_transition(GmmState::DeRegistered)?;
        self.remove_ue(amf_ue);
        Ok(())
    }

    // ========================================================================
    // N2 handover
    // ========================================================================

    /// Handover Required from the source gNB: create the target RAN UE,
    /// pair it with the source and advance the NH chain.
    pub fn handover_required(
        &mut self,
        source: &Arc<RanUe>,
        target_gnb: &Arc<AmfGnb>,
        target_ran_ue_ngap_id: u64,
    ) -> AmfResult<HandoverRequest> {
        let amf_ue = source.amf_ue().ok_or(AmfError::NotFound("AMF UE"))?;
        let state = amf_ue.gmm_state();
        if state != GmmState::Registered {
            log::error!("[amf_ue_id={}] Handover in {}", amf_ue.id, state.name());
            return Err(AmfError::InvalidState(state));
        }
        self.context.metrics.inc(GlobalMetric::MmHoPrepReq);

        let target = self.context.ran_ue_add(target_gnb, target_ran_ue_ngap_id)?;
        if let Err(e) = attach_source_target(Some(source), Some(&target)) {
            self.context.ran_ue_remove(&target);
            return Err(e);
        }

        let result = {
            let mut ue = amf_ue.lock();
            ue.update_nh().map(|ncc| (ue.security.nh, ncc))
        };
        let (nh, ncc) = match result {
            Ok(result) => result,
            Err(e) => {
                detach_source_target(&target);
                self.context.ran_ue_remove(&target);
                return Err(e);
            }
        };

        log::info!(
            "[amf_ue_id={}] Handover prepared: RAN UE {} -> {} [NCC:{}]",
            amf_ue.id,
            source.id,
            target.id,
            ncc
        );
        Ok(HandoverRequest { target, nh, ncc })
    }

    /// Handover Notify from the target gNB: the UE moved, release the source
    pub fn handover_notify(&mut self, target: &Arc<RanUe>) -> AmfResult<()> {
        let source = target
            .source_ue()
            .ok_or(AmfError::Consistency("handover target has no source"))?;
        let amf_ue = target.amf_ue().ok_or(AmfError::NotFound("AMF UE"))?;

        if !attach_ran_ue(&amf_ue, Some(target)) {
            return Err(AmfError::Consistency("handover target gNB is gone"));
        }
        let nr_tai = target.lock().nr_tai;
        if nr_tai.is_some() {
            amf_ue.lock().nr_tai = nr_tai;
        }

        detach_source_target(target);
        self.context.ran_ue_remove(&source);
        self.context.metrics.inc(GlobalMetric::MmHoSucc);
        log::info!("[amf_ue_id={}] Handover complete on RAN UE {}", amf_ue.id, target.id);
        Ok(())
    }

    /// Handover Cancel from the source gNB: drop the prepared target
    pub fn handover_cancel(&mut self, source: &Arc<RanUe>) -> AmfResult<()> {
        let target = source
            .target_ue()
            .ok_or(AmfError::Consistency("handover source has no target"))?;
        detach_source_target(source);
        self.context.ran_ue_remove(&target);
        log::info!("Handover cancelled: RAN UE {} kept", source.id);
        Ok(())
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Cancel in-flight allocations and tear down every UE
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        let handles = self.context.amf_ue_remove_all();
        for handle in handles {
            self.timers.stop(handle);
        }
        self.pending.clear();
        self.context.gnb_remove_all();
    }
}
