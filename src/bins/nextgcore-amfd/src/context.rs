//! AMF Context
//!
//! The registry of gNB associations and AMF UEs. It owns every gNB and
//! every AMF UE through an `Arc`; each gNB owns its RAN UEs. One coarse
//! `RwLock` guards the primary maps together with the SUCI/SUPI/GUTI and
//! gNB address/ID hashes so an index never disagrees with its map.
//!
//! Lock order: registry -> gNB -> AMF UE -> RAN UE. The ID allocators are
//! leaf locks. TMSI allocation may retry, so it runs with no context lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use ogs_core::{CancelToken, SequentialIdGenerator, TimerHandle};

use crate::amf_ue::{AmfSess, AmfUe};
use crate::config::{AmfConfig, SNssai};
use crate::error::{AmfError, AmfResult};
use crate::gnb::{AmfGnb, Transport};
use crate::metrics::{AmfMetrics, GlobalMetric};
use crate::ran_ue::{attach_ran_ue, detach_source_target, RanUe};
use crate::tmsi::TmsiAllocator;
use crate::types::{Guami, Guti5gs, PlmnId, Tai5gs};

/// Largest AMF UE NGAP ID (40 bits)
pub const MAX_AMF_UE_NGAP_ID: i64 = (1 << 40) - 1;

/// Largest internal pool ID
const MAX_POOL_ID: i64 = u32::MAX as i64;

/// Any identity a UE can be looked up by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UeIdentity {
    Supi(String),
    Suci(String),
    Guti(Guti5gs),
    AmfUeNgapId(i64),
}

#[derive(Default)]
struct Registry {
    /// gNB list (by pool ID)
    gnb_list: HashMap<u64, Arc<AmfGnb>>,
    /// gNB address hash (SCTP peer -> pool ID)
    gnb_addr_hash: HashMap<SocketAddr, u64>,
    /// gNB ID hash (global gNB ID -> pool ID)
    gnb_id_hash: HashMap<u32, u64>,
    /// AMF UE list (by pool ID)
    amf_ue_list: HashMap<u64, Arc<AmfUe>>,
    suci_hash: HashMap<String, u64>,
    supi_hash: HashMap<String, u64>,
    guti_ue_hash: HashMap<Guti5gs, u64>,
}

/// Drop `key` from `hash` only if it still points at `id`
fn remove_if_owned<K: std::hash::Hash + Eq>(hash: &mut HashMap<K, u64>, key: &K, id: u64) {
    if hash.get(key) == Some(&id) {
        hash.remove(key);
    }
}

/// AMF Context - registry of gNBs and UEs
pub struct AmfContext {
    /// Validated configuration
    pub config: AmfConfig,
    /// Context gauges and procedure counters
    pub metrics: AmfMetrics,
    registry: RwLock<Registry>,
    tmsi: TmsiAllocator,
    amf_ue_ngap_id: SequentialIdGenerator,
    pool_id: SequentialIdGenerator,
}

impl AmfContext {
    pub fn new(config: AmfConfig) -> AmfResult<Self> {
        log::info!(
            "AMF context initialized with max {} UEs, {} served GUAMI",
            config.max_num_of_ue,
            config.served_guami.len()
        );
        Ok(Self {
            config,
            metrics: AmfMetrics::new(),
            registry: RwLock::new(Registry::default()),
            tmsi: TmsiAllocator::new(),
            amf_ue_ngap_id: SequentialIdGenerator::new(1, MAX_AMF_UE_NGAP_ID)?,
            pool_id: SequentialIdGenerator::new(1, MAX_POOL_ID)?,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_pool_id(&self) -> AmfResult<u64> {
        Ok(self.pool_id.allocate()? as u64)
    }

    fn free_pool_id(&self, id: u64) {
        self.pool_id.free(id as i64);
    }

    pub fn tmsi_allocator(&self) -> &TmsiAllocator {
        &self.tmsi
    }

    // ========================================================================
    // gNB Management
    // ========================================================================

    /// Add a gNB association for a new SCTP peer
    pub fn gnb_add(
        &self,
        addr: SocketAddr,
        transport: Option<Arc<dyn Transport>>,
    ) -> AmfResult<Arc<AmfGnb>> {
        let mut registry = self.write();
        if registry.gnb_addr_hash.contains_key(&addr) {
            log::error!("[{}] gNB already associated", addr);
            return Err(AmfError::Consistency("gNB address already associated"));
        }

        let id = self.next_pool_id()?;
        let gnb = Arc::new(AmfGnb::new(id, addr, transport));
        registry.gnb_addr_hash.insert(addr, id);
        registry.gnb_list.insert(id, Arc::clone(&gnb));
        self.metrics.inc(GlobalMetric::Gnb);

        log::info!("[Added] Number of gNBs is now {}", registry.gnb_list.len());
        Ok(gnb)
    }

    /// Record the global gNB ID learned from NG Setup
    pub fn gnb_set_gnb_id(&self, gnb: &Arc<AmfGnb>, gnb_id: u32) -> AmfResult<()> {
        let mut registry = self.write();
        if !registry.gnb_list.contains_key(&gnb.id) {
            return Err(AmfError::NotFound("gNB"));
        }

        let mut state = gnb.lock();
        if let Some(old) = state.gnb_id.replace(gnb_id) {
            remove_if_owned(&mut registry.gnb_id_hash, &old, gnb.id);
        }
        registry.gnb_id_hash.insert(gnb_id, gnb.id);
        log::debug!("[{}] gNB-ID[0x{:x}]", gnb.addr, gnb_id);
        Ok(())
    }

    /// Remove a gNB association. Every RAN UE it owned is released and its
    /// AMF UE NGAP ID freed. Returns the number of released RAN UEs.
    pub fn gnb_remove(&self, gnb: &Arc<AmfGnb>) -> usize {
        {
            let mut registry = self.write();
            if registry.gnb_list.remove(&gnb.id).is_none() {
                log::warn!("[{}] gNB already removed", gnb.addr);
                return 0;
            }
            remove_if_owned(&mut registry.gnb_addr_hash, &gnb.addr, gnb.id);
            if let Some(gnb_id) = gnb.gnb_id() {
                remove_if_owned(&mut registry.gnb_id_hash, &gnb_id, gnb.id);
            }
            log::info!("[Removed] Number of gNBs is now {}", registry.gnb_list.len());
        }

        let released = gnb.ran_ue_remove_all();
        for ran_ue in &released {
            self.release_ran_ue(ran_ue);
        }
        self.free_pool_id(gnb.id);
        self.metrics.dec(GlobalMetric::Gnb);
        released.len()
    }

    pub fn gnb_remove_all(&self) {
        let list: Vec<_> = self.read().gnb_list.values().cloned().collect();
        for gnb in list {
            self.gnb_remove(&gnb);
        }
    }

    pub fn gnb_find_by_id(&self, id: u64) -> Option<Arc<AmfGnb>> {
        self.read().gnb_list.get(&id).cloned()
    }

    pub fn gnb_find_by_addr(&self, addr: &SocketAddr) -> Option<Arc<AmfGnb>> {
        let registry = self.read();
        let id = registry.gnb_addr_hash.get(addr)?;
        registry.gnb_list.get(id).cloned()
    }

    pub fn gnb_find_by_gnb_id(&self, gnb_id: u32) -> Option<Arc<AmfGnb>> {
        let registry = self.read();
        let id = registry.gnb_id_hash.get(&gnb_id)?;
        registry.gnb_list.get(id).cloned()
    }

    pub fn gnb_count(&self) -> usize {
        self.read().gnb_list.len()
    }

    // ========================================================================
    // RAN UE Management
    // ========================================================================

    /// Create a RAN UE on `gnb` with a fresh AMF UE NGAP ID
    pub fn ran_ue_add(&self, gnb: &Arc<AmfGnb>, ran_ue_ngap_id: u64) -> AmfResult<Arc<RanUe>> {
        // Held across the insert so a concurrent gnb_remove cannot miss it
        let registry = self.read();
        if !registry.gnb_list.contains_key(&gnb.id) {
            return Err(AmfError::NotFound("gNB"));
        }

        let id = self.next_pool_id()?;
        let amf_ue_ngap_id = match self.amf_ue_ngap_id.allocate() {
            Ok(amf_ue_ngap_id) => amf_ue_ngap_id,
            Err(e) => {
                self.free_pool_id(id);
                log::error!("[{}] AMF_UE_NGAP_ID allocation failed: {}", gnb.addr, e);
                return Err(e.into());
            }
        };

        let ran_ue = gnb.ran_ue_add(id, ran_ue_ngap_id, amf_ue_ngap_id);
        self.metrics.inc(GlobalMetric::RanUe);
        Ok(ran_ue)
    }

    /// Unlink a RAN UE whose gNB already dropped it and free its IDs
    fn release_ran_ue(&self, ran_ue: &Arc<RanUe>) {
        detach_source_target(ran_ue);

        if let Some(amf_ue) = ran_ue.amf_ue() {
            let mut ue = amf_ue.lock();
            if ue.ran_ue.ptr_eq(&Arc::downgrade(ran_ue)) {
                ue.ran_ue = Weak::new();
            }
        }
        ran_ue.lock().amf_ue = Weak::new();

        self.amf_ue_ngap_id.free(ran_ue.amf_ue_ngap_id);
        self.free_pool_id(ran_ue.id);
        self.metrics.dec(GlobalMetric::RanUe);

        log::debug!(
            "RAN UE released [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
            ran_ue.ran_ue_ngap_id,
            ran_ue.amf_ue_ngap_id
        );
    }

    /// Release a RAN UE. Its IDs are freed exactly once, by whichever call
    /// takes it out of its gNB; later calls return `false`.
    pub fn ran_ue_remove(&self, ran_ue: &Arc<RanUe>) -> bool {
        let Some(gnb) = ran_ue.gnb() else {
            log::debug!("RAN UE {} has no gNB, nothing to release", ran_ue.id);
            return false;
        };
        if gnb.ran_ue_remove(ran_ue.id).is_none() {
            return false;
        }
        self.release_ran_ue(ran_ue);
        true
    }

    /// Bounded scan of every gNB's RAN UEs
    pub fn ran_ue_find_by_amf_ue_ngap_id(&self, amf_ue_ngap_id: i64) -> Option<Arc<RanUe>> {
        if !(1..=MAX_AMF_UE_NGAP_ID).contains(&amf_ue_ngap_id) {
            return None;
        }
        self.read()
            .gnb_list
            .values()
            .find_map(|gnb| gnb.ran_ue_find_by_amf_ue_ngap_id(amf_ue_ngap_id))
    }

    pub fn ran_ue_count(&self) -> usize {
        self.read().gnb_list.values().map(|gnb| gnb.ran_ue_count()).sum()
    }

    // ========================================================================
    // AMF UE Management
    // ========================================================================

    /// Create an AMF UE, linked to `ran_ue` when given
    pub fn amf_ue_add(&self, ran_ue: Option<&Arc<RanUe>>) -> AmfResult<Arc<AmfUe>> {
        let amf_ue = {
            let mut registry = self.write();
            if registry.amf_ue_list.len() >= self.config.max_num_of_ue {
                log::error!("Maximum number of UEs [{}] reached", self.config.max_num_of_ue);
                return Err(AmfError::Exhausted(format!(
                    "maximum number of UEs [{}] reached",
                    self.config.max_num_of_ue
                )));
            }

            let id = self.next_pool_id()?;
            let amf_ue = Arc::new(AmfUe::new(id));
            registry.amf_ue_list.insert(id, Arc::clone(&amf_ue));
            log::info!("[Added] Number of AMF-UEs is now {}", registry.amf_ue_list.len());
            amf_ue
        };
        self.metrics.inc(GlobalMetric::AmfUe);

        attach_ran_ue(&amf_ue, ran_ue);
        Ok(amf_ue)
    }

    /// Remove an AMF UE.
    ///
    /// Every step runs even if an earlier one found nothing: registry
    /// entries, GUTI TMSIs, sessions, the RAN UE link. The UE's running
    /// timers are returned for the owner of the timer wheel to stop.
    pub fn amf_ue_remove(&self, amf_ue: &Arc<AmfUe>) -> Vec<TimerHandle> {
        let id = amf_ue.id;
        let (in_registry, tmsis, ran_ue, sessions, timers) = {
            let mut registry = self.write();
            let in_registry = registry.amf_ue_list.remove(&id).is_some();

            let mut ue = amf_ue.lock();
            if let Some(suci) = &ue.suci {
                remove_if_owned(&mut registry.suci_hash, suci, id);
            }
            if let Some(supi) = &ue.supi {
                remove_if_owned(&mut registry.supi_hash, supi, id);
            }
            let current = ue.current_guti.take();
            let current_allocated = std::mem::take(&mut ue.current_guti_allocated);
            let next = ue.next_guti.take();
            for guti in current.iter().chain(next.iter()) {
                remove_if_owned(&mut registry.guti_ue_hash, guti, id);
            }
            let ran_ue = std::mem::take(&mut ue.ran_ue).upgrade();
            let sessions = ue.sess_remove_all();
            let timers = ue.take_all_timers();
            ue.gmm.reset();

            // Only TMSIs drawn from our pool go back to it
            let owned_current = current.filter(|_| current_allocated);
            let tmsis: Vec<_> = owned_current
                .into_iter()
                .chain(next)
                .map(|guti| guti.tmsi)
                .collect();
            (in_registry, tmsis, ran_ue, sessions, timers)
        };

        for tmsi in tmsis {
            self.tmsi.free(tmsi);
        }

        if let Some(ran_ue) = ran_ue {
            let linked_here = ran_ue
                .amf_ue()
                .is_some_and(|owner| Arc::ptr_eq(&owner, amf_ue));
            if linked_here {
                self.ran_ue_remove(&ran_ue);
            }
        }

        for _ in 0..sessions {
            self.metrics.dec(GlobalMetric::AmfSession);
        }
        if in_registry {
            self.free_pool_id(id);
            self.metrics.dec(GlobalMetric::AmfUe);
            log::info!("[Removed] Number of AMF-UEs is now {}", self.amf_ue_count());
        }
        timers
    }

    /// Remove every AMF UE; returns the timers to stop
    pub fn amf_ue_remove_all(&self) -> Vec<TimerHandle> {
        let list: Vec<_> = self.read().amf_ue_list.values().cloned().collect();
        list.iter().flat_map(|amf_ue| self.amf_ue_remove(amf_ue)).collect()
    }

    pub fn amf_ue_find_by_id(&self, id: u64) -> Option<Arc<AmfUe>> {
        self.read().amf_ue_list.get(&id).cloned()
    }

    pub fn amf_ue_find_by_suci(&self, suci: &str) -> Option<Arc<AmfUe>> {
        let registry = self.read();
        let id = registry.suci_hash.get(suci)?;
        registry.amf_ue_list.get(id).cloned()
    }

    pub fn amf_ue_find_by_supi(&self, supi: &str) -> Option<Arc<AmfUe>> {
        let registry = self.read();
        let id = registry.supi_hash.get(supi)?;
        registry.amf_ue_list.get(id).cloned()
    }

    pub fn amf_ue_find_by_guti(&self, guti: &Guti5gs) -> Option<Arc<AmfUe>> {
        let registry = self.read();
        let id = registry.guti_ue_hash.get(guti)?;
        registry.amf_ue_list.get(id).cloned()
    }

    /// Find an AMF UE by whichever identity the caller has
    pub fn find_by_any_identity(&self, identity: &UeIdentity) -> Option<Arc<AmfUe>> {
        match identity {
            UeIdentity::Supi(supi) => self.amf_ue_find_by_supi(supi),
            UeIdentity::Suci(suci) => self.amf_ue_find_by_suci(suci),
            UeIdentity::Guti(guti) => self.amf_ue_find_by_guti(guti),
            UeIdentity::AmfUeNgapId(amf_ue_ngap_id) => self
                .ran_ue_find_by_amf_ue_ngap_id(*amf_ue_ngap_id)
                .and_then(|ran_ue| ran_ue.amf_ue()),
        }
    }

    /// Set the SUCI, re-keying the SUCI hash.
    ///
    /// Returns the other UE that held the SUCI until now. It can no longer
    /// be found by it and the caller removes it.
    pub fn amf_ue_set_suci(
        &self,
        amf_ue: &Arc<AmfUe>,
        suci: &str,
    ) -> AmfResult<Option<Arc<AmfUe>>> {
        let mut registry = self.write();
        if !registry.amf_ue_list.contains_key(&amf_ue.id) {
            return Err(AmfError::NotFound("AMF UE"));
        }
        let mut ue = amf_ue.lock();
        if let Some(old) = ue.suci.replace(suci.to_string()) {
            remove_if_owned(&mut registry.suci_hash, &old, amf_ue.id);
        }
        let previous = registry.suci_hash.insert(suci.to_string(), amf_ue.id);
        let displaced = previous
            .filter(|id| *id != amf_ue.id)
            .and_then(|id| registry.amf_ue_list.get(&id).cloned());
        if let Some(stale) = &displaced {
            log::warn!(
                "[{}] SUCI moved from amf_ue_id={} to amf_ue_id={}",
                suci,
                stale.id,
                amf_ue.id
            );
        }
        Ok(displaced)
    }

    /// Set the SUPI, re-keying the SUPI hash.
    ///
    /// Returns the other UE that held the SUPI until now. It can no longer
    /// be found by it and the caller removes it.
    pub fn amf_ue_set_supi(
        &self,
        amf_ue: &Arc<AmfUe>,
        supi: &str,
    ) -> AmfResult<Option<Arc<AmfUe>>> {
        let mut registry = self.write();
        if !registry.amf_ue_list.contains_key(&amf_ue.id) {
            return Err(AmfError::NotFound("AMF UE"));
        }
        let mut ue = amf_ue.lock();
        if let Some(old) = ue.supi.replace(supi.to_string()) {
            remove_if_owned(&mut registry.supi_hash, &old, amf_ue.id);
        }
        let previous = registry.supi_hash.insert(supi.to_string(), amf_ue.id);
        let displaced = previous
            .filter(|id| *id != amf_ue.id)
            .and_then(|id| registry.amf_ue_list.get(&id).cloned());
        if let Some(stale) = &displaced {
            log::warn!(
                "[{}] SUPI moved from amf_ue_id={} to amf_ue_id={}",
                supi,
                stale.id,
                amf_ue.id
            );
        }
        Ok(displaced)
    }

    /// Index a GUTI the UE presented before it was assigned one here
    pub fn amf_ue_set_current_guti(&self, amf_ue: &Arc<AmfUe>, guti: Guti5gs) -> AmfResult<()> {
        let mut registry = self.write();
        if !registry.amf_ue_list.contains_key(&amf_ue.id) {
            return Err(AmfError::NotFound("AMF UE"));
        }
        let mut ue = amf_ue.lock();
        if let Some(old) = ue.current_guti.replace(guti) {
            remove_if_owned(&mut registry.guti_ue_hash, &old, amf_ue.id);
        }
        ue.current_guti_allocated = false;
        registry.guti_ue_hash.insert(guti, amf_ue.id);
        Ok(())
    }

    pub fn amf_ue_count(&self) -> usize {
        self.read().amf_ue_list.len()
    }

    // ========================================================================
    // GUTI assignment
    // ========================================================================

    /// GUAMI for new GUTIs: the UE's serving GUAMI or the first served one
    fn guami_for(&self, amf_ue: &AmfUe) -> AmfResult<Guami> {
        amf_ue
            .lock()
            .guami
            .or_else(|| self.config.served_guami.first().copied())
            .ok_or(AmfError::NotFound("served GUAMI"))
    }

    /// Allocate a TMSI and stage it as the UE's next GUTI. A previously
    /// staged GUTI is released.
    pub fn assign_new_guti(&self, amf_ue: &Arc<AmfUe>, cancel: &CancelToken) -> AmfResult<Guti5gs> {
        let guami = self.guami_for(amf_ue)?;
        let tmsi = self.tmsi.allocate(cancel)?;
        let guti = Guti5gs::new(&guami, tmsi);

        let replaced = {
            let mut registry = self.write();
            if !registry.amf_ue_list.contains_key(&amf_ue.id) {
                drop(registry);
                self.tmsi.free(tmsi);
                return Err(AmfError::NotFound("AMF UE"));
            }
            let mut ue = amf_ue.lock();
            let replaced = ue.next_guti.replace(guti);
            if let Some(old) = &replaced {
                remove_if_owned(&mut registry.guti_ue_hash, old, amf_ue.id);
            }
            registry.guti_ue_hash.insert(guti, amf_ue.id);
            replaced
        };

        if let Some(old) = replaced {
            self.tmsi.free(old.tmsi);
        }
        log::debug!("[amf_ue_id={}] New GUTI[{}]", amf_ue.id, guti);
        Ok(guti)
    }

    /// The UE acknowledged its new GUTI: promote it and free the old TMSI
    pub fn confirm_new_guti(&self, amf_ue: &Arc<AmfUe>) -> AmfResult<Guti5gs> {
        let (guti, old) = {
            let mut registry = self.write();
            let mut ue = amf_ue.lock();
            let guti = ue
                .next_guti
                .take()
                .ok_or(AmfError::Consistency("no GUTI pending confirmation"))?;
            let old = ue.current_guti.replace(guti);
            let old_allocated = std::mem::replace(&mut ue.current_guti_allocated, true);
            if let Some(old) = &old {
                remove_if_owned(&mut registry.guti_ue_hash, old, amf_ue.id);
            }
            ue.old_guti = old;
            (guti, old.filter(|_| old_allocated))
        };

        // A GUTI the UE presented was never allocated here, even if it
        // names one of our GUAMIs
        if let Some(old) = old {
            self.tmsi.free(old.tmsi);
        }
        log::debug!("[amf_ue_id={}] GUTI confirmed [{}]", amf_ue.id, guti);
        Ok(guti)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn sess_add(&self, amf_ue: &AmfUe, psi: u8) -> AmfSess {
        let mut ue = amf_ue.lock();
        let existed = ue.sess_find_by_psi(psi).is_some();
        let sess = ue.sess_add(psi).clone();
        if !existed {
            self.metrics.inc(GlobalMetric::AmfSession);
        }
        sess
    }

    pub fn sess_remove(&self, amf_ue: &AmfUe, psi: u8) -> Option<AmfSess> {
        let sess = amf_ue.lock().sess_remove(psi)?;
        self.metrics.dec(GlobalMetric::AmfSession);
        Some(sess)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// UE load percentage
    pub fn get_ue_load(&self) -> u8 {
        let total = self.config.max_num_of_ue;
        if total == 0 {
            return 0;
        }
        ((self.amf_ue_count() * 100) / total).min(100) as u8
    }

    pub fn guami_is_served(&self, guami: &Guami) -> bool {
        self.config.served_guami.contains(guami)
    }

    pub fn find_served_tai(&self, tai: &Tai5gs) -> bool {
        self.config.served_tai.contains(tai)
    }

    /// Find a supported S-NSSAI for a served PLMN
    pub fn find_s_nssai(&self, plmn_id: &PlmnId, s_nssai: &SNssai) -> Option<SNssai> {
        self.config
            .plmn_support
            .iter()
            .filter(|support| support.plmn_id == *plmn_id)
            .flat_map(|support| support.s_nssai.iter())
            .find(|supported| supported.sst == s_nssai.sst && supported.sd == s_nssai.sd)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AmfId, Tmsi};

    fn context() -> AmfContext {
        AmfContext::new(AmfConfig::default()).unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_gnb_add_find_remove() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        assert!(matches!(
            ctx.gnb_add(addr(1), None),
            Err(AmfError::Consistency(_))
        ));

        ctx.gnb_set_gnb_id(&gnb, 0x1234).unwrap();
        assert!(Arc::ptr_eq(&ctx.gnb_find_by_addr(&addr(1)).unwrap(), &gnb));
        assert!(Arc::ptr_eq(&ctx.gnb_find_by_gnb_id(0x1234).unwrap(), &gnb));

        ctx.gnb_set_gnb_id(&gnb, 0x5678).unwrap();
        assert!(ctx.gnb_find_by_gnb_id(0x1234).is_none());

        assert_eq!(ctx.gnb_remove(&gnb), 0);
        assert_eq!(ctx.gnb_count(), 0);
        assert!(ctx.gnb_find_by_addr(&addr(1)).is_none());
        assert!(ctx.gnb_find_by_gnb_id(0x5678).is_none());
        assert_eq!(ctx.metrics.get(GlobalMetric::Gnb), 0);
    }

    #[test]
    fn test_ran_ue_ngap_id_freed_once() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        let ran_ue = ctx.ran_ue_add(&gnb, 7).unwrap();
        let amf_ue_ngap_id = ran_ue.amf_ue_ngap_id;
        assert!((1..=MAX_AMF_UE_NGAP_ID).contains(&amf_ue_ngap_id));
        assert!(ctx.amf_ue_ngap_id.is_allocated(amf_ue_ngap_id));

        assert!(ctx.ran_ue_remove(&ran_ue));
        assert!(!ctx.amf_ue_ngap_id.is_allocated(amf_ue_ngap_id));
        assert!(!ctx.ran_ue_remove(&ran_ue));
        assert_eq!(ctx.ran_ue_count(), 0);
        assert_eq!(ctx.metrics.get(GlobalMetric::RanUe), 0);
    }

    #[test]
    fn test_ran_ue_add_on_removed_gnb() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        ctx.gnb_remove(&gnb);
        assert!(matches!(ctx.ran_ue_add(&gnb, 1), Err(AmfError::NotFound(_))));
    }

    #[test]
    fn test_gnb_remove_releases_ran_ues() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        let ran_ue = ctx.ran_ue_add(&gnb, 1).unwrap();
        ctx.ran_ue_add(&gnb, 2).unwrap();
        let amf_ue = ctx.amf_ue_add(Some(&ran_ue)).unwrap();
        assert!(amf_ue.ran_ue().is_some());

        assert_eq!(ctx.gnb_remove(&gnb), 2);
        assert!(amf_ue.ran_ue().is_none());
        assert!(ran_ue.amf_ue().is_none());
        assert!(ran_ue.gnb().is_none());
        assert_eq!(ctx.amf_ue_ngap_id.allocated_count(), 0);
        assert_eq!(ctx.amf_ue_count(), 1);
    }

    #[test]
    fn test_attach_with_gnb_gone_keeps_link() {
        let ctx = context();
        let gnb1 = ctx.gnb_add(addr(1), None).unwrap();
        let gnb2 = ctx.gnb_add(addr(2), None).unwrap();
        let ran_ue1 = ctx.ran_ue_add(&gnb1, 1).unwrap();
        let ran_ue2 = ctx.ran_ue_add(&gnb2, 1).unwrap();
        let amf_ue = ctx.amf_ue_add(Some(&ran_ue1)).unwrap();

        ctx.gnb_remove(&gnb2);
        assert!(!attach_ran_ue(&amf_ue, Some(&ran_ue2)));
        assert!(Arc::ptr_eq(&amf_ue.ran_ue().unwrap(), &ran_ue1));
    }

    #[test]
    fn test_find_by_any_identity() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        let ran_ue = ctx.ran_ue_add(&gnb, 1).unwrap();
        let amf_ue = ctx.amf_ue_add(Some(&ran_ue)).unwrap();

        ctx.amf_ue_set_suci(&amf_ue, "suci-0-001-01-0000-0-0-0000000001").unwrap();
        ctx.amf_ue_set_supi(&amf_ue, "imsi-001010000000001").unwrap();
        let guti = ctx.assign_new_guti(&amf_ue, &CancelToken::never()).unwrap();
        ctx.confirm_new_guti(&amf_ue).unwrap();

        let identities = [
            UeIdentity::Suci("suci-0-001-01-0000-0-0-0000000001".into()),
            UeIdentity::Supi("imsi-001010000000001".into()),
            UeIdentity::Guti(guti),
            UeIdentity::AmfUeNgapId(ran_ue.amf_ue_ngap_id),
        ];
        for identity in &identities {
            let found = ctx.find_by_any_identity(identity).unwrap();
            assert!(Arc::ptr_eq(&found, &amf_ue), "{:?}", identity);
        }
        assert!(ctx.find_by_any_identity(&UeIdentity::AmfUeNgapId(0)).is_none());
        assert!(ctx
            .find_by_any_identity(&UeIdentity::Supi("imsi-999".into()))
            .is_none());
    }

    #[test]
    fn test_set_supi_rekeys_hash() {
        let ctx = context();
        let amf_ue = ctx.amf_ue_add(None).unwrap();
        ctx.amf_ue_set_supi(&amf_ue, "imsi-001010000000001").unwrap();
        ctx.amf_ue_set_supi(&amf_ue, "imsi-001010000000002").unwrap();
        assert!(ctx.amf_ue_find_by_supi("imsi-001010000000001").is_none());
        assert!(ctx.amf_ue_find_by_supi("imsi-001010000000002").is_some());
    }

    #[test]
    fn test_set_supi_reports_previous_holder() {
        let ctx = context();
        let first = ctx.amf_ue_add(None).unwrap();
        let second = ctx.amf_ue_add(None).unwrap();
        assert!(ctx.amf_ue_set_supi(&first, "imsi-001010000000001").unwrap().is_none());
        assert!(ctx.amf_ue_set_supi(&first, "imsi-001010000000001").unwrap().is_none());

        let displaced = ctx.amf_ue_set_supi(&second, "imsi-001010000000001").unwrap();
        assert!(Arc::ptr_eq(&displaced.unwrap(), &first));
        assert!(Arc::ptr_eq(
            &ctx.amf_ue_find_by_supi("imsi-001010000000001").unwrap(),
            &second
        ));

        // Removing the stale UE leaves the new owner indexed
        ctx.amf_ue_remove(&first);
        assert!(Arc::ptr_eq(
            &ctx.amf_ue_find_by_supi("imsi-001010000000001").unwrap(),
            &second
        ));
    }

    #[test]
    fn test_guti_assign_and_confirm() {
        let ctx = context();
        let amf_ue = ctx.amf_ue_add(None).unwrap();
        let cancel = CancelToken::never();

        let first = ctx.assign_new_guti(&amf_ue, &cancel).unwrap();
        assert_eq!(first.guami(), ctx.config.served_guami[0]);
        ctx.confirm_new_guti(&amf_ue).unwrap();

        let second = ctx.assign_new_guti(&amf_ue, &cancel).unwrap();
        assert_eq!(ctx.tmsi.allocated_count(), 2);
        // Both map to the UE until the new one is confirmed
        assert!(ctx.amf_ue_find_by_guti(&first).is_some());
        assert!(ctx.amf_ue_find_by_guti(&second).is_some());

        ctx.confirm_new_guti(&amf_ue).unwrap();
        assert!(ctx.amf_ue_find_by_guti(&first).is_none());
        assert!(!ctx.tmsi.is_allocated(first.tmsi));
        assert_eq!(amf_ue.current_guti(), Some(second));
        assert_eq!(amf_ue.lock().old_guti, Some(first));

        assert!(matches!(
            ctx.confirm_new_guti(&amf_ue),
            Err(AmfError::Consistency(_))
        ));
    }

    #[test]
    fn test_foreign_guti_not_freed() {
        let ctx = context();
        let amf_ue = ctx.amf_ue_add(None).unwrap();
        let foreign = Guti5gs {
            plmn_id: PlmnId::new("001", "01").unwrap(),
            amf_id: AmfId::new(9, 9, 9).unwrap(),
            tmsi: Tmsi::new(0x1234).unwrap(),
        };
        ctx.amf_ue_set_current_guti(&amf_ue, foreign).unwrap();
        ctx.assign_new_guti(&amf_ue, &CancelToken::never()).unwrap();
        ctx.confirm_new_guti(&amf_ue).unwrap();
        assert_eq!(ctx.tmsi.allocated_count(), 1);
        assert!(ctx.amf_ue_find_by_guti(&foreign).is_none());
    }

    #[test]
    fn test_presented_guti_keeps_pool_tmsi() {
        let ctx = context();
        let cancel = CancelToken::never();
        let owner = ctx.amf_ue_add(None).unwrap();
        let ours = ctx.assign_new_guti(&owner, &cancel).unwrap();
        ctx.confirm_new_guti(&owner).unwrap();

        // Another AMF handed out the same TMSI value
        let presenter = ctx.amf_ue_add(None).unwrap();
        let foreign = Guti5gs {
            amf_id: AmfId::new(9, 9, 9).unwrap(),
            ..ours
        };
        ctx.amf_ue_set_current_guti(&presenter, foreign).unwrap();
        ctx.amf_ue_remove(&presenter);
        assert!(ctx.tmsi.is_allocated(ours.tmsi));
        assert!(Arc::ptr_eq(&ctx.amf_ue_find_by_guti(&ours).unwrap(), &owner));

        // Same again with a GUTI naming our own GUAMI, replaced before removal
        let presenter = ctx.amf_ue_add(None).unwrap();
        let stale = Guti5gs {
            tmsi: Tmsi::new(ours.tmsi.value() ^ 1).unwrap(),
            ..ours
        };
        ctx.amf_ue_set_current_guti(&presenter, stale).unwrap();
        ctx.assign_new_guti(&presenter, &cancel).unwrap();
        ctx.confirm_new_guti(&presenter).unwrap();
        assert_eq!(ctx.tmsi.allocated_count(), 2);
        ctx.amf_ue_remove(&presenter);
        assert_eq!(ctx.tmsi.allocated_count(), 1);
        assert!(ctx.tmsi.is_allocated(ours.tmsi));
    }

    #[test]
    fn test_amf_ue_remove_cleans_everything() {
        let ctx = context();
        let gnb = ctx.gnb_add(addr(1), None).unwrap();
        let ran_ue = ctx.ran_ue_add(&gnb, 1).unwrap();
        let amf_ue = ctx.amf_ue_add(Some(&ran_ue)).unwrap();
        ctx.amf_ue_set_supi(&amf_ue, "imsi-001010000000001").unwrap();
        let guti = ctx.assign_new_guti(&amf_ue, &CancelToken::never()).unwrap();
        ctx.sess_add(&amf_ue, 5);
        ctx.sess_add(&amf_ue, 6);
        assert_eq!(ctx.metrics.get(GlobalMetric::AmfSession), 2);

        let timers = ctx.amf_ue_remove(&amf_ue);
        assert!(timers.is_empty());
        assert_eq!(ctx.amf_ue_count(), 0);
        assert!(ctx.amf_ue_find_by_supi("imsi-001010000000001").is_none());
        assert!(ctx.amf_ue_find_by_guti(&guti).is_none());
        assert_eq!(ctx.tmsi.allocated_count(), 0);
        assert_eq!(gnb.ran_ue_count(), 0);
        assert_eq!(ctx.amf_ue_ngap_id.allocated_count(), 0);
        assert_eq!(amf_ue.lock().sess_count(), 0);
        assert_eq!(ctx.metrics.get(GlobalMetric::AmfSession), 0);
        assert_eq!(ctx.metrics.get(GlobalMetric::AmfUe), 0);

        // Second removal finds nothing left to do
        assert!(ctx.amf_ue_remove(&amf_ue).is_empty());
        assert_eq!(ctx.metrics.get(GlobalMetric::AmfUe), 0);
    }

    #[test]
    fn test_max_ue() {
        let config = AmfConfig {
            max_num_of_ue: 2,
            ..AmfConfig::default()
        };
        let ctx = AmfContext::new(config).unwrap();
        ctx.amf_ue_add(None).unwrap();
        let second = ctx.amf_ue_add(None).unwrap();
        assert_eq!(ctx.get_ue_load(), 100);
        assert!(matches!(ctx.amf_ue_add(None), Err(AmfError::Exhausted(_))));
        ctx.amf_ue_remove(&second);
        assert_eq!(ctx.get_ue_load(), 50);
    }

    #[test]
    fn test_served_tai_and_s_nssai() {
        let ctx = context();
        let tai = ctx.config.served_tai[0];
        assert!(ctx.find_served_tai(&tai));
        assert!(!ctx.find_served_tai(&Tai5gs { tac: 99, ..tai }));
        assert!(ctx
            .find_s_nssai(&tai.plmn_id, &SNssai { sst: 1, sd: None })
            .is_some());
        assert!(ctx
            .find_s_nssai(&tai.plmn_id, &SNssai { sst: 2, sd: None })
            .is_none());
    }
}
