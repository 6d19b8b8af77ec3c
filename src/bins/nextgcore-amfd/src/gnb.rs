//! gNB association
//!
//! An NG-association with one gNB. The gNB exclusively owns its RAN UEs.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AmfError, AmfResult};
use crate::ran_ue::RanUe;
use crate::types::Tai5gs;

/// Transport towards one gNB (SCTP association in production)
pub trait Transport: Send + Sync {
    /// Send one encoded NGAP PDU
    fn send(&self, buf: &[u8]) -> AmfResult<()>;

    /// Peer address
    fn remote_address(&self) -> SocketAddr;
}

/// Mutable part of a gNB association
#[derive(Default)]
pub struct GnbState {
    /// Global gNB ID, known after NG Setup
    pub gnb_id: Option<u32>,
    /// NG Setup completed
    pub ng_setup_success: bool,
    /// TAs served by this gNB
    pub supported_ta_list: Vec<Tai5gs>,
    ran_ue_list: BTreeMap<u64, Arc<RanUe>>,
}

/// gNB context
pub struct AmfGnb {
    /// Pool ID
    pub id: u64,
    /// SCTP peer address
    pub addr: SocketAddr,
    transport: Option<Arc<dyn Transport>>,
    state: Mutex<GnbState>,
}

impl fmt::Debug for AmfGnb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmfGnb")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl AmfGnb {
    pub fn new(id: u64, addr: SocketAddr, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            id,
            addr,
            transport,
            state: Mutex::new(GnbState::default()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, GnbState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn gnb_id(&self) -> Option<u32> {
        self.lock().gnb_id
    }

    /// Send an NGAP PDU to this gNB
    pub fn send(&self, buf: &[u8]) -> AmfResult<()> {
        match &self.transport {
            Some(transport) => transport.send(buf),
            None => Err(AmfError::Transport(format!("no transport for gNB {}", self.addr))),
        }
    }

    // ========================================================================
    // RAN UE list
    // ========================================================================

    /// Create a RAN UE owned by this gNB
    pub fn ran_ue_add(self: &Arc<Self>, id: u64, ran_ue_ngap_id: u64, amf_ue_ngap_id: i64) -> Arc<RanUe> {
        let ran_ue = Arc::new(RanUe::new(
            id,
            ran_ue_ngap_id,
            amf_ue_ngap_id,
            Arc::downgrade(self),
        ));
        self.lock().ran_ue_list.insert(id, Arc::clone(&ran_ue));
        log::debug!(
            "[gNB {}] RAN UE added [RAN_UE_NGAP_ID:{} AMF_UE_NGAP_ID:{}]",
            self.addr,
            ran_ue_ngap_id,
            amf_ue_ngap_id
        );
        ran_ue
    }

    /// Drop ownership of a RAN UE. Only the first call for an id returns it.
    pub fn ran_ue_remove(&self, id: u64) -> Option<Arc<RanUe>> {
        self.lock().ran_ue_list.remove(&id)
    }

    /// Drop ownership of every RAN UE
    pub fn ran_ue_remove_all(&self) -> Vec<Arc<RanUe>> {
        let list = std::mem::take(&mut self.lock().ran_ue_list);
        list.into_values().collect()
    }

    pub fn has_ran_ue(&self, id: u64) -> bool {
        self.lock().ran_ue_list.contains_key(&id)
    }

    pub fn ran_ue_find_by_ran_ue_ngap_id(&self, ran_ue_ngap_id: u64) -> Option<Arc<RanUe>> {
        self.lock()
            .ran_ue_list
            .values()
            .find(|ran_ue| ran_ue.ran_ue_ngap_id == ran_ue_ngap_id)
            .cloned()
    }

    pub fn ran_ue_find_by_amf_ue_ngap_id(&self, amf_ue_ngap_id: i64) -> Option<Arc<RanUe>> {
        self.lock()
            .ran_ue_list
            .values()
            .find(|ran_ue| ran_ue.amf_ue_ngap_id == amf_ue_ngap_id)
            .cloned()
    }

    pub fn ran_ue_count(&self) -> usize {
        self.lock().ran_ue_list.len()
    }

    /// Snapshot of the RAN UEs in pool-id order
    pub fn ran_ue_list(&self) -> Vec<Arc<RanUe>> {
        self.lock().ran_ue_list.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingTransport {
        addr: SocketAddr,
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, buf: &[u8]) -> AmfResult<()> {
            self.sent.lock().unwrap().push(buf.to_vec());
            Ok(())
        }

        fn remote_address(&self) -> SocketAddr {
            self.addr
        }
    }

    fn addr() -> SocketAddr {
        "192.168.0.1:38412".parse().unwrap()
    }

    #[test]
    fn test_ran_ue_add_remove() {
        let gnb = Arc::new(AmfGnb::new(1, addr(), None));
        let ran_ue = gnb.ran_ue_add(5, 1001, 1);
        assert_eq!(gnb.ran_ue_count(), 1);
        assert!(gnb.has_ran_ue(5));
        assert!(Arc::ptr_eq(&ran_ue.gnb().unwrap(), &gnb));

        let found = gnb.ran_ue_find_by_ran_ue_ngap_id(1001).unwrap();
        assert!(Arc::ptr_eq(&found, &ran_ue));
        assert!(gnb.ran_ue_find_by_amf_ue_ngap_id(1).is_some());

        assert!(gnb.ran_ue_remove(5).is_some());
        assert!(gnb.ran_ue_remove(5).is_none());
        assert!(ran_ue.gnb().is_none());
    }

    #[test]
    fn test_ran_ue_remove_all() {
        let gnb = Arc::new(AmfGnb::new(1, addr(), None));
        gnb.ran_ue_add(2, 11, 2);
        gnb.ran_ue_add(1, 10, 1);
        let removed = gnb.ran_ue_remove_all();
        let ids: Vec<_> = removed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(gnb.ran_ue_count(), 0);
    }

    #[test]
    fn test_send() {
        let transport = Arc::new(RecordingTransport {
            addr: addr(),
            sent: StdMutex::new(Vec::new()),
        });
        let gnb = AmfGnb::new(1, addr(), Some(transport.clone()));
        gnb.send(&[0x00, 0x15]).unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(transport.remote_address(), gnb.addr);

        let silent = AmfGnb::new(2, addr(), None);
        assert!(matches!(silent.send(&[0]), Err(AmfError::Transport(_))));
    }
}
