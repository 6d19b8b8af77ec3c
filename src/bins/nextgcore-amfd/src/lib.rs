//! NextGCore AMF mobility-management core
//!
//! UE identities (SUCI/SUPI/5G-GUTI), the TMSI allocator, the security key
//! chain, RAN/AMF UE contexts with the GMM state machine, the gNB registry
//! and the GMM procedure driver that ties them together.

pub mod amf_ue;
pub mod config;
pub mod context;
pub mod error;
pub mod gmm_handler;
pub mod gmm_sm;
pub mod gnb;
pub mod metrics;
pub mod nas;
pub mod ran_ue;
pub mod repository;
pub mod security;
pub mod timer;
pub mod tmsi;
pub mod types;


pub use amf_ue::{AmfSess, AmfUe};
pub use config::{AmfConfig, ConfigError};
pub use context::{AmfContext, UeIdentity};
pub use error::{AmfError, AmfResult};
pub use gmm_handler::{GmmDownlink, GmmHandler, HandoverRequest};
pub use gmm_sm::{GmmFsm, GmmState};
pub use gnb::{AmfGnb, Transport};
pub use metrics::{AmfMetrics, GlobalMetric};
pub use ran_ue::RanUe;
pub use repository::{MemoryRepository, SubscriberRepository};
pub use tmsi::TmsiAllocator;
pub use types::{AmfId, Guami, Guti5gs, GutiError, PlmnId, Tai5gs, Tmsi};
