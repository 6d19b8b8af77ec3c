//! AMF Metrics
//!
//! Registration, authentication and handover counters plus context gauges.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalMetric {
    // Gauges
    /// Number of gNodeBs
    Gnb,
    /// Number of RAN UEs
    RanUe,
    /// Number of AMF UEs
    AmfUe,
    /// Number of AMF sessions
    AmfSession,

    // Counters
    /// Initial registration requests
    RmRegInitReq,
    /// Successful initial registrations
    RmRegInitSucc,
    /// Failed initial registrations
    RmRegInitFail,
    /// Authentication requests
    AmfAuthReq,
    /// Authentication rejections
    AmfAuthReject,
    /// UE-initiated de-registrations
    MmDeRegReq,
    /// N2 handover preparations
    MmHoPrepReq,
    /// Completed N2 handovers
    MmHoSucc,
}

impl GlobalMetric {
    pub const ALL: [GlobalMetric; 12] = [
        GlobalMetric::Gnb,
        GlobalMetric::RanUe,
        GlobalMetric::AmfUe,
        GlobalMetric::AmfSession,
        GlobalMetric::RmRegInitReq,
        GlobalMetric::RmRegInitSucc,
        GlobalMetric::RmRegInitFail,
        GlobalMetric::AmfAuthReq,
        GlobalMetric::AmfAuthReject,
        GlobalMetric::MmDeRegReq,
        GlobalMetric::MmHoPrepReq,
        GlobalMetric::MmHoSucc,
    ];

    /// Get metric name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gnb => "gnb",
            Self::RanUe => "ran_ue",
            Self::AmfUe => "amf_ue",
            Self::AmfSession => "amf_session",
            Self::RmRegInitReq => "fivegs_amffunction_rm_reginitreq",
            Self::RmRegInitSucc => "fivegs_amffunction_rm_reginitsucc",
            Self::RmRegInitFail => "fivegs_amffunction_rm_reginitfail",
            Self::AmfAuthReq => "fivegs_amffunction_amf_authreq",
            Self::AmfAuthReject => "fivegs_amffunction_amf_authreject",
            Self::MmDeRegReq => "fivegs_amffunction_mm_deregreq",
            Self::MmHoPrepReq => "fivegs_amffunction_mm_hoprepreq",
            Self::MmHoSucc => "fivegs_amffunction_mm_hosucc",
        }
    }

    /// Get metric description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Gnb => "gNodeBs",
            Self::RanUe => "RAN UEs",
            Self::AmfUe => "AMF UEs",
            Self::AmfSession => "AMF Sessions",
            Self::RmRegInitReq => "Number of initial registration requests received by the AMF",
            Self::RmRegInitSucc => "Number of successful initial registrations at the AMF",
            Self::RmRegInitFail => "Number of failed initial registrations at the AMF",
            Self::AmfAuthReq => "Number of authentication requests sent by the AMF",
            Self::AmfAuthReject => "Number of authentication rejections sent by the AMF",
            Self::MmDeRegReq => "Number of UE-initiated de-registration requests received by the AMF",
            Self::MmHoPrepReq => "Number of N2 handover preparations started by the AMF",
            Self::MmHoSucc => "Number of N2 handovers completed at the AMF",
        }
    }

    /// Check if this is a gauge metric
    pub fn is_gauge(&self) -> bool {
        matches!(self, Self::Gnb | Self::RanUe | Self::AmfUe | Self::AmfSession)
    }
}

/// AMF metrics manager
pub struct AmfMetrics {
    global_counters: HashMap<GlobalMetric, AtomicU64>,
}

impl Default for AmfMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AmfMetrics {
    pub fn new() -> Self {
        let global_counters = GlobalMetric::ALL
            .into_iter()
            .map(|metric| (metric, AtomicU64::new(0)))
            .collect();
        Self { global_counters }
    }

    /// Increment a global counter
    pub fn inc(&self, metric: GlobalMetric) {
        if let Some(counter) = self.global_counters.get(&metric) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Decrement a gauge, saturating at zero
    pub fn dec(&self, metric: GlobalMetric) {
        if let Some(counter) = self.global_counters.get(&metric) {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        }
    }

    /// Set a global gauge
    pub fn set(&self, metric: GlobalMetric, value: u64) {
        if let Some(counter) = self.global_counters.get(&metric) {
            counter.store(value, Ordering::Relaxed);
        }
    }

    /// Get a global metric value
    pub fn get(&self, metric: GlobalMetric) -> u64 {
        self.global_counters
            .get(&metric)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in self.global_counters.values() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus text format, sorted by metric
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        for metric in GlobalMetric::ALL {
            let metric_type = if metric.is_gauge() { "gauge" } else { "counter" };
            let _ = writeln!(output, "# HELP {} {}", metric.name(), metric.description());
            let _ = writeln!(output, "# TYPE {} {}", metric.name(), metric_type);
            let _ = writeln!(output, "{} {}", metric.name(), self.get(metric));
        }
        output
    }
}
