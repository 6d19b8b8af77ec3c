//! AMF Timer Management
//!
//! GMM procedure timers on top of the shared [`TimerWheel`]. The wheel is
//! owned by the event loop; each running timer carries a [`GmmTimerToken`]
//! naming the UE and the timer so an expiry can be routed back.

use std::time::{Duration, Instant};

use ogs_core::{TimerEvent, TimerHandle, TimerWheel};

// ============================================================================
// Timer IDs
// ============================================================================

/// AMF timer identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmfTimerId {
    /// T3513 - Paging procedure initiated
    T3513,
    /// T3522 - Deregistration request sent
    T3522,
    /// T3550 - Registration accept sent
    T3550,
    /// T3555 - Configuration update command sent
    T3555,
    /// T3560 - Authentication request / Security mode command sent
    T3560,
    /// T3570 - Identity request sent
    T3570,
}

impl AmfTimerId {
    /// Get timer name
    pub fn name(&self) -> &'static str {
        match self {
            Self::T3513 => "AMF_TIMER_T3513",
            Self::T3522 => "AMF_TIMER_T3522",
            Self::T3550 => "AMF_TIMER_T3550",
            Self::T3555 => "AMF_TIMER_T3555",
            Self::T3560 => "AMF_TIMER_T3560",
            Self::T3570 => "AMF_TIMER_T3570",
        }
    }
}

// ============================================================================
// Timer Configuration
// ============================================================================

/// Timer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Retransmissions before the procedure is abandoned
    pub max_count: u32,
    /// Timer duration
    pub duration: Duration,
}

impl TimerConfig {
    pub fn new(max_count: u32, duration_secs: u64) -> Self {
        Self {
            max_count,
            duration: Duration::from_secs(duration_secs),
        }
    }
}

/// AMF timer configurations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmfTimerConfigs {
    pub t3513: TimerConfig,
    pub t3522: TimerConfig,
    pub t3550: TimerConfig,
    pub t3555: TimerConfig,
    pub t3560: TimerConfig,
    pub t3570: TimerConfig,
}

impl Default for AmfTimerConfigs {
    fn default() -> Self {
        Self {
            t3513: TimerConfig::new(2, 2),
            t3522: TimerConfig::new(4, 3),
            t3550: TimerConfig::new(4, 6),
            t3555: TimerConfig::new(4, 6),
            t3560: TimerConfig::new(4, 6),
            t3570: TimerConfig::new(4, 3),
        }
    }
}

impl AmfTimerConfigs {
    /// Get timer configuration by ID
    pub fn get(&self, timer_id: AmfTimerId) -> &TimerConfig {
        match timer_id {
            AmfTimerId::T3513 => &self.t3513,
            AmfTimerId::T3522 => &self.t3522,
            AmfTimerId::T3550 => &self.t3550,
            AmfTimerId::T3555 => &self.t3555,
            AmfTimerId::T3560 => &self.t3560,
            AmfTimerId::T3570 => &self.t3570,
        }
    }
}

// ============================================================================
// Timer Manager
// ============================================================================

/// Routing information carried by a running GMM timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GmmTimerToken {
    pub amf_ue_id: u64,
    pub timer_id: AmfTimerId,
}

/// GMM timers of one event loop
pub struct TimerManager {
    /// Timer configurations
    pub configs: AmfTimerConfigs,
    wheel: TimerWheel<GmmTimerToken>,
}

impl TimerManager {
    pub fn new(configs: AmfTimerConfigs) -> Self {
        Self {
            configs,
            wheel: TimerWheel::new(),
        }
    }

    /// Start a timer for UE
    pub fn start_ue_timer(&mut self, timer_id: AmfTimerId, amf_ue_id: u64) -> TimerHandle {
        self.start_ue_timer_at(Instant::now(), timer_id, amf_ue_id)
    }

    /// Same as [`start_ue_timer`](Self::start_ue_timer) with an explicit start time
    pub fn start_ue_timer_at(
        &mut self,
        now: Instant,
        timer_id: AmfTimerId,
        amf_ue_id: u64,
    ) -> TimerHandle {
        let config = *self.configs.get(timer_id);
        let handle = self.wheel.start_at(
            now,
            config.duration,
            config.max_count,
            GmmTimerToken {
                amf_ue_id,
                timer_id,
            },
        );
        log::debug!(
            "[amf_ue_id={}] {} started ({:?} x{})",
            amf_ue_id,
            timer_id.name(),
            config.duration,
            config.max_count
        );
        handle
    }

    /// Stop a running timer. A second stop of the same handle returns `false`.
    pub fn stop(&mut self, handle: TimerHandle) -> bool {
        self.wheel.stop(handle)
    }

    pub fn is_running(&self, handle: TimerHandle) -> bool {
        self.wheel.is_running(handle)
    }

    /// Get active timer count
    pub fn active_timer_count(&self) -> usize {
        self.wheel.len()
    }

    /// Earliest pending expiry
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.wheel.next_deadline()
    }

    pub fn poll_expired(&mut self) -> Vec<TimerEvent<GmmTimerToken>> {
        self.wheel.poll_expired()
    }

    pub fn poll_expired_at(&mut self, now: Instant) -> Vec<TimerEvent<GmmTimerToken>> {
        self.wheel.poll_expired_at(now)
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new(AmfTimerConfigs::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_id_names() {
        assert_eq!(AmfTimerId::T3513.name(), "AMF_TIMER_T3513");
        assert_eq!(AmfTimerId::T3560.name(), "AMF_TIMER_T3560");
    }

    #[test]
    fn test_timer_config_default() {
        let configs = AmfTimerConfigs::default();
        assert_eq!(configs.t3513.max_count, 2);
        assert_eq!(configs.t3513.duration, Duration::from_secs(2));
        let t3560 = configs.get(AmfTimerId::T3560);
        assert_eq!(t3560.max_count, 4);
        assert_eq!(t3560.duration, Duration::from_secs(6));
    }

    #[test]
    fn test_timer_manager_start_stop() {
        let mut manager = TimerManager::default();
        let handle = manager.start_ue_timer(AmfTimerId::T3560, 100);
        assert_eq!(manager.active_timer_count(), 1);
        assert!(manager.stop(handle));
        assert!(!manager.stop(handle));
        assert_eq!(manager.active_timer_count(), 0);
    }

    #[test]
    fn test_timer_manager_expiry_routing() {
        let base = Instant::now();
        let mut manager = TimerManager::default();
        manager.start_ue_timer_at(base, AmfTimerId::T3570, 42);

        let events = manager.poll_expired_at(base + Duration::from_secs(3));
        assert_eq!(events.len(), 1);
        assert_eq!(
            *events[0].token(),
            GmmTimerToken {
                amf_ue_id: 42,
                timer_id: AmfTimerId::T3570
            }
        );
        assert!(matches!(events[0], TimerEvent::Expired { expire_times: 1, .. }));

        // 4 retries at 3s each, then exhausted on the fifth expiry
        let events = manager.poll_expired_at(base + Duration::from_secs(15));
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], TimerEvent::Exhausted { .. }));
        assert_eq!(manager.active_timer_count(), 0);
    }
}
