//! Plug polling coordinator
//!
//! Runs in a background tokio task, one per registered account. Every 30
//! seconds it fetches the SWITCH device listing through a [`DeviceSource`],
//! filters it down to plug devices, and replaces the published snapshot.
//! A failed poll keeps the previous snapshot and records the error; the
//! next attempt happens on the regular cadence, no backoff.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{self, Duration};

use crate::error::EzvizError;
use crate::ezviz::client::DeviceInfosResponse;
use crate::models::{PlugDevice, PlugSnapshot};

/// Fixed refresh cadence for every account.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before the first poll after an entry starts.
const INITIAL_POLL_DELAY: Duration = Duration::from_secs(5);

/// Serials of this prefix denote the plug device class.
const PLUG_SERIAL_PREFIX: &str = "Q";

/// Sub-feature type code carrying the outlet on/off state.
const OUTLET_FEATURE_TYPE: i32 = 14;

/// Source of vendor device listings. The Ezviz client implements this; tests
/// substitute fixtures.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn device_infos(&self, filter_type: &str) -> Result<DeviceInfosResponse, EzvizError>;
}

/// Periodic snapshot refresher for one account.
pub struct PlugCoordinator {
    source: Arc<dyn DeviceSource>,
    api_timeout: Duration,
    snapshot: RwLock<PlugSnapshot>,
    /// Serializes interval ticks with manual refresh calls.
    poll_lock: Mutex<()>,
}

impl PlugCoordinator {
    pub fn new(source: Arc<dyn DeviceSource>, api_timeout: Duration) -> Self {
        Self {
            source,
            api_timeout,
            snapshot: RwLock::new(PlugSnapshot::default()),
            poll_lock: Mutex::new(()),
        }
    }

    /// Last published snapshot.
    pub async fn snapshot(&self) -> PlugSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Start the poll loop (runs until the owning task is aborted)
    pub async fn start(self: Arc<Self>, account_id: String) {
        tracing::info!(
            "[PlugSync] Starting poll loop for account {} (interval: {}s)",
            account_id,
            POLL_INTERVAL.as_secs()
        );

        time::sleep(INITIAL_POLL_DELAY).await;

        loop {
            if let Err(e) = self.poll_once().await {
                tracing::warn!("[PlugSync] Account {} poll failed: {}", account_id, e);
            }

            time::sleep(POLL_INTERVAL).await;
        }
    }

    /// One poll: timeout-bounded fetch, filter, snapshot replacement.
    ///
    /// Used by both the interval loop and the manual refresh endpoint.
    pub async fn poll_once(&self) -> Result<(), EzvizError> {
        let _guard = self.poll_lock.lock().await;

        let result = match time::timeout(self.api_timeout, self.source.device_infos("SWITCH")).await
        {
            Ok(result) => result,
            Err(_) => Err(EzvizError::Timeout(self.api_timeout.as_secs())),
        };

        match result {
            Ok(response) => {
                let plugs = plug_map(response);

                let mut snapshot = self.snapshot.write().await;
                snapshot.plugs = plugs;
                snapshot.last_updated = Some(Utc::now());
                snapshot.last_error = None;
                Ok(())
            }
            Err(e) => {
                let message = match &e {
                    EzvizError::Timeout(_) => e.to_string(),
                    _ => format!("Invalid response from API: {}", e),
                };

                let mut snapshot = self.snapshot.write().await;
                snapshot.last_error = Some(message);
                Err(e)
            }
        }
    }
}

/// Build the serial → plug mapping from one SWITCH listing.
///
/// A sub-feature with the outlet type code contributes its `enable` flag;
/// a device without one keeps whatever the listing delivered. Only serials
/// with the plug prefix are retained.
fn plug_map(response: DeviceInfosResponse) -> HashMap<String, PlugDevice> {
    let mut plugs = HashMap::new();

    for device in response.device_infos {
        let mut enable = None;

        if let Some(features) = response.switch.get(&device.device_serial) {
            for feature in features {
                if feature.feature_type == OUTLET_FEATURE_TYPE {
                    enable = Some(feature.enable);
                }
            }
        }

        if device.device_serial.starts_with(PLUG_SERIAL_PREFIX) {
            plugs.insert(
                device.device_serial.clone(),
                PlugDevice {
                    serial: device.device_serial,
                    enable,
                    info: device.extra,
                },
            );
        }
    }

    plugs
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn fixture(switch_type: i32) -> DeviceInfosResponse {
        serde_json::from_value(serde_json::json!({
            "deviceInfos": [
                {"deviceSerial": "Q1", "name": "Garage plug"},
                {"deviceSerial": "A1", "name": "Camera"}
            ],
            "SWITCH": {
                "Q1": [{"type": switch_type, "enable": true}]
            }
        }))
        .unwrap()
    }

    struct StaticSource {
        response: DeviceInfosResponse,
    }

    #[async_trait]
    impl DeviceSource for StaticSource {
        async fn device_infos(&self, _filter: &str) -> Result<DeviceInfosResponse, EzvizError> {
            Ok(self.response.clone())
        }
    }

    /// Succeeds on the first call, hangs on every later one.
    struct HangAfterFirst {
        response: DeviceInfosResponse,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeviceSource for HangAfterFirst {
        async fn device_infos(&self, _filter: &str) -> Result<DeviceInfosResponse, EzvizError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(self.response.clone())
            } else {
                time::sleep(Duration::from_secs(60)).await;
                unreachable!("poll timeout should have fired")
            }
        }
    }

    #[test]
    fn test_plug_map_filters_serial_prefix_and_outlet_type() {
        let plugs = plug_map(fixture(14));

        assert_eq!(plugs.len(), 1);
        let plug = &plugs["Q1"];
        assert_eq!(plug.serial, "Q1");
        assert_eq!(plug.enable, Some(true));
        assert!(!plugs.contains_key("A1"));
    }

    #[test]
    fn test_plug_map_ignores_other_feature_types() {
        let plugs = plug_map(fixture(5));

        assert_eq!(plugs.len(), 1);
        assert_eq!(plugs["Q1"].enable, None);
    }

    #[test]
    fn test_plug_map_without_switch_entry() {
        let response: DeviceInfosResponse = serde_json::from_value(serde_json::json!({
            "deviceInfos": [{"deviceSerial": "Q9"}]
        }))
        .unwrap();

        let plugs = plug_map(response);
        assert_eq!(plugs["Q9"].enable, None);
    }

    #[tokio::test]
    async fn test_poll_publishes_snapshot() {
        let source = Arc::new(StaticSource {
            response: fixture(14),
        });
        let coordinator = PlugCoordinator::new(source, Duration::from_secs(5));

        coordinator.poll_once().await.unwrap();

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.plugs.len(), 1);
        assert_eq!(snapshot.plugs["Q1"].enable, Some(true));
        assert!(snapshot.last_updated.is_some());
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_poll_is_idempotent_for_unchanged_source() {
        let source = Arc::new(StaticSource {
            response: fixture(14),
        });
        let coordinator = PlugCoordinator::new(source, Duration::from_secs(5));

        coordinator.poll_once().await.unwrap();
        let first = coordinator.snapshot().await;

        coordinator.poll_once().await.unwrap();
        let second = coordinator.snapshot().await;

        assert_eq!(first.plugs, second.plugs);
    }

    #[tokio::test]
    async fn test_poll_timeout_keeps_previous_snapshot() {
        let source = Arc::new(HangAfterFirst {
            response: fixture(14),
            calls: AtomicUsize::new(0),
        });
        let coordinator = PlugCoordinator::new(source, Duration::from_millis(50));

        coordinator.poll_once().await.unwrap();
        let before = coordinator.snapshot().await;

        let err = coordinator.poll_once().await.unwrap_err();
        assert!(matches!(err, EzvizError::Timeout(_)));

        let after = coordinator.snapshot().await;
        assert_eq!(after.plugs, before.plugs);
        assert_eq!(after.last_updated, before.last_updated);
        assert!(after.last_error.is_some());
    }

    #[tokio::test]
    async fn test_failed_poll_records_api_error() {
        struct FailingSource;

        #[async_trait]
        impl DeviceSource for FailingSource {
            async fn device_infos(
                &self,
                _filter: &str,
            ) -> Result<DeviceInfosResponse, EzvizError> {
                Err(EzvizError::Api("server said no".to_string()))
            }
        }

        let coordinator = PlugCoordinator::new(Arc::new(FailingSource), Duration::from_secs(5));

        coordinator.poll_once().await.unwrap_err();

        let snapshot = coordinator.snapshot().await;
        assert!(snapshot.plugs.is_empty());
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("Invalid response from API: Ezviz API error: server said no")
        );
    }
}
