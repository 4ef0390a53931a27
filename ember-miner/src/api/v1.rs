//! API version 1 endpoints.

use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::device::Device;
use crate::stats::ShareSnapshot;

/// Device status information for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    /// Stable device index assigned by the compute backend
    pub id: u32,
    /// Human-readable device name
    pub name: String,
    /// Whether the device is currently mining
    pub valid: bool,
    /// Configured intensity (search-space exponent)
    pub intensity: u32,
    /// Smoothed hash rate, formatted with the family's unit
    pub rate: String,
}

/// Global statistics response.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsResponse {
    /// Share counts since process start
    pub shares: ShareSnapshot,
    /// Transactions carried by accepted blocks, coinbase excluded
    pub transactions: u64,
}

/// Shared application state for API endpoints.
#[derive(Clone, Default)]
pub struct AppState {
    /// Device registry, fixed after orchestrator setup
    devices: Arc<RwLock<Vec<Arc<Device>>>>,
    /// Latest statistics written by the status loop
    stats: Arc<RwLock<StatsResponse>>,
}

impl AppState {
    /// Create a new empty application state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the device pool once setup is complete.
    pub async fn register_devices(&self, devices: &[Arc<Device>]) {
        let mut registry = self.devices.write().await;
        *registry = devices.to_vec();
    }

    /// Publish a fresh statistics snapshot.
    pub async fn update_stats(&self, shares: ShareSnapshot, transactions: u64) {
        let mut stats = self.stats.write().await;
        *stats = StatsResponse {
            shares,
            transactions,
        };
    }

    async fn device_list(&self) -> Vec<DeviceStatus> {
        let devices = self.devices.read().await;
        devices
            .iter()
            .map(|device| DeviceStatus {
                id: device.id(),
                name: device.name().to_string(),
                valid: device.is_valid(),
                intensity: device.intensity(),
                rate: device.average_rate().format(device.family().rate_unit()),
            })
            .collect()
    }
}

/// Health check endpoint handler.
///
/// Returns a simple OK status to verify the API is running.
async fn health() -> &'static str {
    "OK"
}

/// List devices endpoint handler.
///
/// # Example
/// ```bash
/// curl http://localhost:7785/api/v1/devices
/// ```
async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceStatus>> {
    Json(state.device_list().await)
}

/// Global statistics endpoint handler.
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.stats.read().await;
    Json(*stats)
}

/// Build the v1 API routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/stats", get(stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DeviceDescriptor;
    use crate::pow::PowFamily;

    #[tokio::test]
    async fn test_state_reflects_registered_devices() {
        let state = AppState::new();
        assert!(state.device_list().await.is_empty());

        let device = Device::new(
            DeviceDescriptor {
                index: 3,
                name: "cpu-3".into(),
            },
            PowFamily::Blake2bD,
            20,
            256,
        );
        state.register_devices(&[device]).await;

        let list = state.device_list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, 3);
        assert_eq!(list[0].name, "cpu-3");
        assert!(!list[0].valid);
        assert_eq!(list[0].intensity, 20);
    }

    #[tokio::test]
    async fn test_stats_update_is_visible() {
        let state = AppState::new();
        let snapshot = ShareSnapshot {
            accepted: 5,
            rejected: 1,
            stale: 2,
        };
        state.update_stats(snapshot, 12).await;

        let stats = state.stats.read().await;
        assert_eq!(stats.shares, snapshot);
        assert_eq!(stats.transactions, 12);
    }
}
