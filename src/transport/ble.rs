// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bluetooth LE link over the Nordic UART service.

use std::time::Duration;

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::{Uuid, uuid};

use crate::error::TransportError;

use super::{LinkEvent, Transport};

/// Nordic UART service.
pub const NUS_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");
/// Characteristic frames are written to.
pub const NUS_TX_CHARACTERISTIC: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");
/// Characteristic pages are notified on.
pub const NUS_RX_CHARACTERISTIC: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// How to find the control head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleConfig {
    /// Advertised name or platform address of the control head.
    pub device: String,
    /// How long to scan before looking for the device.
    #[serde(with = "crate::config::millis", rename = "scan_duration_ms")]
    pub scan_duration: Duration,
    /// How long the connection attempt may take.
    #[serde(with = "crate::config::millis", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
}

impl BleConfig {
    /// Creates a configuration for a device name or address.
    #[must_use]
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            scan_duration: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// `btleplug` implementation of [`Transport`].
pub struct BleTransport {
    config: BleConfig,
    events: mpsc::Sender<LinkEvent>,
    peripheral: Option<Peripheral>,
    tx_char: Option<Characteristic>,
    notification_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("device", &self.config.device)
            .field("connected", &self.peripheral.is_some())
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Creates a transport that reports link events on `events`.
    #[must_use]
    pub fn new(config: BleConfig, events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            config,
            events,
            peripheral: None,
            tx_char: None,
            notification_task: None,
        }
    }

    async fn find_peripheral(&self, adapter: &Adapter) -> Result<Peripheral, TransportError> {
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| failed(format!("failed to list peripherals: {e}")))?;

        for peripheral in peripherals {
            if let Ok(Some(props)) = peripheral.properties().await {
                let name = props.local_name.unwrap_or_default();
                if name == self.config.device || peripheral.id().to_string() == self.config.device {
                    return Ok(peripheral);
                }
            }
        }
        Err(failed(format!("device '{}' not found", self.config.device)))
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| failed(format!("failed to create manager: {e}")))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| failed(format!("failed to list adapters: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| failed("no Bluetooth adapter found".to_string()))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![NUS_SERVICE],
            })
            .await
            .map_err(|e| failed(format!("failed to start scan: {e}")))?;
        tokio::time::sleep(self.config.scan_duration).await;
        let peripheral = self.find_peripheral(&adapter).await;
        if let Err(e) = adapter.stop_scan().await {
            tracing::debug!(error = %e, "Failed to stop scan");
        }
        let peripheral = peripheral?;

        tokio::time::timeout(self.config.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| failed("connection timeout".to_string()))?
            .map_err(|e| failed(format!("failed to connect: {e}")))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| failed(format!("failed to discover services: {e}")))?;
        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid, role: &str| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| failed(format!("{role} characteristic not found")))
        };
        let tx_char = find(NUS_TX_CHARACTERISTIC, "TX")?;
        let rx_char = find(NUS_RX_CHARACTERISTIC, "RX")?;

        peripheral
            .subscribe(&rx_char)
            .await
            .map_err(|e| failed(format!("failed to subscribe: {e}")))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| failed(format!("failed to open notifications: {e}")))?;

        let events = self.events.clone();
        self.notification_task = Some(tokio::spawn(async move {
            while let Some(data) = notifications.next().await {
                if data.uuid != NUS_RX_CHARACTERISTIC {
                    continue;
                }
                if events.send(LinkEvent::Received(Bytes::from(data.value))).await.is_err() {
                    return;
                }
            }
            tracing::debug!("Notification stream ended");
            let _ = events.send(LinkEvent::Disconnected).await;
        }));

        self.peripheral = Some(peripheral);
        self.tx_char = Some(tx_char);
        self.events
            .send(LinkEvent::Connected)
            .await
            .map_err(|_| failed("link event receiver dropped".to_string()))?;
        tracing::info!(device = %self.config.device, "BLE link up");
        Ok(())
    }

    fn teardown(&mut self) -> Option<Peripheral> {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }
        self.tx_char = None;
        self.peripheral.take()
    }
}

impl Transport for BleTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if let Some(stale) = self.teardown() {
            let _ = stale.disconnect().await;
        }
        let result = self.open().await;
        if result.is_err() {
            self.teardown();
        }
        result
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let (Some(peripheral), Some(tx_char)) = (self.peripheral.as_ref(), self.tx_char.as_ref()) else {
            return Err(TransportError::NotConnected);
        };
        peripheral
            .write(tx_char, &frame, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(peripheral) = self.teardown() else {
            return Ok(());
        };
        peripheral
            .disconnect()
            .await
            .map_err(|e| failed(format!("failed to disconnect: {e}")))?;
        let _ = self.events.send(LinkEvent::Disconnected).await;
        Ok(())
    }
}

fn failed(message: String) -> TransportError {
    TransportError::ConnectionFailed(message)
}
