//! BLE client for the mesh node console via Nordic UART Service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// Nordic UART Service UUIDs
const NUS_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e); // Write to device
const NUS_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e); // Notify from device

/// Console connection to one mesh node.
pub struct BleClient {
    name: String,
    peripheral: Peripheral,
    tx_char: Characteristic,
    /// Notification bytes not yet consumed as lines
    console_buffer: Arc<Mutex<Vec<u8>>>,
}

impl BleClient {
    /// Scan for a device by name and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid, what: &str| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| anyhow!("NUS {} characteristic not found", what))
        };
        // RX is unused here but required of a NUS console
        find(NUS_RX_UUID, "RX")?;
        let tx_char = find(NUS_TX_UUID, "TX")?;

        peripheral.subscribe(&tx_char).await?;

        let console_buffer = Arc::new(Mutex::new(Vec::new()));

        let buffer_clone = console_buffer.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == NUS_TX_UUID {
                    buffer_clone.lock().await.extend_from_slice(&data.value);
                }
            }
        });

        Ok(Self {
            name: name.to_string(),
            peripheral,
            tx_char,
            console_buffer,
        })
    }

    async fn find_device_by_name(adapter: &Adapter, name: &str, scan_timeout: Duration) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            for peripheral in adapter.peripherals().await? {
                if let Some(props) = peripheral.properties().await? {
                    if props.local_name.as_deref() == Some(name) {
                        return Ok(peripheral);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next complete console line.
    ///
    /// Returns `None` if no full line arrived within `line_timeout`.
    pub async fn read_line(&self, line_timeout: Duration) -> Option<String> {
        timeout(line_timeout, async {
            loop {
                let mut buf = self.console_buffer.lock().await;
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    return String::from_utf8_lossy(&line).trim_end().to_string();
                }
                drop(buf);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .ok()
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.tx_char).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
