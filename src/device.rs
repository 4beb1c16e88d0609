//! Device identity and the messages the device exchanges over the relay.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::bus::{Event, EventSender, PublishOutcome};
use crate::error::TetherError;

/// Fixed tail of every device UUID; the first six bytes are the hardware id.
const IDENTITY_SUFFIX: [u8; 10] = [0x40, 0xb4, 0xb3, 0x36, 0x8a, 0x36, 0xf8, 0x79, 0x11, 0x1e];

/// Stable device identity derived from a six-byte hardware identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentity(Uuid);

impl DeviceIdentity {
    /// ```
    /// use tether::device::DeviceIdentity;
    ///
    /// let id = DeviceIdentity::from_hardware_id([0x24, 0x0a, 0xc4, 0x12, 0x34, 0x56]);
    /// assert_eq!(id.to_string(), "240ac412-3456-40b4-b336-8a36f879111e");
    /// ```
    pub fn from_hardware_id(hardware_id: [u8; 6]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..6].copy_from_slice(&hardware_id);
        bytes[6..].copy_from_slice(&IDENTITY_SUFFIX);
        Self(Uuid::from_bytes(bytes))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Parse `aa:bb:cc:dd:ee:ff`, `aa-bb-…` or `aabbccddeeff`.
pub fn parse_hardware_id(value: &str) -> Result<[u8; 6], TetherError> {
    let hex: String = value
        .trim()
        .chars()
        .filter(|ch| *ch != ':' && *ch != '-')
        .collect();
    if hex.len() != 12 || !hex.is_ascii() {
        return Err(TetherError::Configuration(format!(
            "hardware id must be 6 bytes, got {value:?}"
        )));
    }
    let mut out = [0u8; 6];
    for (index, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).map_err(|_| {
            TetherError::Configuration(format!("hardware id is not hex: {value:?}"))
        })?;
    }
    Ok(out)
}

/// Read the MAC address of a network interface from sysfs.
pub fn read_interface_hardware_id(interface: &str) -> Result<[u8; 6], TetherError> {
    let path = Path::new("/sys/class/net").join(interface).join("address");
    let raw = std::fs::read_to_string(&path)?;
    parse_hardware_id(&raw)
}

/// Name and version of the running image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppVersion {
    pub name: &'static str,
    pub version: &'static str,
}

pub fn app_version() -> AppVersion {
    AppVersion {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Cloud message types, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Hello = 0,
    GetValue = 1,
    GetDevices = 2,
    Notification = 3,
    DeviceConnected = 4,
    DeviceDisconnected = 5,
    ValueUpdated = 6,
    SetValue = 7,
    GetDevice = 8,
    DeviceListChanged = 9,
    Error = 10,
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Reply to a relay request: `{"resId": …, "res": …}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceResponse {
    #[serde(rename = "resId")]
    pub res_id: u32,
    pub res: Value,
}

impl DeviceResponse {
    pub fn new(res_id: u32, res: Value) -> Self {
        Self { res_id, res }
    }

    pub fn to_json(&self) -> Result<String, TetherError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Value-changed notification pushed by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChanged {
    pub device_uuid: String,
    pub variable_uuid: String,
    pub value: Value,
}

impl ValueChanged {
    pub fn to_value(&self) -> Value {
        json!({
            "type": MessageType::ValueUpdated.code(),
            "args": {
                "deviceUuid": self.device_uuid,
                "variableUuid": self.variable_uuid,
                "value": self.value,
            }
        })
    }

    pub fn to_json(&self) -> Result<String, TetherError> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

/// Add a variable description under `variable_uuid` to a device listing.
pub fn describe_variable(
    vars: &mut Map<String, Value>,
    variable_uuid: &str,
    name: &str,
    access: &str,
    schema: Value,
    value: Value,
) {
    vars.insert(
        variable_uuid.to_string(),
        json!({
            "name": name,
            "access": access,
            "schema": schema,
            "value": value,
        }),
    );
}

/// The device's own request/command handler.
///
/// Receives relay payloads unmodified, in the orchestrator's context. A
/// returned response is sent back over the relay.
pub trait DeviceHandler: Send + Sync {
    fn handle(&self, payload: &str) -> Option<DeviceResponse>;
}

/// Handler that only logs what arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl DeviceHandler for LogHandler {
    fn handle(&self, payload: &str) -> Option<DeviceResponse> {
        tracing::info!(bytes = payload.len(), payload = %payload, "relay message");
        None
    }
}

/// Publishes device-originated notifications onto the bus.
#[derive(Clone)]
pub struct Notifier {
    events: EventSender,
}

impl Notifier {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub async fn value_changed(
        &self,
        device_uuid: &str,
        variable_uuid: &str,
        value: Value,
    ) -> Result<PublishOutcome, TetherError> {
        let notification = ValueChanged {
            device_uuid: device_uuid.to_string(),
            variable_uuid: variable_uuid.to_string(),
            value,
        };
        let payload = notification.to_json()?;
        Ok(self
            .events
            .publish(Event::OutboundValueChanged(payload))
            .await)
    }
}
