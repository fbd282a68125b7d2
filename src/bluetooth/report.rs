// Inspection reports for connected peripherals

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared GATT characteristic properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
}

impl fmt::Display for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.broadcast, "broadcast"),
            (self.read, "read"),
            (self.write_without_response, "writeWithoutResponse"),
            (self.write, "write"),
            (self.notify, "notify"),
            (self.indicate, "indicate"),
            (self.authenticated_signed_writes, "authenticatedSignedWrites"),
            (self.extended_properties, "extendedProperties"),
        ];
        let names: Vec<&str> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub properties: CharacteristicProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    #[serde(flatten)]
    pub service: ServiceInfo,
    pub characteristics: Vec<CharacteristicInfo>,
    /// Set when characteristic discovery failed for this service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub peripheral: String,
    pub inspected_at: DateTime<Utc>,
    pub services: Vec<ServiceReport>,
}

impl InspectionReport {
    pub fn new(peripheral: impl Into<String>) -> Self {
        InspectionReport {
            peripheral: peripheral.into(),
            inspected_at: Utc::now(),
            services: Vec::new(),
        }
    }

    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }
}

fn write_named(f: &mut fmt::Formatter<'_>, uuid: &Uuid, name: &Option<String>) -> fmt::Result {
    write!(f, "{uuid}")?;
    if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
        write!(f, " ({name})")?;
    }
    Ok(())
}

impl fmt::Display for InspectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ---", self.peripheral)?;
        for report in &self.services {
            f.write_str("Service: ")?;
            write_named(f, &report.service.uuid, &report.service.name)?;
            writeln!(f)?;
            if let Some(error) = &report.error {
                writeln!(f, "  characteristics unavailable: {error}")?;
            }
            for c in &report.characteristics {
                f.write_str("  Characteristic  ")?;
                write_named(f, &c.uuid, &c.name)?;
                writeln!(f)?;
                writeln!(f, "    properties    {}", c.properties)?;
            }
        }
        f.write_str("----------------")
    }
}
