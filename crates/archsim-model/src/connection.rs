//! Connections between components and the traffic classes they carry

use crate::component::ComponentId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Traffic a connection accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    /// Reads only
    Read,
    /// Writes only
    Write,
    /// Both classes
    #[default]
    #[serde(alias = "readwrite", alias = "both")]
    ReadWrite,
}

impl TrafficType {
    /// Whether requests of `class` may traverse a connection of this type
    #[inline]
    #[must_use]
    pub const fn carries(self, class: TrafficClass) -> bool {
        matches!(
            (self, class),
            (Self::ReadWrite, _) | (Self::Read, TrafficClass::Read) | (Self::Write, TrafficClass::Write)
        )
    }
}

/// Class of a simulated request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    /// Read request
    Read,
    /// Write request
    Write,
}

impl TrafficClass {
    /// Both classes, reads first
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl Display for TrafficClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed connection between two components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Upstream component
    pub from: ComponentId,
    /// Downstream component
    pub to: ComponentId,
    /// Classes carried
    #[serde(default)]
    pub traffic_type: TrafficType,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Connection {
    /// Create a connection
    #[must_use]
    pub fn new(from: impl Into<ComponentId>, to: impl Into<ComponentId>, traffic_type: TrafficType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            traffic_type,
            label: None,
        }
    }

    /// Connection carrying both classes
    #[must_use]
    pub fn read_write(from: impl Into<ComponentId>, to: impl Into<ComponentId>) -> Self {
        Self::new(from, to, TrafficType::ReadWrite)
    }

    /// Attach a display label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_carries_both_classes() {
        assert!(TrafficType::ReadWrite.carries(TrafficClass::Read));
        assert!(TrafficType::ReadWrite.carries(TrafficClass::Write));
        assert!(TrafficType::Read.carries(TrafficClass::Read));
        assert!(!TrafficType::Read.carries(TrafficClass::Write));
        assert!(!TrafficType::Write.carries(TrafficClass::Read));
    }

    #[test]
    fn traffic_type_defaults_to_read_write() {
        let connection: Connection =
            serde_json::from_str(r#"{ "from": "a", "to": "b" }"#).unwrap();
        assert_eq!(connection.traffic_type, TrafficType::ReadWrite);

        let connection: Connection =
            serde_json::from_str(r#"{ "from": "a", "to": "b", "trafficType": "write" }"#).unwrap();
        assert_eq!(connection.traffic_type, TrafficType::Write);
    }
}
