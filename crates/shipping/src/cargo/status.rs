use serde::{Deserialize, Serialize};

/// Where a cargo is in its voyage.
///
/// ```text
/// Docked ──► InTransit ──► Arrived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CargoStatus {
    #[default]
    Docked,
    InTransit,
    Arrived,
}

impl CargoStatus {
    /// Shipments can only be loaded or unloaded at the dock.
    pub fn can_modify_shipments(&self) -> bool {
        matches!(self, CargoStatus::Docked)
    }

    pub fn can_depart(&self) -> bool {
        matches!(self, CargoStatus::Docked)
    }

    pub fn can_arrive(&self) -> bool {
        matches!(self, CargoStatus::InTransit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CargoStatus::Docked => "Docked",
            CargoStatus::InTransit => "InTransit",
            CargoStatus::Arrived => "Arrived",
        }
    }
}

impl std::fmt::Display for CargoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
