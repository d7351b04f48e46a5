//! The data-ID manifest.
//!
//! The manifest is the static agreement between boards about what each data
//! ID carries: how many elements, and of which type.  By convention a board's
//! commands start at its base ID, telemetry at base + 100 and errors at
//! base + 200.
//!
//! The codec and the dispatch runtime only need [`Manifest::lookup`]; the
//! concrete table is [`StaticManifest`], which ships with a built-in set of
//! entries and can be extended (for example from the node config file).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::endpoint::Endpoint;
use crate::protocol::packet::Packet;
use crate::protocol::types::ElementType;

/// What one data ID carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub data_id: u16,
    pub element_count: u16,
    pub element_type: ElementType,
}

impl ManifestEntry {
    pub const fn new(data_id: u16, element_count: u16, element_type: ElementType) -> Self {
        Self {
            data_id,
            element_count,
            element_type,
        }
    }

    /// Returns `true` if `packet` has the declared element type and count.
    pub fn matches(&self, packet: &Packet) -> bool {
        packet.element_type() == self.element_type && packet.element_count() == self.element_count
    }
}

/// Read-only access to a manifest.
pub trait Manifest: Send + Sync {
    /// Returns the entry for `data_id`, or `None` if the ID is not declared.
    fn lookup(&self, data_id: u16) -> Option<ManifestEntry>;
}

/// A board and its fixed address on the rover network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub name: &'static str,
    pub octets: [u8; 4],
}

impl Board {
    /// The board's endpoint on `port`.
    pub fn endpoint(&self, port: u16) -> Endpoint {
        Endpoint::new(self.octets, port)
    }
}

/// Fixed board addresses.
pub const BOARDS: &[Board] = &[
    Board { name: "BMS", octets: [192, 168, 2, 100] },
    Board { name: "Power", octets: [192, 168, 2, 101] },
    Board { name: "Blackbox", octets: [192, 168, 2, 102] },
    Board { name: "Drive", octets: [192, 168, 2, 103] },
    Board { name: "Nav", octets: [192, 168, 2, 104] },
    Board { name: "Multimedia", octets: [192, 168, 2, 105] },
    Board { name: "Gimbal", octets: [192, 168, 2, 106] },
    Board { name: "Arm", octets: [192, 168, 2, 107] },
    Board { name: "ScienceActuation", octets: [192, 168, 2, 108] },
    Board { name: "Heater", octets: [192, 168, 2, 109] },
    Board { name: "Core", octets: [192, 168, 2, 110] },
    Board { name: "Autonomy", octets: [192, 168, 3, 100] },
    Board { name: "ScienceSensors", octets: [192, 168, 3, 101] },
    Board { name: "SignalStack", octets: [192, 168, 3, 102] },
    Board { name: "Camera1", octets: [192, 168, 4, 100] },
    Board { name: "Camera2", octets: [192, 168, 4, 101] },
];

/// Looks up a board by name, ignoring ASCII case.
pub fn board(name: &str) -> Option<&'static Board> {
    BOARDS.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

// BMS: commands at 2000, telemetry at 2100, errors at 2200.
const BUILTIN_ENTRIES: &[ManifestEntry] = &[
    ManifestEntry::new(2000, 1, ElementType::UInt8),
    ManifestEntry::new(2100, 1, ElementType::Float32),
    ManifestEntry::new(2101, 1, ElementType::Float32),
    ManifestEntry::new(2102, 8, ElementType::Float32),
    ManifestEntry::new(2103, 8, ElementType::Float32),
    ManifestEntry::new(2200, 1, ElementType::UInt8),
    ManifestEntry::new(2201, 1, ElementType::UInt8),
    ManifestEntry::new(2202, 8, ElementType::UInt8),
    ManifestEntry::new(2203, 8, ElementType::UInt8),
];

/// In-memory manifest backed by an ordered map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticManifest {
    entries: BTreeMap<u16, ManifestEntry>,
}

impl StaticManifest {
    /// A manifest with no entries.  Every lookup falls back to the header.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let mut manifest = Self::empty();
        manifest.extend(BUILTIN_ENTRIES.iter().copied());
        manifest
    }

    /// Adds or replaces one entry.  Returns the entry it replaced, if any.
    pub fn insert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.data_id, entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }
}

impl Extend<ManifestEntry> for StaticManifest {
    fn extend<I: IntoIterator<Item = ManifestEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl Manifest for StaticManifest {
    fn lookup(&self, data_id: u16) -> Option<ManifestEntry> {
        self.entries.get(&data_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_known_ids() {
        let manifest = StaticManifest::builtin();

        assert_eq!(
            manifest.lookup(2102),
            Some(ManifestEntry::new(2102, 8, ElementType::Float32))
        );
        assert_eq!(manifest.lookup(2000).map(|e| e.element_type), Some(ElementType::UInt8));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        assert_eq!(StaticManifest::builtin().lookup(7777), None);
        assert_eq!(StaticManifest::empty().lookup(2000), None);
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        // Arrange
        let mut manifest = StaticManifest::builtin();
        let before = manifest.len();

        // Act
        let replaced = manifest.insert(ManifestEntry::new(2000, 2, ElementType::UInt16));

        // Assert
        assert_eq!(replaced, Some(ManifestEntry::new(2000, 1, ElementType::UInt8)));
        assert_eq!(manifest.len(), before);
        assert_eq!(manifest.lookup(2000).map(|e| e.element_count), Some(2));
    }

    #[test]
    fn test_entry_matches_packet_shape() {
        let entry = ManifestEntry::new(2100, 1, ElementType::Float32);

        let good = Packet::new(2100, ElementType::Float32, &[12.5f32]).unwrap();
        let wrong_count = Packet::new(2100, ElementType::Float32, &[1.0f32, 2.0]).unwrap();

        assert!(entry.matches(&good));
        assert!(!entry.matches(&wrong_count));
    }

    #[test]
    fn test_board_lookup_is_case_insensitive() {
        let drive = board("drive").expect("drive board");

        assert_eq!(drive.endpoint(11000).to_string(), "192.168.2.103:11000");
        assert!(board("Toaster").is_none());
    }
}
