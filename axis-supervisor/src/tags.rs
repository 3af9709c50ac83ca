use std::fmt;

use thiserror::Error;

use crate::bus::LogicalAddress;

/// Identifier for one of the five supervised coil points.
///
/// The discriminants double as indices into [`TagRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagId {
    /// Selector switch in auto position (input).
    SelectorAuto,
    /// Selector switch in hand position (input).
    SelectorHand,
    /// Emergency stop (input).
    EStop,
    /// Stepper motor step pulse (output).
    MotorPulse,
    /// Stepper motor direction bit (output, read back every cycle).
    MotorDirection,
}

impl TagId {
    /// All tags in registry order.
    pub const ALL: [TagId; 5] = [
        TagId::SelectorAuto,
        TagId::SelectorHand,
        TagId::EStop,
        TagId::MotorPulse,
        TagId::MotorDirection,
    ];

    /// Human-readable name, for diagnostics only.
    pub const fn name(self) -> &'static str {
        match self {
            TagId::SelectorAuto => "selector switch in auto",
            TagId::SelectorHand => "selector switch in hand",
            TagId::EStop => "e-stop",
            TagId::MotorPulse => "motor pulse",
            TagId::MotorDirection => "motor direction",
        }
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named boolean I/O point.
///
/// `value` is unset until the point is first read from (inputs) or written
/// to (outputs); afterwards it is overwritten every cycle.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Which point this is.
    pub id: TagId,
    /// Logical (1-based) coil number, immutable for the tag's lifetime.
    pub address: LogicalAddress,
    /// Last observed or last commanded value.
    pub value: Option<bool>,
}

/// Coil map validation errors. Configuration mistakes, fatal at startup.
#[derive(Debug, Error)]
pub enum AddressConflictError {
    /// Two differently named tags alias one physical coil.
    #[error("tags '{first}' and '{second}' both map to coil {address}")]
    DuplicateAddress {
        /// First tag claiming the coil.
        first: TagId,
        /// Second tag claiming the coil.
        second: TagId,
        /// The contested coil number.
        address: LogicalAddress,
    },

    /// The selector inputs must occupy consecutive addresses so the control
    /// loop can fetch them in a single batched read.
    #[error("selector block not contiguous: '{tag}' at coil {address}, expected {expected}")]
    NonContiguousSelectorBlock {
        /// The misplaced selector tag.
        tag: TagId,
        /// Its configured address.
        address: LogicalAddress,
        /// The address the batch read requires.
        expected: LogicalAddress,
    },

    /// Logical coil numbers start at 1.
    #[error("tag '{tag}' has invalid logical address 0")]
    ZeroAddress {
        /// The offending tag.
        tag: TagId,
    },
}

/// Logical (1-based) addresses of the five supervised coils.
///
/// The three selector inputs must be consecutive (`selector_auto`,
/// `selector_auto + 1`, `selector_auto + 2`); [`TagRegistry::new`] rejects
/// any map where they are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoilMap {
    /// Selector switch in auto position.
    pub selector_auto: LogicalAddress,
    /// Selector switch in hand position.
    pub selector_hand: LogicalAddress,
    /// Emergency stop.
    pub e_stop: LogicalAddress,
    /// Stepper motor step pulse.
    pub motor_pulse: LogicalAddress,
    /// Stepper motor direction bit.
    pub motor_direction: LogicalAddress,
}

impl Default for CoilMap {
    /// Address map of the reference Click PLC installation.
    fn default() -> Self {
        Self {
            selector_auto: 16385,
            selector_hand: 16386,
            e_stop: 16387,
            motor_pulse: 16390,
            motor_direction: 16391,
        }
    }
}

impl CoilMap {
    /// Logical address of the given tag.
    pub const fn address_of(&self, id: TagId) -> LogicalAddress {
        match id {
            TagId::SelectorAuto => self.selector_auto,
            TagId::SelectorHand => self.selector_hand,
            TagId::EStop => self.e_stop,
            TagId::MotorPulse => self.motor_pulse,
            TagId::MotorDirection => self.motor_direction,
        }
    }
}

/// Flat lookup of the five tags and their last-observed values.
///
/// Exists so the control loop never handles raw coil numbers directly, and
/// so the address invariants are enforced once, at construction.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    tags: [Tag; 5],
}

impl TagRegistry {
    /// Build the registry, rejecting aliased or non-batchable address maps.
    pub fn new(map: &CoilMap) -> Result<Self, AddressConflictError> {
        for id in TagId::ALL {
            if map.address_of(id) == 0 {
                return Err(AddressConflictError::ZeroAddress { tag: id });
            }
        }

        for (i, &first) in TagId::ALL.iter().enumerate() {
            for &second in &TagId::ALL[i + 1..] {
                if map.address_of(first) == map.address_of(second) {
                    return Err(AddressConflictError::DuplicateAddress {
                        first,
                        second,
                        address: map.address_of(first),
                    });
                }
            }
        }

        // The batched 3-coil read starts at the auto selector.
        for (tag, offset) in [(TagId::SelectorHand, 1), (TagId::EStop, 2)] {
            let expected = map.selector_auto.checked_add(offset);
            if expected != Some(map.address_of(tag)) {
                return Err(AddressConflictError::NonContiguousSelectorBlock {
                    tag,
                    address: map.address_of(tag),
                    expected: expected.unwrap_or(LogicalAddress::MAX),
                });
            }
        }

        Ok(Self {
            tags: TagId::ALL.map(|id| Tag {
                id,
                address: map.address_of(id),
                value: None,
            }),
        })
    }

    /// Look up a tag.
    pub fn get(&self, id: TagId) -> &Tag {
        &self.tags[id as usize]
    }

    /// Record a freshly read or freshly commanded value.
    pub fn update(&mut self, id: TagId, value: bool) {
        self.tags[id as usize].value = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_validates() {
        let registry = TagRegistry::new(&CoilMap::default()).unwrap();
        assert_eq!(registry.get(TagId::SelectorAuto).address, 16385);
        assert_eq!(registry.get(TagId::MotorDirection).address, 16391);
        assert_eq!(registry.get(TagId::EStop).value, None);
    }

    #[test]
    fn duplicate_address_rejected() {
        let map = CoilMap {
            motor_pulse: 16391,
            ..CoilMap::default()
        };
        let err = TagRegistry::new(&map).unwrap_err();
        assert!(matches!(
            err,
            AddressConflictError::DuplicateAddress {
                first: TagId::MotorPulse,
                second: TagId::MotorDirection,
                address: 16391,
            }
        ));
    }

    #[test]
    fn non_contiguous_selector_block_rejected() {
        let map = CoilMap {
            e_stop: 16388,
            ..CoilMap::default()
        };
        let err = TagRegistry::new(&map).unwrap_err();
        assert!(matches!(
            err,
            AddressConflictError::NonContiguousSelectorBlock {
                tag: TagId::EStop,
                address: 16388,
                expected: 16387,
            }
        ));
    }

    #[test]
    fn zero_address_rejected() {
        let map = CoilMap {
            motor_pulse: 0,
            ..CoilMap::default()
        };
        let err = TagRegistry::new(&map).unwrap_err();
        assert!(matches!(
            err,
            AddressConflictError::ZeroAddress {
                tag: TagId::MotorPulse
            }
        ));
    }

    #[test]
    fn update_overwrites_value() {
        let mut registry = TagRegistry::new(&CoilMap::default()).unwrap();
        registry.update(TagId::EStop, true);
        assert_eq!(registry.get(TagId::EStop).value, Some(true));
        registry.update(TagId::EStop, false);
        assert_eq!(registry.get(TagId::EStop).value, Some(false));
    }

    #[test]
    fn display_names_are_stable() {
        assert_eq!(TagId::EStop.to_string(), "e-stop");
        assert_eq!(TagId::SelectorAuto.to_string(), "selector switch in auto");
    }
}
