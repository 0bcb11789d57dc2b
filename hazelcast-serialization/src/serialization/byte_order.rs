//! Byte order selection for multi-byte primitives.

/// Byte order used when encoding multi-byte primitives.
///
/// Buffers carry a default order fixed at construction; every primitive
/// accessor also has a `_with` variant that overrides it for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ByteOrder {
    /// Most significant byte first. The Java default and the wire default.
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// Returns the byte order of the current platform.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }

    /// Returns true for [`ByteOrder::BigEndian`].
    pub fn is_big_endian(self) -> bool {
        self == Self::BigEndian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_big_endian() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigEndian);
        assert!(ByteOrder::default().is_big_endian());
    }

    #[test]
    fn test_native_matches_target() {
        let native = ByteOrder::native();
        assert_eq!(native.is_big_endian(), cfg!(target_endian = "big"));
    }
}
