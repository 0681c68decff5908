//! Macro for defining typed random-hex ID types.

/// Macro to define a typed ID over a fixed-width hex token.
///
/// This generates a newtype wrapper around `u32` with:
/// - `DIGITS`, `MIN`, and `MAX` constants describing the token shape
/// - `random()` to draw a fresh ID uniformly from the value range
/// - `parse()` with strict validation (width, hex characters, range)
/// - `Display` and `FromStr` implementations (lowercase, zero-padded)
/// - `Serialize` and `Deserialize` implementations (as the hex string)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_hex_id!(DroneId, 8, 0x0000_0000, 0xffff_ffff);
///
/// let id = DroneId::random();
/// let parsed: DroneId = "3fa91c07".parse()?;
/// ```
#[macro_export]
macro_rules! define_hex_id {
    ($name:ident, $digits:literal, $min:literal, $max:literal) => {
        /// A typed ID for this resource type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Number of hex digits in the canonical representation.
            pub const DIGITS: usize = $digits;

            /// Smallest valid value.
            pub const MIN: u32 = $min;

            /// Largest valid value.
            pub const MAX: u32 = $max;

            /// Draws a fresh ID uniformly at random from the value range.
            ///
            /// There is no collision check; see the crate docs.
            #[must_use]
            pub fn random() -> Self {
                use ::rand::Rng as _;
                Self(::rand::rng().random_range(Self::MIN..=Self::MAX))
            }

            /// Creates an ID from a raw value, validating the range.
            pub fn from_value(value: u32) -> Result<Self, $crate::IdError> {
                if value < Self::MIN || value > Self::MAX {
                    return Err($crate::IdError::OutOfRange {
                        value,
                        min: Self::MIN,
                        max: Self::MAX,
                    });
                }
                Ok(Self(value))
            }

            /// Returns the underlying value.
            #[must_use]
            pub const fn value(&self) -> u32 {
                self.0
            }

            /// Parses an ID from its canonical hex representation.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }
                if s.len() != Self::DIGITS {
                    return Err($crate::IdError::InvalidLength {
                        expected: Self::DIGITS,
                        actual: s.len(),
                    });
                }
                if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
                    return Err($crate::IdError::InvalidCharacter(c));
                }
                // Width is checked above, so the parse cannot overflow u32
                // for the digit counts we define.
                let value = u32::from_str_radix(s, 16)
                    .map_err(|_| $crate::IdError::InvalidCharacter('?'))?;
                Self::from_value(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:0width$x}", self.0, width = Self::DIGITS)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
