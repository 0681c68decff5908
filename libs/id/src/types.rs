//! Typed ID definitions for fleet resources.
//!
//! Each ID type is a fixed-width random hex token. Drone IDs are drawn once
//! at agent start; process IDs are drawn per spawn.

use crate::define_hex_id;

// =============================================================================
// Fleet
// =============================================================================

define_hex_id!(DroneId, 8, 0x0000_0000, 0xffff_ffff);
define_hex_id!(ProcessId, 6, 0x0010_0000, 0x00ff_ffff);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drone_id_roundtrip() {
        let id = DroneId::random();
        let s = id.to_string();
        let parsed: DroneId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_drone_id_width() {
        for _ in 0..64 {
            let s = DroneId::random().to_string();
            assert_eq!(s.len(), DroneId::DIGITS);
            assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_process_id_range() {
        for _ in 0..256 {
            let id = ProcessId::random();
            assert!(id.value() >= ProcessId::MIN);
            assert!(id.value() <= ProcessId::MAX);
            assert_eq!(id.to_string().len(), ProcessId::DIGITS);
        }
    }

    #[test]
    fn test_process_id_out_of_range() {
        let result = ProcessId::from_value(0x0f_ffff);
        assert!(matches!(result, Err(crate::IdError::OutOfRange { .. })));

        // 6 hex digits but below the process-id floor
        let result: Result<ProcessId, _> = "0fffff".parse();
        assert!(matches!(result, Err(crate::IdError::OutOfRange { .. })));
    }

    #[test]
    fn test_parse_empty() {
        let result: Result<DroneId, _> = "".parse();
        assert!(matches!(result, Err(crate::IdError::Empty)));
    }

    #[test]
    fn test_parse_wrong_length() {
        let result: Result<DroneId, _> = "abc123".parse();
        assert!(matches!(
            result,
            Err(crate::IdError::InvalidLength {
                expected: 8,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_parse_non_hex() {
        let result: Result<DroneId, _> = "zzzzzzzz".parse();
        assert!(matches!(
            result,
            Err(crate::IdError::InvalidCharacter('z'))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let id = ProcessId::random();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ProcessId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_zero_padded() {
        let id = DroneId::from_value(0x1a).unwrap();
        assert_eq!(id.to_string(), "0000001a");
    }
}
