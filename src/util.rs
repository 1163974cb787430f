use crate::error::{Error, Result};

pub(crate) fn check_value_range(value: i64, min: i64, max: i64, name: &str) -> Result<()> {
    if value < min || value > max {
        return Err(Error::InvalidArgument(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Iterate the bits of a byte, least significant first.
pub(crate) fn iterate_bits(byte: u8) -> impl Iterator<Item = (bool, u8)> {
    (0..8).map(move |i| ((byte >> i) & 1 != 0, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_iterate_lsb_first() {
        let set: Vec<u8> = iterate_bits(0b1000_0100)
            .filter(|(bit, _)| *bit)
            .map(|(_, i)| i)
            .collect();
        assert_eq!(set, vec![2, 7]);
    }

    #[test]
    fn range_check_bounds_inclusive() {
        assert!(check_value_range(1, 1, 16, "scene").is_ok());
        assert!(check_value_range(16, 1, 16, "scene").is_ok());
        assert!(check_value_range(0, 1, 16, "scene").is_err());
        assert!(check_value_range(17, 1, 16, "scene").is_err());
    }
}
