//! Parameter Identifier Widths

/// Escape byte introducing a page two PID
pub const PAGE_EXTENSION: u8 = 255;

/// Number of data bytes following a PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterWidth {
    Fixed(usize),
    /// First data byte counts the bytes that follow
    Variable,
}

/// Width implied by the PID range, used when no definition exists.
///
/// Both pages share the layout: 0-127 single byte, 128-191 two bytes,
/// the rest variable length.
pub fn standard_width(pid: u16) -> ParameterWidth {
    match pid % 256 {
        0..=127 => ParameterWidth::Fixed(1),
        128..=191 => ParameterWidth::Fixed(2),
        _ => ParameterWidth::Variable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_one_ranges() {
        assert_eq!(standard_width(84), ParameterWidth::Fixed(1));
        assert_eq!(standard_width(190), ParameterWidth::Fixed(2));
        assert_eq!(standard_width(194), ParameterWidth::Variable);
        assert_eq!(standard_width(254), ParameterWidth::Variable);
    }

    #[test]
    fn test_page_two_ranges() {
        assert_eq!(standard_width(266), ParameterWidth::Fixed(1));
        assert_eq!(standard_width(400), ParameterWidth::Fixed(2));
        assert_eq!(standard_width(500), ParameterWidth::Variable);
    }
}
