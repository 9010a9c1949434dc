/// Rectangular margins of the source excluded from the backdrop, in source
/// pixels. Typically chrome that must stay sharp (a toolbar, a status strip,
/// a navigation strip) while the content behind the modal is blurred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExclusionBands {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl ExclusionBands {
    pub const NONE: ExclusionBands = ExclusionBands {
        top: 0,
        bottom: 0,
        left: 0,
        right: 0,
    };

    pub fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Source rectangle left after subtracting the bands, as
    /// `(x, y, width, height)`. `None` when the bands consume the whole
    /// source.
    pub fn effective_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let inner_w = width.checked_sub(self.left)?.checked_sub(self.right)?;
        let inner_h = height.checked_sub(self.top)?.checked_sub(self.bottom)?;
        if inner_w == 0 || inner_h == 0 {
            return None;
        }
        Some((self.left, self.top, inner_w, inner_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bands_keep_full_source() {
        assert_eq!(
            ExclusionBands::NONE.effective_rect(100, 50),
            Some((0, 0, 100, 50))
        );
        assert!(ExclusionBands::NONE.is_empty());
    }

    #[test]
    fn test_bands_shrink_rect() {
        let bands = ExclusionBands::new(10, 5, 2, 3);
        assert_eq!(bands.effective_rect(100, 50), Some((2, 10, 95, 35)));
        assert!(!bands.is_empty());
    }

    #[test]
    fn test_bands_consuming_source_are_degenerate() {
        let bands = ExclusionBands::new(5, 5, 0, 0);
        assert_eq!(bands.effective_rect(50, 10), None);
        let bands = ExclusionBands::new(0, 0, 30, 30);
        assert_eq!(bands.effective_rect(50, 10), None);
    }

    #[test]
    fn test_bands_larger_than_source_are_degenerate() {
        let bands = ExclusionBands::new(100, 0, 0, 0);
        assert_eq!(bands.effective_rect(50, 10), None);
    }
}
