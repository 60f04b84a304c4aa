mod ref_id;

pub use ref_id::*;

/// Elements with a width in stack or local variable slots
///
/// Category-1 values have width 1 and category-2 values (`long` and `double`) have width 2.
pub trait Width {
    fn width(&self) -> usize;
}
