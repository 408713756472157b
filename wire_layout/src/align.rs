/// Rounds `position` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the position unchanged.
#[inline]
pub const fn align_up(position: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return position;
    }
    let rem = position % alignment;
    if rem == 0 {
        position
    } else {
        position + (alignment - rem)
    }
}
