/// Smallest edge accepted when no exact size match exists
pub const MIN_PREVIEW_SIZE: u32 = 320;

/// Pick a capture size from what the device offers.
///
/// An exact match wins. Otherwise the smallest offered size whose width and
/// height are both at least `max(min(desired), 320)` is chosen, falling back
/// to the first offered size. Returns `None` only when nothing is offered.
pub fn choose_optimal_size(choices: &[(u32, u32)], desired: (u32, u32)) -> Option<(u32, u32)> {
    let min_size = desired.0.min(desired.1).max(MIN_PREVIEW_SIZE);

    if choices.contains(&desired) {
        return Some(desired);
    }

    choices
        .iter()
        .copied()
        .filter(|&(w, h)| w >= min_size && h >= min_size)
        .min_by_key(|&(w, h)| w as u64 * h as u64)
        .or_else(|| choices.first().copied())
}
