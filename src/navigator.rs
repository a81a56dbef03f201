use crate::pattern::ChapterPattern;

/// Chapter numbers below this are never produced.
pub const FIRST_CHAPTER: u64 = 1;

/// Sibling URL `delta` chapters away from `pattern`, or `None` when that
/// would go below [`FIRST_CHAPTER`].
pub fn step(pattern: &ChapterPattern, delta: i64) -> Option<String> {
    step_number(pattern.number, delta).map(|number| pattern.url_for(number))
}

pub fn step_number(number: u64, delta: i64) -> Option<u64> {
    let next = number.checked_add_signed(delta)?;
    (next >= FIRST_CHAPTER).then_some(next)
}
