//! Progress model: mapping accumulated XP to a level.

/// XP required per level step.
const XP_PER_LEVEL: u64 = 1000;

/// Compute the level for a total XP amount.
///
/// Pure and deterministic; always returns at least 1. Callers must
/// re-derive the level after every XP change rather than caching it.
pub fn level_from_xp(total_xp: u64) -> u32 {
    (total_xp / XP_PER_LEVEL + 1).max(1) as u32
}
