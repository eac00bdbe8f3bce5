/// Damage dealt to the side that answered wrong while the other was right.
pub const ASYMMETRIC_DAMAGE: u32 = 20;

/// Damage dealt to each side when both answered wrong.
pub const MUTUAL_DAMAGE: u32 = 10;

/// Damage taken by each seat for one round, given each seat's correctness.
pub fn round_damage(correct: [bool; 2]) -> [u32; 2] {
    match correct {
        [true, true] => [0, 0],
        [true, false] => [0, ASYMMETRIC_DAMAGE],
        [false, true] => [ASYMMETRIC_DAMAGE, 0],
        [false, false] => [MUTUAL_DAMAGE, MUTUAL_DAMAGE],
    }
}

/// Apply damage to hit points, flooring at zero.
pub fn apply_damage(hp: u32, damage: u32) -> u32 {
    hp.saturating_sub(damage)
}
