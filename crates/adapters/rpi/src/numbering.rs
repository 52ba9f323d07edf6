//! Translation of configured line numbers to BCM GPIO numbers.

use thingpin_domain::line::{LineId, PinMode};

/// Highest GPIO number exposed on the 40-pin header.
const MAX_BCM: u8 = 27;

/// `(physical header pin, BCM GPIO)` for every GPIO on the 40-pin header.
const BOARD_TO_BCM: [(u32, u8); 28] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (27, 0),
    (28, 1),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

/// BCM GPIO number of `line` under `mode`, or `None` if the line is not a
/// GPIO (power, ground, or out of range).
#[must_use]
pub fn to_bcm(mode: PinMode, line: LineId) -> Option<u8> {
    match mode {
        PinMode::Bcm => u8::try_from(line.number())
            .ok()
            .filter(|bcm| *bcm <= MAX_BCM),
        PinMode::Board => BOARD_TO_BCM
            .iter()
            .find(|(board, _)| *board == line.number())
            .map(|(_, bcm)| *bcm),
    }
}
