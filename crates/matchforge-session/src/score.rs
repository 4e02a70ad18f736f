//! Per-round scores and lifetime statistics.
//!
//! A player's in-round score is a sum type keyed by the room's game rule,
//! so Touchdown counters cannot leak into a Deathmatch round. Lifetime
//! statistics are folded in once per finished match and persisted through
//! the [`PlayerStore`](crate::PlayerStore).

use matchforge_protocol::GameRule;

/// Touchdown-mode counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TouchdownScore {
    pub total: u32,
    pub touchdowns: u32,
    pub td_assists: u32,
    pub kills: u32,
    pub kill_assists: u32,
    pub offense: u32,
    pub offense_assists: u32,
    pub defense: u32,
    pub defense_assists: u32,
    pub recovery: u32,
}

/// Deathmatch-mode counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeathmatchScore {
    pub total: u32,
    pub kills: u32,
    pub kill_assists: u32,
    pub deaths: u32,
}

/// Survival-mode counters: one running kill count.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SurvivalScore {
    pub total: u32,
    pub kills: u32,
}

/// In-round score, selected by the room's rule when the player joins.
/// `Idle` is the out-of-room state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameScore {
    Idle,
    Touchdown(TouchdownScore),
    Deathmatch(DeathmatchScore),
    Survival(SurvivalScore),
}

impl GameScore {
    pub fn for_rule(rule: GameRule) -> Self {
        match rule {
            GameRule::Touchdown => Self::Touchdown(TouchdownScore::default()),
            GameRule::Deathmatch => Self::Deathmatch(DeathmatchScore::default()),
            GameRule::Survival => Self::Survival(SurvivalScore::default()),
        }
    }

    /// Running total used for payout and tie-breaks.
    pub fn total(&self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Touchdown(s) => s.total,
            Self::Deathmatch(s) => s.total,
            Self::Survival(s) => s.total,
        }
    }

    /// Currency earned for the round, given seconds spent in it.
    ///
    /// Touchdown pays by time and performance; the other modes pay a
    /// flat rate. Experience is twice the currency.
    pub fn payout(&self, elapsed_secs: u64) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Touchdown(s) => {
                if s.total == 0 {
                    return 0;
                }
                let time_part = (elapsed_secs / 4) as u32;
                let score_part = 100 * s.total / (500 + 2 * s.total) * 14;
                time_part + s.touchdowns * 15 + score_part
            }
            Self::Deathmatch(_) | Self::Survival(_) => 200,
        }
    }
}

/// Lifetime Touchdown statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TouchdownStats {
    pub touchdowns: u32,
    pub td_assists: u32,
    pub kills: u32,
    pub kill_assists: u32,
    pub offense: u32,
    pub offense_assists: u32,
    pub defense: u32,
    pub defense_assists: u32,
    pub recovery: u32,
    pub matches: u32,
    pub won: u32,
    pub lost: u32,
}

impl TouchdownStats {
    /// Folds a finished round into the lifetime totals.
    pub fn record_result(&mut self, score: &TouchdownScore, win: bool) {
        self.matches += 1;
        if win {
            self.won += 1;
        } else {
            self.lost += 1;
        }
        self.touchdowns += score.touchdowns;
        self.td_assists += score.td_assists;
        self.kills += score.kills;
        self.kill_assists += score.kill_assists;
        self.offense += score.offense;
        self.offense_assists += score.offense_assists;
        self.defense += score.defense;
        self.defense_assists += score.defense_assists;
        self.recovery += score.recovery;
    }
}

/// Lifetime Deathmatch statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeathmatchStats {
    pub kills: u32,
    pub kill_assists: u32,
    pub deaths: u32,
    pub matches: u32,
    pub won: u32,
    pub lost: u32,
}

impl DeathmatchStats {
    pub fn record_result(&mut self, score: &DeathmatchScore, win: bool) {
        self.matches += 1;
        if win {
            self.won += 1;
        } else {
            self.lost += 1;
        }
        self.kills += score.kills;
        self.kill_assists += score.kill_assists;
        self.deaths += score.deaths;
    }
}

/// Maximum level; the ladder ends here.
pub const MAX_LEVEL: u32 = 100;

/// Cumulative experience required to leave each level, index = level.
const EXP_LADDER: [u32; 100] = [
    1_400, 1_600, 1_800, 2_000, 2_200, 2_400, 2_800, 3_200, 3_600, 4_000, 4_400, 5_400, 6_400,
    7_400, 8_400, 9_400, 11_000, 13_000, 15_000, 17_000, 19_000, 23_000, 27_000, 31_000, 35_000,
    39_000, 45_000, 50_000, 55_000, 60_000, 65_000, 73_820, 82_640, 91_460, 100_280, 109_100,
    120_620, 132_140, 143_660, 155_180, 166_700, 181_280, 195_860, 210_440, 225_020, 239_600,
    257_600, 275_600, 293_600, 311_600, 329_600, 351_380, 373_160, 394_940, 416_720, 438_500,
    464_420, 490_340, 516_260, 542_180, 568_100, 598_520, 628_940, 659_360, 689_780, 720_200,
    755_480, 790_760, 826_040, 861_320, 896_600, 937_100, 977_600, 1_018_100, 1_058_600,
    1_099_100, 1_145_180, 1_191_260, 1_237_340, 1_283_420, 1_329_500, 1_381_520, 1_433_540,
    1_485_560, 1_537_580, 1_589_600, 1_647_920, 1_706_240, 1_764_560, 1_822_880, 1_881_200,
    1_946_180, 2_011_160, 2_076_140, 2_141_120, 2_206_100, 2_278_100, 2_350_100, 2_422_100,
    2_494_100,
];

/// Experience needed to advance past `level`, or `None` at the cap.
pub fn exp_to_next(level: u32) -> Option<u32> {
    if level >= MAX_LEVEL - 1 {
        return None;
    }
    Some(EXP_LADDER[level as usize])
}

/// Experience accumulated by all levels below `level`, plus `exp`.
pub fn total_exp(level: u32, exp: u32) -> u64 {
    let mut total = u64::from(exp);
    for threshold in EXP_LADDER.iter().take(level.min(MAX_LEVEL) as usize) {
        total += u64::from(*threshold);
    }
    total
}

/// Applies gained experience, stepping up at most one level and carrying
/// the remainder.
pub fn apply_exp(level: &mut u32, exp: &mut u32, gained: u32) {
    let Some(threshold) = exp_to_next(*level) else {
        return;
    };
    let new_exp = *exp + gained;
    if new_exp > threshold {
        *level += 1;
        *exp = new_exp - threshold;
    } else {
        *exp = new_exp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_matches_rule() {
        assert!(matches!(
            GameScore::for_rule(GameRule::Touchdown),
            GameScore::Touchdown(_)
        ));
        assert!(matches!(
            GameScore::for_rule(GameRule::Survival),
            GameScore::Survival(_)
        ));
    }

    #[test]
    fn touchdown_payout_is_zero_without_points() {
        let score = GameScore::Touchdown(TouchdownScore::default());
        assert_eq!(score.payout(600), 0);
    }

    #[test]
    fn touchdown_payout_formula() {
        let score = GameScore::Touchdown(TouchdownScore {
            total: 50,
            touchdowns: 2,
            ..Default::default()
        });
        // 240/4 + 2*15 + (100*50/(500+100))*14 = 60 + 30 + 8*14
        assert_eq!(score.payout(240), 60 + 30 + 112);
    }

    #[test]
    fn flat_payout_for_other_modes() {
        assert_eq!(GameScore::Deathmatch(DeathmatchScore::default()).payout(0), 200);
        assert_eq!(GameScore::Survival(SurvivalScore::default()).payout(999), 200);
    }

    #[test]
    fn level_up_carries_remainder() {
        let mut level = 0;
        let mut exp = 1_300;
        apply_exp(&mut level, &mut exp, 200);
        assert_eq!(level, 1);
        assert_eq!(exp, 100);
    }

    #[test]
    fn exp_below_threshold_accumulates() {
        let mut level = 5;
        let mut exp = 0;
        apply_exp(&mut level, &mut exp, 2_400);
        // Exactly at the threshold does not level.
        assert_eq!(level, 5);
        assert_eq!(exp, 2_400);
    }

    #[test]
    fn ladder_covers_every_level_below_the_cap() {
        for level in 0..MAX_LEVEL - 1 {
            assert!(exp_to_next(level).is_some(), "no threshold for level {level}");
        }
        assert_eq!(exp_to_next(MAX_LEVEL - 1), None);
        // Levels past the cap sum the same ladder.
        assert_eq!(total_exp(MAX_LEVEL, 0), total_exp(MAX_LEVEL + 5, 0));
    }

    #[test]
    fn level_cap_absorbs_exp() {
        let mut level = MAX_LEVEL;
        let mut exp = 0;
        apply_exp(&mut level, &mut exp, 10_000);
        assert_eq!(level, MAX_LEVEL);
        assert_eq!(exp, 0);
    }

    #[test]
    fn stats_fold_in_round_counters() {
        let mut stats = TouchdownStats::default();
        let score = TouchdownScore {
            total: 17,
            touchdowns: 1,
            kills: 3,
            ..Default::default()
        };
        stats.record_result(&score, true);
        stats.record_result(&score, false);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.won, 1);
        assert_eq!(stats.lost, 1);
        assert_eq!(stats.touchdowns, 2);
        assert_eq!(stats.kills, 6);
    }
}
