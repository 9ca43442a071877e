use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::LessonProgress;
use crate::rewards;

//
// ─── BADGES ────────────────────────────────────────────────────────────────────
//

/// A named, one-time achievement flag.
///
/// The serialized form is the user-facing display name, which is also what
/// storage backends persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "Joined Hub")]
    JoinedHub,
    #[serde(rename = "First Lesson Complete")]
    FirstLessonComplete,
    #[serde(rename = "Consistency Badge")]
    Consistency,
    #[serde(rename = "Weekly Warrior Badge")]
    WeeklyWarrior,
    #[serde(rename = "Master Chef Streak Badge")]
    MasterChefStreak,
    #[serde(rename = "Apprentice Badge")]
    Apprentice,
    #[serde(rename = "Mise En Place Pro Badge")]
    MiseEnPlacePro,
    #[serde(rename = "Culinary Artisan")]
    CulinaryArtisan,
    #[serde(rename = "Technique Specialist")]
    TechniqueSpecialist,
    #[serde(rename = "Plating Wiz")]
    PlatingWiz,
    #[serde(rename = "Culinary Mastery")]
    CulinaryMastery,
    #[serde(rename = "Perfect Score Badge")]
    PerfectScore,
    #[serde(rename = "Precision Badge")]
    Precision,
}

impl Badge {
    /// Display name, stable across versions.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Badge::JoinedHub => "Joined Hub",
            Badge::FirstLessonComplete => "First Lesson Complete",
            Badge::Consistency => "Consistency Badge",
            Badge::WeeklyWarrior => "Weekly Warrior Badge",
            Badge::MasterChefStreak => "Master Chef Streak Badge",
            Badge::Apprentice => "Apprentice Badge",
            Badge::MiseEnPlacePro => "Mise En Place Pro Badge",
            Badge::CulinaryArtisan => "Culinary Artisan",
            Badge::TechniqueSpecialist => "Technique Specialist",
            Badge::PlatingWiz => "Plating Wiz",
            Badge::CulinaryMastery => "Culinary Mastery",
            Badge::PerfectScore => "Perfect Score Badge",
            Badge::Precision => "Precision Badge",
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing a badge name from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBadgeError {
    name: String,
}

impl fmt::Display for ParseBadgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown badge name: {}", self.name)
    }
}

impl std::error::Error for ParseBadgeError {}

impl FromStr for Badge {
    type Err = ParseBadgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Joined Hub" => Ok(Badge::JoinedHub),
            "First Lesson Complete" => Ok(Badge::FirstLessonComplete),
            "Consistency Badge" => Ok(Badge::Consistency),
            "Weekly Warrior Badge" => Ok(Badge::WeeklyWarrior),
            "Master Chef Streak Badge" => Ok(Badge::MasterChefStreak),
            "Apprentice Badge" => Ok(Badge::Apprentice),
            "Mise En Place Pro Badge" => Ok(Badge::MiseEnPlacePro),
            "Culinary Artisan" => Ok(Badge::CulinaryArtisan),
            "Technique Specialist" => Ok(Badge::TechniqueSpecialist),
            "Plating Wiz" => Ok(Badge::PlatingWiz),
            "Culinary Mastery" => Ok(Badge::CulinaryMastery),
            "Perfect Score Badge" => Ok(Badge::PerfectScore),
            "Precision Badge" => Ok(Badge::Precision),
            _ => Err(ParseBadgeError { name: s.to_owned() }),
        }
    }
}

//
// ─── RULE TABLE ────────────────────────────────────────────────────────────────
//

/// Inputs a badge rule may inspect. Borrowed from the progress record at
/// evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub completed: &'a BTreeSet<u32>,
    pub completed_count: u32,
    pub streak: u32,
    pub quiz_score: Option<u8>,
}

struct BadgeRule {
    badge: Badge,
    earned: fn(&RuleContext<'_>) -> bool,
}

/// Ordered eligibility rules. Position in this table is the order badges are
/// announced in, so additions belong at the tier they fit, not the end.
const BADGE_RULES: &[BadgeRule] = &[
    // Baseline
    BadgeRule {
        badge: Badge::JoinedHub,
        earned: |_| true,
    },
    BadgeRule {
        badge: Badge::FirstLessonComplete,
        earned: |ctx| ctx.completed_count >= 1,
    },
    // Streak tiers
    BadgeRule {
        badge: Badge::Consistency,
        earned: |ctx| ctx.streak >= 3,
    },
    BadgeRule {
        badge: Badge::WeeklyWarrior,
        earned: |ctx| ctx.streak >= 7,
    },
    BadgeRule {
        badge: Badge::MasterChefStreak,
        earned: |ctx| ctx.streak >= 30,
    },
    // Lesson-block completion
    BadgeRule {
        badge: Badge::Apprentice,
        earned: |ctx| (1..=5).all(|lesson| ctx.completed.contains(&lesson)),
    },
    BadgeRule {
        badge: Badge::MiseEnPlacePro,
        earned: |ctx| ctx.completed_count >= 10,
    },
    BadgeRule {
        badge: Badge::CulinaryArtisan,
        earned: |ctx| ctx.completed_count >= 13,
    },
    BadgeRule {
        badge: Badge::TechniqueSpecialist,
        earned: |ctx| ctx.completed_count >= 20,
    },
    BadgeRule {
        badge: Badge::PlatingWiz,
        earned: |ctx| ctx.completed_count >= 26,
    },
    BadgeRule {
        badge: Badge::CulinaryMastery,
        earned: |ctx| ctx.completed_count >= 30,
    },
    // Quiz performance
    BadgeRule {
        badge: Badge::PerfectScore,
        earned: |ctx| ctx.quiz_score == Some(100),
    },
    BadgeRule {
        badge: Badge::Precision,
        earned: |ctx| {
            matches!(ctx.quiz_score, Some(score) if score >= 90) && ctx.completed_count >= 5
        },
    },
];

//
// ─── AWARDING ──────────────────────────────────────────────────────────────────
//

/// What a single `award_badges` call granted.
///
/// `reward_lessons` lists only the reward recipes whose unlock happened in
/// this call, so callers can announce them without diffing the unlocked set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AwardedBadges {
    pub badges: Vec<Badge>,
    pub reward_lessons: Vec<u32>,
}

impl AwardedBadges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }
}

/// Evaluate every badge rule against the current progress and merge the
/// results in.
///
/// Each rule fires at most once per badge: a badge already held is skipped,
/// so the returned list never re-announces anything. Newly granted badges
/// that appear in the reward map also unlock their reward recipe lesson.
pub fn award_badges(progress: &mut LessonProgress, quiz_score: Option<u8>) -> AwardedBadges {
    let newly: Vec<Badge> = {
        let ctx = RuleContext {
            completed: progress.completed_lessons(),
            completed_count: progress.completed_count(),
            streak: progress.streak_count(),
            quiz_score,
        };

        BADGE_RULES
            .iter()
            .filter(|rule| !progress.has_badge(rule.badge) && (rule.earned)(&ctx))
            .map(|rule| rule.badge)
            .collect()
    };

    let mut reward_lessons = Vec::new();
    for badge in &newly {
        progress.grant_badge(*badge);
        if let Some(lesson) = rewards::reward_recipe(*badge) {
            if progress.unlock_lesson(lesson) {
                reward_lessons.push(lesson);
            }
        }
    }

    AwardedBadges {
        badges: newly,
        reward_lessons,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
