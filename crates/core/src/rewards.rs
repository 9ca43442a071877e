use crate::badges::Badge;

/// Badge → reward recipe lesson. Reward recipes live in the 99+ order band
/// and are reachable only through a badge, never through sequential
/// progression. Extending the table is a data change; the rule engine picks
/// new entries up automatically.
pub const RECIPE_UNLOCKS: &[(Badge, u32)] = &[
    (Badge::PerfectScore, 99),
    (Badge::WeeklyWarrior, 100),
    (Badge::Apprentice, 101),
    (Badge::CulinaryArtisan, 201),
    (Badge::TechniqueSpecialist, 301),
];

/// Reward recipe lesson unlocked by `badge`, if it has one.
#[must_use]
pub fn reward_recipe(badge: Badge) -> Option<u32> {
    RECIPE_UNLOCKS
        .iter()
        .find(|(candidate, _)| *candidate == badge)
        .map(|(_, lesson)| *lesson)
}
