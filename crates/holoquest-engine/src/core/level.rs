use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::SkillTier;

/// Playable escape rooms, in progression order.
///
/// Each level owns a fixed message table (welcome, hints, victory). Levels with
/// per-tier puzzle variants carry one hint list and victory line per tier; the
/// others share a single set for all tiers.
///
/// # Example
///
/// ```
/// use holoquest_engine::{Level, SkillTier};
///
/// let level: Level = "scholarsLibrary".parse().unwrap();
/// assert_eq!(level, Level::Library);
/// assert_eq!(level.next(), Some(Level::Forge));
/// assert!(level.victory(SkillTier::Expert).contains("Expert"));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum Level {
    #[display("room")]
    Room,
    #[display("scholarsLibrary")]
    Library,
    #[display("celestialForge")]
    Forge,
    #[display("etherealClocktower")]
    Desert,
    #[display("verdantLabyrinth")]
    Labyrinth,
    #[display("puzle3")]
    Nexus,
}

impl Level {
    /// All levels in progression order.
    pub const ALL: [Self; 6] = [
        Self::Room,
        Self::Library,
        Self::Forge,
        Self::Desert,
        Self::Labyrinth,
        Self::Nexus,
    ];

    /// Stable identifier used in stage events and skill history.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Library => "scholarsLibrary",
            Self::Forge => "celestialForge",
            Self::Desert => "etherealClocktower",
            Self::Labyrinth => "verdantLabyrinth",
            Self::Nexus => "puzle3",
        }
    }

    /// Looks a level up by its identifier.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.id() == id)
    }

    /// The level that follows this one, or `None` at the end of the game.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let pos = Self::ALL.iter().position(|&l| l == self)?;
        Self::ALL.get(pos + 1).copied()
    }

    #[must_use]
    pub fn welcome(self) -> &'static str {
        self.messages().welcome
    }

    /// Hints for the puzzle variant matching `tier`, in puzzle order.
    #[must_use]
    pub fn hints(self, tier: SkillTier) -> &'static [&'static str] {
        self.messages().variant(tier).hints
    }

    #[must_use]
    pub fn victory(self, tier: SkillTier) -> &'static str {
        self.messages().variant(tier).victory
    }

    /// Returns `true` if this level ships a distinct puzzle variant for `tier`.
    #[must_use]
    pub fn has_variant(self, tier: SkillTier) -> bool {
        match &self.messages().variants {
            Variants::Shared(_) => false,
            Variants::Tiered { beginner, .. } => {
                tier != SkillTier::Beginner || beginner.is_some()
            }
        }
    }

    fn messages(self) -> &'static LevelMessages {
        match self {
            Self::Room => &ROOM,
            Self::Library => &LIBRARY,
            Self::Forge => &FORGE,
            Self::Desert => &DESERT,
            Self::Labyrinth => &LABYRINTH,
            Self::Nexus => &NEXUS,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown level id: {id:?}")]
pub struct ParseLevelError {
    #[error(not(source))]
    id: String,
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| ParseLevelError { id: s.to_owned() })
    }
}

/// The next level to load and the tier of puzzle variant to load it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSelection {
    pub level: Level,
    pub tier: SkillTier,
}

impl fmt::Display for LevelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.level, self.tier)
    }
}

/// Picks the level after `current`, using the latest classified tier.
#[must_use]
pub fn select_next_level(current: Level, tier: SkillTier) -> Option<LevelSelection> {
    current.next().map(|level| LevelSelection { level, tier })
}

struct LevelMessages {
    welcome: &'static str,
    variants: Variants,
}

enum Variants {
    Shared(VariantMessages),
    Tiered {
        beginner: Option<VariantMessages>,
        intermediate: VariantMessages,
        expert: VariantMessages,
    },
}

struct VariantMessages {
    hints: &'static [&'static str],
    victory: &'static str,
}

impl LevelMessages {
    fn variant(&self, tier: SkillTier) -> &VariantMessages {
        match &self.variants {
            Variants::Shared(v) => v,
            Variants::Tiered {
                beginner,
                intermediate,
                expert,
            } => match tier {
                SkillTier::Beginner => beginner.as_ref().unwrap_or(intermediate),
                SkillTier::Intermediate => intermediate,
                SkillTier::Expert => expert,
            },
        }
    }
}

static ROOM: LevelMessages = LevelMessages {
    welcome: "Welcome to this dusty room! Let's find a way out.",
    variants: Variants::Shared(VariantMessages {
        hints: &[
            "Check the table for something useful.",
            "Look at the bookshelf, there might be a clue.",
            "Move the bookshelf to see what's behind it.",
            "Pull the lever to unlock the door.",
        ],
        victory: "You've escaped the room! Congratulations!",
    }),
};

static LIBRARY: LevelMessages = LevelMessages {
    welcome: "Greetings, scholar! I'll guide you through this arcane library.",
    variants: Variants::Tiered {
        beginner: Some(VariantMessages {
            hints: &[
                "Light the candelabra with the quill to begin.",
                "Awaken the floating tome for a riddle.",
                "Enter the orb sequence: Red (1), Green (2), Blue (3).",
                "The orb is ready, check the cabinet.",
            ],
            victory: "The library's secrets are yours (Beginner)! Victory!",
        }),
        intermediate: VariantMessages {
            hints: &[
                "Use the quill to light the candelabra.",
                "Sync the rune circles by matching their speeds.",
                "Increase the candelabra intensity to 3.",
                "Place the activated orb on the pedestal.",
                "The cabinet awaits, open it!",
            ],
            victory: "The library's mysteries are yours (Intermediate)! Victory!",
        },
        expert: VariantMessages {
            hints: &[
                "Ignite the candelabra with the quill.",
                "Awaken the tome for a riddle.",
                "Enter the orb sequence: Red (1), Green (2), Blue (3).",
                "Arrange the books: Red, Green, Blue.",
                "Place the orb on the pedestal to unlock the cabinet.",
            ],
            victory: "The library's mastery is yours (Expert)! Victory!",
        },
    },
};

static FORGE: LevelMessages = LevelMessages {
    welcome: "Welcome to the Celestial Forge! Let's craft the key to the stars.",
    variants: Variants::Tiered {
        beginner: Some(VariantMessages {
            hints: &[
                "Turn on the bellows to heat the forge.",
                "Place the gear in the mechanism.",
                "Solve the steam valve puzzle.",
            ],
            victory: "The forge's treasure is yours (Beginner)! Stellar work!",
        }),
        intermediate: VariantMessages {
            hints: &[
                "Activate the bellows to start the fire.",
                "Align the gears in sequence: Small, Medium, Large.",
                "Adjust the steam pressure to medium.",
            ],
            victory: "The forge's creation shines (Intermediate)! Masterful craft!",
        },
        expert: VariantMessages {
            hints: &[
                "Start the bellows to ignite the forge.",
                "Set the crucible with the right alloy mix.",
                "Tune the gear rhythm and steam flow perfectly.",
            ],
            victory: "The forge's masterpiece is yours (Expert)! Celestial triumph!",
        },
    },
};

static DESERT: LevelMessages = LevelMessages {
    welcome: "Welcome to the scorching desert! Let's escape this sandy trap.",
    variants: Variants::Shared(VariantMessages {
        hints: &[
            "Find the hidden key in the sand.",
            "Use the key to unlock the chest.",
            "Solve the riddle from the scroll.",
            "Activate the oasis mechanism.",
        ],
        victory: "You've escaped the desert! Victory under the sun!",
    }),
};

static LABYRINTH: LevelMessages = LevelMessages {
    welcome: "Welcome to the Verdant Labyrinth! I'll help you awaken the temple's heart.",
    variants: Variants::Tiered {
        beginner: Some(VariantMessages {
            hints: &[
                "Activate the water source to begin.",
                "Tap the earth node next.",
                "Unlock the temple heart with both elements.",
            ],
            victory: "The relic is yours (Beginner)! The jungle honors you!",
        }),
        intermediate: VariantMessages {
            hints: &[
                "Start with the water source.",
                "Activate elements in order: Water, Earth, Fire, Air.",
                "Awaken the temple heart when all align.",
            ],
            victory: "The relic shines (Intermediate)! Master of the jungle!",
        },
        expert: VariantMessages {
            hints: &[
                "Begin with the water source.",
                "Follow the sequence: Water, Earth, Fire, Air, Light.",
                "Unlock the heart with perfect harmony.",
            ],
            victory: "The relic blazes (Expert)! Legendary triumph!",
        },
    },
};

static NEXUS: LevelMessages = LevelMessages {
    welcome: "Welcome to the Lunar Command Nexus! I'll assist you in launching the ship.",
    variants: Variants::Tiered {
        beginner: None,
        intermediate: VariantMessages {
            hints: &[
                "Activate the quantum probe to start.",
                "Power the thruster next.",
                "Align the frequencies to charge the core.",
                "Place the core in the resonator.",
                "Solve the cosmic riddle at the console.",
            ],
            victory: "The ship escapes the void (Intermediate)! Stellar victory!",
        },
        expert: VariantMessages {
            hints: &[
                "Begin with the quantum probe.",
                "Awaken the thruster.",
                "Tune the frequencies precisely.",
                "Set the core in the resonator.",
                "Decrypt the cosmic signal at the console.",
            ],
            victory: "The ship breaks free (Expert)! Legendary cosmic mastery!",
        },
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_roundtrip() {
        for level in Level::ALL {
            assert_eq!(Level::from_id(level.id()), Some(level));
            assert_eq!(level.to_string(), level.id());
            assert_eq!(level.id().parse::<Level>().ok(), Some(level));
        }
        assert_eq!(Level::from_id("basement"), None);
    }

    #[test]
    fn test_recorded_stage_ids_resolve() {
        assert_eq!("puzle3".parse::<Level>().ok(), Some(Level::Nexus));
        assert_eq!(
            select_next_level(Level::Labyrinth, SkillTier::Expert).map(|s| s.level.id()),
            Some("puzle3")
        );
    }

    #[test]
    fn test_progression_ends_at_last_level() {
        let mut level = Level::Room;
        let mut visited = vec![level];
        while let Some(next) = level.next() {
            visited.push(next);
            level = next;
        }
        assert_eq!(visited, Level::ALL);
        assert_eq!(select_next_level(Level::Nexus, SkillTier::Expert), None);
    }

    #[test]
    fn test_nexus_beginner_falls_back_to_intermediate() {
        assert!(!Level::Nexus.has_variant(SkillTier::Beginner));
        assert_eq!(
            Level::Nexus.hints(SkillTier::Beginner),
            Level::Nexus.hints(SkillTier::Intermediate)
        );
    }

    #[test]
    fn test_shared_levels_ignore_tier() {
        assert!(!Level::Room.has_variant(SkillTier::Expert));
        assert_eq!(
            Level::Desert.victory(SkillTier::Beginner),
            Level::Desert.victory(SkillTier::Expert)
        );
    }

    #[test]
    fn test_tiered_levels_differ_per_tier() {
        for level in [Level::Library, Level::Forge, Level::Labyrinth] {
            for tier in SkillTier::ALL {
                assert!(level.has_variant(tier));
                assert!(level.victory(tier).contains(tier.name()));
                assert!(!level.hints(tier).is_empty());
            }
        }
    }

    #[test]
    fn test_select_next_level_carries_tier() {
        let selection = select_next_level(Level::Room, SkillTier::Beginner).unwrap();
        assert_eq!(selection.level, Level::Library);
        assert_eq!(selection.tier, SkillTier::Beginner);
        assert_eq!(selection.to_string(), "scholarsLibrary (Beginner)");
    }
}
