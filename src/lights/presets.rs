use crate::lights::encoder::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A named, pre-authored pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDefinition {
    pub pattern_type: &'static str,
    pub colors: &'static [Rgb],
    pub speed: u8,
    pub gap: u8,
    /// Authored direction. The wire format only knows `direction=F`, so it is
    /// informational and never changes the encoded command.
    pub direction: Direction,
}

const fn preset(
    pattern_type: &'static str,
    colors: &'static [Rgb],
    speed: u8,
    gap: u8,
) -> PatternDefinition {
    PatternDefinition {
        pattern_type,
        colors,
        speed,
        gap,
        direction: Direction::Forward,
    }
}

const RED: Rgb = Rgb::new(255, 0, 0);
const GREEN: Rgb = Rgb::new(0, 255, 0);
const BLUE: Rgb = Rgb::new(0, 0, 255);
const WHITE: Rgb = Rgb::new(255, 255, 255);
const WARM_WHITE: Rgb = Rgb::new(255, 180, 107);
const ORANGE: Rgb = Rgb::new(255, 100, 0);
const PURPLE: Rgb = Rgb::new(128, 0, 128);
const GOLD: Rgb = Rgb::new(255, 191, 0);
const PINK: Rgb = Rgb::new(255, 20, 147);
const TEAL: Rgb = Rgb::new(0, 128, 128);
const LIME: Rgb = Rgb::new(50, 205, 50);

// Order matters: it is the effect list shown to the user.
static PRESETS: &[(&str, PatternDefinition)] = &[
    ("Solid White", preset("custom", &[WHITE], 0, 0)),
    ("Candy Cane", preset("custom", &[RED, WHITE], 3, 0)),
    ("July 4th", preset("custom", &[RED, WHITE, BLUE], 3, 0)),
    ("Christmas", preset("custom", &[RED, GREEN], 3, 0)),
    ("Halloween", preset("custom", &[ORANGE, PURPLE], 3, 0)),
    ("Warm White", preset("stationary", &[WARM_WHITE], 0, 0)),
    ("Christmas Chase", preset("chase", &[RED, GREEN, WHITE], 5, 2)),
    ("Starry Night", preset("twinkle", &[WHITE, BLUE], 4, 0)),
    ("Ocean River", preset("river", &[BLUE, TEAL, WHITE], 2, 0)),
    ("Patriot March", preset("march", &[RED, WHITE, BLUE], 4, 1)),
    ("Halloween Takeover", preset("takeover", &[ORANGE, PURPLE, GREEN], 6, 0)),
    ("Comet", preset("streak", &[WHITE, BLUE], 8, 10)),
    ("Valentine Fade", preset("fade", &[RED, PINK], 2, 0)),
    ("St. Patrick's Split", preset("split", &[GREEN, WHITE, LIME], 1, 0)),
    ("Thunderstorm", preset("bolt", &[WHITE, BLUE], 9, 5)),
    ("Confetti", preset("sprinkle", &[RED, GREEN, BLUE, GOLD, PINK], 5, 0)),
    (
        "Easter",
        PatternDefinition {
            pattern_type: "chase",
            colors: &[PINK, Rgb::new(173, 216, 230), Rgb::new(255, 255, 153)],
            speed: 2,
            gap: 1,
            direction: Direction::Reverse,
        },
    ),
    ("Thanksgiving", preset("fade", &[ORANGE, GOLD, Rgb::new(139, 69, 19)], 2, 0)),
];

pub fn get(name: &str) -> Option<&'static PatternDefinition> {
    PRESETS
        .iter()
        .find(|(preset_name, _)| *preset_name == name)
        .map(|(_, definition)| definition)
}

pub fn list_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}
