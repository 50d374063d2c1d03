//! Audience classification.
//!
//! Every event gets exactly one [`Audience`], derived from its title and
//! description by walking [`RULES`] in order. The first rule that matches
//! decides; when nothing matches the event is [`Audience::Unknown`].
//!
//! Order is priority. Rules that state an audience precisely (an explicit age
//! or grade range) come before keyword rules, and the broad "family" phrasing
//! comes last, so "Family friendly LEGO club, ages 6-11" is school age and not
//! all ages.

use std::fmt::{Display, Formatter};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Audience {
    Adults,
    Teens,
    SchoolAge,
    EarlyYears,
    AllAges,
    Unknown,
}

impl Audience {
    pub const ALL: [Self; 6] = [
        Self::Adults,
        Self::Teens,
        Self::SchoolAge,
        Self::EarlyYears,
        Self::AllAges,
        Self::Unknown,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Adults => "Adults",
            Self::Teens => "Teens",
            Self::SchoolAge => "School age",
            Self::EarlyYears => "Early years",
            Self::AllAges => "All ages",
            Self::Unknown => "Everyone welcome",
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Adults => "☕",
            Self::Teens => "🎧",
            Self::SchoolAge => "🧩",
            Self::EarlyYears => "🧸",
            Self::AllAges => "👪",
            Self::Unknown => "📅",
        }
    }

    /// Theme token handed to the rendering layer.
    pub const fn theme(self) -> &'static str {
        match self {
            Self::Adults => "adults",
            Self::Teens => "teens",
            Self::SchoolAge => "school-age",
            Self::EarlyYears => "early-years",
            Self::AllAges => "all-ages",
            Self::Unknown => "unknown",
        }
    }

    /// Maps an inclusive age range onto an audience. The bands are checked in
    /// order, so `12-12` is teens and `5-5` early years.
    pub const fn from_ages(lower: u32, upper: Option<u32>) -> Self {
        match (lower, upper) {
            (_, Some(upper)) if upper <= 5 => Self::EarlyYears,
            (lower, _) if lower >= 18 => Self::Adults,
            (lower, _) if lower >= 12 => Self::Teens,
            (_, Some(upper)) if upper <= 12 => Self::SchoolAge,
            _ => Self::AllAges,
        }
    }
}

impl Display for Audience {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a matching rule turns into an audience.
#[derive(Debug, Clone, Copy)]
pub enum Resolve {
    Fixed(Audience),
    /// Captures `lower` and optional `upper`, read as ages.
    Ages,
    /// Captures `lower` and optional `upper`, read as school grades (K = 0).
    Grades,
}

pub struct Rule {
    pub name: &'static str,
    pub pattern: Regex,
    pub resolve: Resolve,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, resolve: Resolve) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("audience rule pattern"),
            resolve,
        }
    }

    fn apply(&self, text: &str) -> Option<Audience> {
        let captures = self.pattern.captures(text)?;

        match self.resolve {
            Resolve::Fixed(audience) => Some(audience),
            Resolve::Ages => {
                let (lower, upper) = bounds(&captures, 0)?;
                Some(Audience::from_ages(lower, upper))
            }
            Resolve::Grades => {
                // Grade n is roughly age n + 5.
                let (lower, upper) = bounds(&captures, 5)?;
                Some(Audience::from_ages(lower, upper))
            }
        }
    }
}

fn bounds(captures: &Captures, offset: u32) -> Option<(u32, Option<u32>)> {
    let number = |name: &str| {
        captures.name(name).and_then(|m| match m.as_str() {
            "k" | "K" => Some(offset),
            value => value.parse::<u32>().ok().map(|n| n + offset),
        })
    };

    let lower = number("lower")?;
    let upper = number("upper");

    match upper {
        Some(upper) if upper < lower => Some((upper, Some(lower))),
        upper => Some((lower, upper)),
    }
}

/// Ordered classification rules, most specific first.
pub static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        // "ages 6-11", "age 3 to 5", "(ages 8–12)"
        Rule::new(
            "age-range",
            r"(?i)\bages?\s*(?P<lower>\d{1,2})\s*(?:-|–|—|to)\s*(?P<upper>\d{1,2})\b",
            Resolve::Ages,
        ),
        // "ages 13 and up", "ages 18+"
        Rule::new(
            "age-open",
            r"(?i)\bages?\s*(?P<lower>\d{1,2})\s*(?:\+|and\s+(?:up|over|older))",
            Resolve::Ages,
        ),
        Rule::new("age-plus", r"\b(?P<lower>1[89]|2[01])\s*\+", Resolve::Ages),
        // "grades K-5", "grade 6 to 12"
        Rule::new(
            "grade-range",
            r"(?i)\bgrades?\s*(?P<lower>k|\d{1,2})\s*(?:-|–|—|to)\s*(?P<upper>\d{1,2})\b",
            Resolve::Grades,
        ),
        // Before adults: "young adult" contains "adult", and the regex
        // engine has no look-behind to exclude it there.
        Rule::new(
            "teens",
            r"(?i)\b(?:teens?|teenagers?|tweens?|young\s+adults?|middle\s+school|high\s+school)\b",
            Resolve::Fixed(Audience::Teens),
        ),
        Rule::new(
            "adults",
            r"(?i)\b(?:adults?(?:\s+only)?|for\s+grown[- ]?ups|seniors?|older\s+adults|book\s+club)\b",
            Resolve::Fixed(Audience::Adults),
        ),
        Rule::new(
            "early-years",
            r"(?i)\b(?:bab(?:y|ies)|toddlers?|preschool(?:ers)?|pre-k|story\s?time|lapsit|infants?)\b",
            Resolve::Fixed(Audience::EarlyYears),
        ),
        Rule::new(
            "school-age",
            r"(?i)\b(?:kids|children|child|school[- ]age|homeschool(?:ers)?|elementary|after[- ]school)\b",
            Resolve::Fixed(Audience::SchoolAge),
        ),
        Rule::new(
            "all-ages",
            r"(?i)\b(?:famil(?:y|ies)|all\s+ages|everyone|intergenerational)\b",
            Resolve::Fixed(Audience::AllAges),
        ),
    ]
});

/// Classifies free text. Total: every input, including the empty string,
/// yields an audience.
pub fn classify(text: &str) -> Audience {
    RULES
        .iter()
        .find_map(|rule| {
            let audience = rule.apply(text)?;
            log::trace!(rule = rule.name; "classified as {audience}");
            Some(audience)
        })
        .unwrap_or(Audience::Unknown)
}

pub fn classify_event(title: &str, description: &str) -> Audience {
    classify(&format!("{title}\n{description}"))
}
