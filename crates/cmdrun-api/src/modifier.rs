//! Post-modifiers applied to captured output

use cmdrun_util::{CommandError, CommandResult};
use serde::{Deserialize, Serialize};

/// A pure transformation of captured command output
pub trait PostModifier: Send + Sync {
    fn process(&self, content: &str) -> CommandResult<String>;
}

/// Which end(s) of the content a trim applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimSide {
    Right,
    Left,
    Both,
}

/// Raw trim option code.
///
/// Codes outside the three known constants are representable so that a
/// misconfigured modifier fails at `process` time instead of being rejected
/// at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrimOption(u8);

impl TrimOption {
    pub const RIGHT: Self = Self(0);
    pub const LEFT: Self = Self(1);
    pub const BOTH: Self = Self(2);

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub fn side(self) -> Option<TrimSide> {
        match self {
            Self::RIGHT => Some(TrimSide::Right),
            Self::LEFT => Some(TrimSide::Left),
            Self::BOTH => Some(TrimSide::Both),
            _ => None,
        }
    }
}

impl From<TrimSide> for TrimOption {
    fn from(side: TrimSide) -> Self {
        match side {
            TrimSide::Right => Self::RIGHT,
            TrimSide::Left => Self::LEFT,
            TrimSide::Both => Self::BOTH,
        }
    }
}

/// Strips characters belonging to `chars` from one or both ends.
///
/// `chars` is a set of individual characters, not a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimPostModifier {
    option: TrimOption,
    chars: String,
}

impl TrimPostModifier {
    pub fn new(option: impl Into<TrimOption>, chars: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            chars: chars.into(),
        }
    }

    pub fn right(chars: impl Into<String>) -> Self {
        Self::new(TrimOption::RIGHT, chars)
    }

    pub fn left(chars: impl Into<String>) -> Self {
        Self::new(TrimOption::LEFT, chars)
    }

    pub fn both(chars: impl Into<String>) -> Self {
        Self::new(TrimOption::BOTH, chars)
    }

    pub fn option(&self) -> TrimOption {
        self.option
    }

    pub fn chars(&self) -> &str {
        &self.chars
    }
}

impl PostModifier for TrimPostModifier {
    fn process(&self, content: &str) -> CommandResult<String> {
        let side = self
            .option
            .side()
            .ok_or(CommandError::UnknownTrimOption(self.option.raw()))?;

        let in_set = |c: char| self.chars.contains(c);
        let trimmed = match side {
            TrimSide::Right => content.trim_end_matches(in_set),
            TrimSide::Left => content.trim_start_matches(in_set),
            TrimSide::Both => content.trim_matches(in_set),
        };

        Ok(trimmed.to_owned())
    }
}

/// Run `content` through `modifiers` left to right.
///
/// Stops at the first failing modifier. The returned
/// [`CommandError::ModifierChain`] carries the value produced just before
/// the failing stage.
pub fn apply_modifiers(content: String, modifiers: &[&dyn PostModifier]) -> CommandResult<String> {
    modifiers
        .iter()
        .enumerate()
        .try_fold(content, |current, (stage, modifier)| {
            match modifier.process(&current) {
                Ok(next) => Ok(next),
                Err(source) => Err(CommandError::ModifierChain {
                    output: current,
                    stage,
                    source: Box::new(source),
                }),
            }
        })
}
