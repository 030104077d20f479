//! Digit identifiers and fixed per-digit storage.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// The five digits of a hand, in rig order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Digit {
    Thumb,
    Index,
    Middle,
    Ring,
    Little,
}

impl Digit {
    /// Every digit, in storage order.
    pub const ALL: [Digit; 5] = [
        Digit::Thumb,
        Digit::Index,
        Digit::Middle,
        Digit::Ring,
        Digit::Little,
    ];

    /// Storage index (0-4).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Digit::Thumb => "thumb",
            Digit::Index => "index",
            Digit::Middle => "middle",
            Digit::Ring => "ring",
            Digit::Little => "little",
        }
    }
}

impl std::fmt::Display for Digit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exactly one value per digit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DigitMap<T> {
    values: [T; 5],
}

impl<T> DigitMap<T> {
    /// Builds a map by evaluating `f` for every digit.
    pub fn from_fn(mut f: impl FnMut(Digit) -> T) -> Self {
        Self {
            values: std::array::from_fn(|i| f(Digit::ALL[i])),
        }
    }

    /// Iterates `(digit, value)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Digit, &T)> {
        Digit::ALL.into_iter().zip(self.values.iter())
    }

    /// Iterates `(digit, value)` pairs mutably in storage order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Digit, &mut T)> {
        Digit::ALL.into_iter().zip(self.values.iter_mut())
    }

    /// Maps every value.
    pub fn map<U>(&self, mut f: impl FnMut(Digit, &T) -> U) -> DigitMap<U> {
        DigitMap::from_fn(|digit| f(digit, &self.values[digit.index()]))
    }
}

impl<T> Index<Digit> for DigitMap<T> {
    type Output = T;

    fn index(&self, digit: Digit) -> &T {
        &self.values[digit.index()]
    }
}

impl<T> IndexMut<Digit> for DigitMap<T> {
    fn index_mut(&mut self, digit: Digit) -> &mut T {
        &mut self.values[digit.index()]
    }
}
