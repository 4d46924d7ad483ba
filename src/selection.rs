// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of the episode selection grammar.
//!
//! ```text
//! choice    = "q" | "quit" | "list" | "ls" | selection
//! selection = item { "," item }
//! item      = "all" | "f" count | "l" count | index "-" index | index
//! ```
//!
//! Indices are 1-based positions in feed order. Whitespace and case are
//! ignored.

use crate::error::SelectionError;

/// An ordered, de-duplicated set of 1-based episode indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    indices: Vec<usize>,
}

impl Selection {
    /// The selected indices, in selection order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn push_unique(&mut self, index: usize) {
        if !self.indices.contains(&index) {
            self.indices.push(index);
        }
    }
}

/// What the user asked for at the selection prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Stop prompting
    Quit,
    /// Show the episode list again
    List,
    /// Process these episodes
    Episodes(Selection),
}

/// Parse one line of prompt input against a feed of `total` episodes
pub fn parse_choice(input: &str, total: usize) -> Result<Choice, SelectionError> {
    let normalized = normalize(input);
    match normalized.as_str() {
        "q" | "quit" => Ok(Choice::Quit),
        "list" | "ls" => Ok(Choice::List),
        _ => parse_normalized(&normalized, total).map(Choice::Episodes),
    }
}

/// Parse a selection expression into episode indices
pub fn parse_selection(input: &str, total: usize) -> Result<Selection, SelectionError> {
    parse_normalized(&normalize(input), total)
}

fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_normalized(input: &str, total: usize) -> Result<Selection, SelectionError> {
    let mut selection = Selection {
        indices: Vec::new(),
    };

    for token in input.split(',') {
        for index in parse_token(token, total)? {
            selection.push_unique(index);
        }
    }

    Ok(selection)
}

fn parse_token(token: &str, total: usize) -> Result<std::ops::RangeInclusive<usize>, SelectionError> {
    let invalid = || SelectionError::InvalidSelection {
        token: token.to_string(),
    };
    let out_of_range = || SelectionError::OutOfRange {
        token: token.to_string(),
        total,
    };

    if total == 0 {
        return Err(out_of_range());
    }

    if token == "all" {
        return Ok(1..=total);
    }

    if let Some(count) = token.strip_prefix('f') {
        let count = parse_count(count).ok_or_else(invalid)?;
        return Ok(1..=count.min(total));
    }

    if let Some(count) = token.strip_prefix('l') {
        let count = parse_count(count).ok_or_else(invalid)?;
        return Ok(total - count.min(total) + 1..=total);
    }

    if let Some((start, end)) = token.split_once('-') {
        let start = parse_number(start).ok_or_else(invalid)?;
        let end = parse_number(end).ok_or_else(invalid)?;
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        if low < 1 || high > total {
            return Err(out_of_range());
        }
        return Ok(low..=high);
    }

    let index = parse_number(token).ok_or_else(invalid)?;
    if index < 1 || index > total {
        return Err(out_of_range());
    }
    Ok(index..=index)
}

/// A plain run of ASCII digits; rejects signs and empty strings
fn parse_number(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Counts for `f`/`l` must be at least one
fn parse_count(s: &str) -> Option<usize> {
    parse_number(s).filter(|&n| n > 0)
}
