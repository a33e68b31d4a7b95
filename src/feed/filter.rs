//! Keyword rules deciding which episodes survive into the rebuilt feed.
//!
//! Each episode is checked against four ordered gates:
//!
//! 1. `keep_title` (when non-empty): the title must contain one of its keywords
//! 2. `keep_description` (when non-empty): likewise for the description
//! 3. `exclude_title`: a title containing any keyword is dropped
//! 4. `exclude_description`: likewise for the description
//!
//! The first failing gate drops the episode. Matching is case-insensitive
//! substring containment, and an empty list never excludes anything.

use serde::Deserialize;

use super::model::Episode;

/// The four keyword lists of a filter job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub keep_title: Vec<String>,
    pub keep_description: Vec<String>,
    pub exclude_title: Vec<String>,
    pub exclude_description: Vec<String>,
}

impl Rules {
    /// Returns true if the episode passes every gate.
    pub fn admits(&self, episode: &Episode) -> bool {
        let title = episode.title.to_lowercase();
        let description = episode.description.to_lowercase();

        if !self.keep_title.is_empty() && !contains_any(&title, &self.keep_title) {
            return false;
        }
        if !self.keep_description.is_empty()
            && !contains_any(&description, &self.keep_description)
        {
            return false;
        }
        if contains_any(&title, &self.exclude_title) {
            return false;
        }
        !contains_any(&description, &self.exclude_description)
    }

    /// True when no list has any keyword, i.e. every episode is admitted.
    pub fn is_empty(&self) -> bool {
        self.keep_title.is_empty()
            && self.keep_description.is_empty()
            && self.exclude_title.is_empty()
            && self.exclude_description.is_empty()
    }

    /// Removes blank keywords, which would otherwise match every episode.
    /// Returns how many were dropped.
    pub fn drop_blank_keywords(&mut self) -> usize {
        let mut dropped = 0;
        for list in [
            &mut self.keep_title,
            &mut self.keep_description,
            &mut self.exclude_title,
            &mut self.exclude_description,
        ] {
            let before = list.len();
            list.retain(|keyword| !keyword.trim().is_empty());
            dropped += before - list.len();
        }
        dropped
    }
}

/// Keeps the episodes admitted by `rules`, preserving their relative order.
pub fn retain(episodes: Vec<Episode>, rules: &Rules) -> Vec<Episode> {
    episodes
        .into_iter()
        .filter(|episode| rules.admits(episode))
        .collect()
}

/// `haystack` must already be lower-cased.
fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}
