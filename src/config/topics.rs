// src/config/topics.rs
//! Ordered topic configuration. Order defines section order in the digest.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Topic {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub semantic_description: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Topic {
    pub fn new(key: &str, label: &str, weight: f64, keywords: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            weight,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            semantic_description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.semantic_description = Some(description.to_string());
        self
    }

    /// Label shown as the section title; falls back to the key.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.key
        } else {
            &self.label
        }
    }

    /// Text embedded for this topic: explicit description, else `label: kw1, kw2`.
    pub fn semantic_text(&self) -> String {
        match self.semantic_description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => format!("{}: {}", self.display_label(), self.keywords.join(", ")),
        }
    }
}

/// Validated, ordered topic list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topics(Vec<Topic>);

impl Topics {
    /// Validate once: unique non-empty keys, finite non-negative weights.
    /// Blank keywords are dropped (an empty needle would match everywhere).
    pub fn new(topics: Vec<Topic>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(topics.len());
        for mut t in topics {
            t.key = t.key.trim().to_string();
            if t.key.is_empty() {
                bail!("topic with empty key");
            }
            if !seen.insert(t.key.clone()) {
                bail!("duplicate topic key `{}`", t.key);
            }
            if !t.weight.is_finite() || t.weight < 0.0 {
                bail!("topic `{}` has invalid weight {}", t.key, t.weight);
            }
            let before = t.keywords.len();
            t.keywords.retain(|k| !k.trim().is_empty());
            if t.keywords.len() != before {
                tracing::warn!(topic = %t.key, dropped = before - t.keywords.len(), "blank keywords ignored");
            }
            out.push(t);
        }
        Ok(Self(out))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Topic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Topic> {
        self.0.iter().find(|t| t.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.key.as_str())
    }
}

impl<'a> IntoIterator for &'a Topics {
    type Item = &'a Topic;
    type IntoIter = std::slice::Iter<'a, Topic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
