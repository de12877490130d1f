//! Signature rule definitions.
//!
//! Provides structures for defining detection rules over raw memory bytes,
//! similar to YARA format: named string/byte patterns combined under a
//! boolean condition. Hex patterns support `??` wildcard bytes, which the
//! family signatures rely on to mask register-dependent ModRM bytes.

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pattern type for string matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Plain text (case-sensitive)
    Text,
    /// Hex bytes pattern, `??` allowed as a single-byte wildcard
    Hex,
}

/// A single masked byte of a compiled hex pattern.
///
/// `None` matches any byte.
pub type MaskedByte = Option<u8>;

/// A string pattern in a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringPattern {
    /// Pattern identifier (e.g., "$a")
    pub id: String,
    /// The pattern content
    pub pattern: String,
    /// Pattern type
    pub pattern_type: PatternType,
    /// Compiled regex (for text patterns)
    #[serde(skip)]
    pub compiled: Option<Regex>,
    /// Compiled masked bytes (for hex patterns)
    #[serde(skip)]
    pub masked_bytes: Option<Vec<MaskedByte>>,
}

impl StringPattern {
    /// Create a new text pattern.
    pub fn text(id: &str, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            pattern_type: PatternType::Text,
            compiled: None,
            masked_bytes: None,
        }
    }

    /// Create a hex pattern.
    pub fn hex(id: &str, hex: &str) -> Self {
        Self {
            id: id.to_string(),
            pattern: hex.to_string(),
            pattern_type: PatternType::Hex,
            compiled: None,
            masked_bytes: None,
        }
    }

    /// Compile the pattern for matching.
    pub fn compile(&mut self) -> Result<(), String> {
        match self.pattern_type {
            PatternType::Text => {
                let escaped = regex::escape(&self.pattern);
                self.compiled = Some(
                    Regex::new(&escaped)
                        .map_err(|e| format!("Failed to compile pattern: {}", e))?,
                );
            }
            PatternType::Hex => {
                self.masked_bytes = Some(Self::parse_hex(&self.pattern)?);
            }
        }
        Ok(())
    }

    /// Parse a hex string with optional `??` wildcards into masked bytes.
    fn parse_hex(hex: &str) -> Result<Vec<MaskedByte>, String> {
        let cleaned = hex.replace([' ', '\n', '\r', '\t'], "");

        if cleaned.len() % 2 != 0 {
            return Err(format!("Odd-length hex pattern: {}", hex));
        }

        let mut bytes = Vec::with_capacity(cleaned.len() / 2);
        let chars: Vec<char> = cleaned.chars().collect();

        for pair in chars.chunks(2) {
            if pair == ['?', '?'] {
                bytes.push(None);
            } else {
                let text: String = pair.iter().collect();
                let decoded =
                    hex::decode(&text).map_err(|e| format!("Invalid hex '{}': {}", text, e))?;
                bytes.push(Some(decoded[0]));
            }
        }

        if bytes.is_empty() {
            return Err("Empty hex pattern".to_string());
        }

        Ok(bytes)
    }

    /// Check if pattern matches in data, returning all match offsets.
    pub fn matches(&self, data: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();

        match self.pattern_type {
            PatternType::Text => {
                if let Some(ref regex) = self.compiled {
                    for m in regex.find_iter(data) {
                        offsets.push(m.start());
                    }
                }
            }
            PatternType::Hex => {
                if let Some(ref masked) = self.masked_bytes {
                    if data.len() < masked.len() {
                        return offsets;
                    }
                    for i in 0..=data.len() - masked.len() {
                        let hit = masked
                            .iter()
                            .zip(&data[i..i + masked.len()])
                            .all(|(m, b)| m.map_or(true, |expected| expected == *b));
                        if hit {
                            offsets.push(i);
                        }
                    }
                }
            }
        }

        offsets
    }
}

/// Condition type for rule matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// All patterns must match
    All,
    /// Any pattern must match
    Any,
    /// Specific pattern must match
    Pattern(String),
    /// Specific pattern must match at an exact offset
    PatternAt { id: String, offset: usize },
    /// Logical AND
    And(Box<Condition>, Box<Condition>),
    /// Logical OR
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Evaluate the condition against match results.
    pub fn evaluate(&self, matches: &HashMap<String, Vec<usize>>) -> bool {
        match self {
            Condition::All => matches.values().all(|m| !m.is_empty()),
            Condition::Any => matches.values().any(|m| !m.is_empty()),
            Condition::Pattern(id) => matches.get(id).is_some_and(|m| !m.is_empty()),
            Condition::PatternAt { id, offset } => {
                matches.get(id).is_some_and(|m| m.contains(offset))
            }
            Condition::And(a, b) => a.evaluate(matches) && b.evaluate(matches),
            Condition::Or(a, b) => a.evaluate(matches) || b.evaluate(matches),
        }
    }
}

/// A signature rule for one implant family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRule {
    /// Rule name
    pub name: String,
    /// Rule description
    pub description: Option<String>,
    /// String patterns
    pub strings: Vec<StringPattern>,
    /// Condition for matching
    pub condition: Condition,
    /// Whether the rule is enabled
    pub enabled: bool,
}

impl SignatureRule {
    /// Create a new rule.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            strings: Vec::new(),
            condition: Condition::Any,
            enabled: true,
        }
    }

    /// Set rule description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Add a string pattern.
    pub fn with_string(mut self, pattern: StringPattern) -> Self {
        self.strings.push(pattern);
        self
    }

    /// Set the condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Compile all patterns.
    pub fn compile(&mut self) -> Result<(), String> {
        for pattern in &mut self.strings {
            pattern.compile()?;
        }
        Ok(())
    }

    /// Match the rule against data.
    pub fn matches(&self, data: &[u8]) -> Option<RuleMatch> {
        if !self.enabled {
            return None;
        }

        let mut pattern_matches: HashMap<String, Vec<usize>> = HashMap::new();

        for pattern in &self.strings {
            let offsets = pattern.matches(data);
            pattern_matches.insert(pattern.id.clone(), offsets);
        }

        if self.condition.evaluate(&pattern_matches) {
            let first_offset = pattern_matches
                .values()
                .flat_map(|m| m.iter().copied())
                .min()
                .unwrap_or(0);
            Some(RuleMatch {
                rule_name: self.name.clone(),
                first_offset,
            })
        } else {
            None
        }
    }
}

/// Result of a rule match.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// Name of the matched rule
    pub rule_name: String,
    /// Lowest matching offset across all patterns
    pub first_offset: usize,
}
