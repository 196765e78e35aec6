use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::literal::{parse_literal, Literal, LiteralError};

/// Calories, protein, carbs and fat used when the completion names no target.
pub const DEFAULT_NUTRIENT_TARGET: NutrientTarget = NutrientTarget([600, 60, 40, 20]);

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IngredientSpec {
    pub name: String,
    pub weight: String,
}

/// `(calories, protein, carbs, fat)` goal for the final recipe.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NutrientTarget(pub [u32; 4]);

impl NutrientTarget {
    pub fn calories(&self) -> u32 {
        self.0[0]
    }

    pub fn protein(&self) -> u32 {
        self.0[1]
    }

    pub fn carbs(&self) -> u32 {
        self.0[2]
    }

    pub fn fat(&self) -> u32 {
        self.0[3]
    }
}

impl Default for NutrientTarget {
    fn default() -> Self {
        DEFAULT_NUTRIENT_TARGET
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed `{label}` list: {source}")]
    Literal {
        label: &'static str,
        #[source]
        source: LiteralError,
    },
    #[error("`{label}` must be a list, found {found}")]
    NotAList { label: &'static str, found: &'static str },
    #[error("`{label}` entry {index} has unsupported type {found}")]
    InvalidEntry {
        label: &'static str,
        index: usize,
        found: &'static str,
    },
    #[error("`{label}` entry {index} is out of range: {value}")]
    NumberOutOfRange {
        label: &'static str,
        index: usize,
        value: String,
    },
    #[error("`nutrients` entry {index} is not a non-negative number: {value}")]
    InvalidNutrient { index: usize, value: String },
    #[error("`nutrients` must hold exactly 4 values (calories, protein, carbs, fat), found {0}")]
    NutrientArity(usize),
    #[error("extraction length mismatch: {ingredients} ingredients but {weights} weights")]
    LengthMismatch { ingredients: usize, weights: usize },
}

/// The three lists found in an extraction completion. `None` means the label was absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLists {
    pub ingredients: Option<Vec<String>>,
    pub weights: Option<Vec<String>>,
    pub nutrients: Option<Vec<u32>>,
}

impl ExtractedLists {
    /// Pairs names with weights by position.
    ///
    /// Lengths must agree only when both lists are present. A missing `weights` list leaves
    /// every weight empty; a missing `ingredients` list yields no specs.
    pub fn ingredient_specs(&self) -> Result<Vec<IngredientSpec>, ExtractionError> {
        if let (Some(names), Some(weights)) = (&self.ingredients, &self.weights) {
            if names.len() != weights.len() {
                return Err(ExtractionError::LengthMismatch {
                    ingredients: names.len(),
                    weights: weights.len(),
                });
            }
        }
        let names = self.ingredients.as_deref().unwrap_or_default();
        let weights = self.weights.as_deref().unwrap_or_default();
        Ok(names
            .iter()
            .enumerate()
            .map(|(idx, name)| IngredientSpec {
                name: name.clone(),
                weight: weights.get(idx).cloned().unwrap_or_default(),
            })
            .collect())
    }

    /// The parsed target, or the default when the `nutrients` label was absent.
    pub fn nutrient_target(&self) -> Result<NutrientTarget, ExtractionError> {
        match &self.nutrients {
            None => Ok(DEFAULT_NUTRIENT_TARGET),
            Some(values) => {
                let arr: [u32; 4] = values
                    .as_slice()
                    .try_into()
                    .map_err(|_| ExtractionError::NutrientArity(values.len()))?;
                Ok(NutrientTarget(arr))
            }
        }
    }
}

fn label_pattern(label: &str) -> Regex {
    // The pattern is built from a fixed identifier, so it always compiles.
    Regex::new(&format!(r"\b{}\s*=\s*(\[[^\]]*\])", label)).expect("static label pattern")
}

fn patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            label_pattern("ingredients"),
            label_pattern("weights"),
            label_pattern("nutrients"),
        ]
    })
}

/// Returns the verbatim `[...]` text assigned to `label`, if any.
fn find_list<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn decode_list(label: &'static str, raw: &str) -> Result<Vec<Literal>, ExtractionError> {
    match parse_literal(raw).map_err(|source| ExtractionError::Literal { label, source })? {
        Literal::List(items) => Ok(items),
        other => Err(ExtractionError::NotAList {
            label,
            found: other.kind(),
        }),
    }
}

// 2^63: the first integral value `i64` cannot hold.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Integral values print without a fraction. `None` when the value does not fit an `i64`.
fn number_text(value: f64) -> Option<String> {
    if !value.is_finite() || value.abs() >= I64_LIMIT {
        return None;
    }
    if value.fract() == 0.0 {
        Some((value as i64).to_string())
    } else {
        Some(value.to_string())
    }
}

fn to_text(label: &'static str, index: usize, item: Literal) -> Result<String, ExtractionError> {
    match item {
        Literal::Str(s) => Ok(s.trim().to_string()),
        Literal::Int(i) => Ok(i.to_string()),
        Literal::Float(x) => number_text(x).ok_or_else(|| ExtractionError::NumberOutOfRange {
            label,
            index,
            value: x.to_string(),
        }),
        other => Err(ExtractionError::InvalidEntry {
            label,
            index,
            found: other.kind(),
        }),
    }
}

fn to_nutrient(index: usize, item: Literal) -> Result<u32, ExtractionError> {
    let invalid = |value: String| ExtractionError::InvalidNutrient { index, value };
    let value = match item {
        Literal::Int(i) => i as f64,
        Literal::Float(x) => x,
        Literal::Str(s) => s.trim().parse::<f64>().map_err(|_| invalid(s.clone()))?,
        Literal::List(_) => {
            return Err(ExtractionError::InvalidEntry {
                label: "nutrients",
                index,
                found: "list",
            })
        }
    };
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(invalid(value.to_string()));
    }
    Ok(value.round() as u32)
}

/// Extracts the `ingredients`, `weights` and `nutrients` lists from a completion.
///
/// Missing labels yield `None`. A label whose bracket content is not a plain literal list
/// fails the whole extraction, so untrusted completions are never evaluated.
pub fn parse_extraction(response: &str) -> Result<ExtractedLists, ExtractionError> {
    let [ingredients_re, weights_re, nutrients_re] = patterns();

    let ingredients = find_list(ingredients_re, response)
        .map(|raw| {
            decode_list("ingredients", raw)?
                .into_iter()
                .enumerate()
                .map(|(idx, item)| to_text("ingredients", idx, item))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let weights = find_list(weights_re, response)
        .map(|raw| {
            decode_list("weights", raw)?
                .into_iter()
                .enumerate()
                .map(|(idx, item)| to_text("weights", idx, item))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let nutrients = find_list(nutrients_re, response)
        .map(|raw| {
            decode_list("nutrients", raw)?
                .into_iter()
                .enumerate()
                .map(|(idx, item)| to_nutrient(idx, item))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(ExtractedLists {
        ingredients,
        weights,
        nutrients,
    })
}
