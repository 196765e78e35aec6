use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Expected column headers of the recipe dataset
const TITLE_COL: &str = "title";
const DIRECTIONS_COL: &str = "directions";
const NER_COL: &str = "NER";
const INGREDIENTS_COL: &str = "ingredients";

/// One recipe as stored in the collection. Field names match the stored properties.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecipeRow {
    pub title: String,
    pub directions: String,
    #[serde(rename = "NER")]
    pub ner: String,
    pub ingredients: String,
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))
}

pub fn load_recipe_rows(csv_path: &Path) -> Result<Vec<RecipeRow>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("Recipe CSV file not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open recipe CSV file at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();
    let title_idx = column_index(&headers, TITLE_COL)?;
    let directions_idx = column_index(&headers, DIRECTIONS_COL)?;
    let ner_idx = column_index(&headers, NER_COL)?;
    let ingredients_idx = column_index(&headers, INGREDIENTS_COL)?;

    let mut rows = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;
        let field = |idx: usize| record.get(idx).unwrap_or_default().trim().to_string();

        let title = field(title_idx);
        if title.is_empty() {
            continue;
        }
        rows.push(RecipeRow {
            title,
            directions: field(directions_idx),
            ner: field(ner_idx),
            ingredients: field(ingredients_idx),
        });
    }

    if rows.is_empty() {
        return Err(anyhow::anyhow!("No valid recipes loaded from {:?}", csv_path));
    }

    Ok(rows)
}
