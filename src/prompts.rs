//! Prompt contracts for the two generation rounds.
//!
//! The extraction prompt fixes the exact list-literal shape that
//! [`crate::recipe_parser::parse_extraction`] understands; keep the two in step.

use crate::nutritional_matcher::NutrientSummary;
use crate::recipe_parser::{IngredientSpec, NutrientTarget, DEFAULT_NUTRIENT_TARGET};

fn quoted_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = items.into_iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

fn target_list(target: &NutrientTarget) -> String {
    format!(
        "[{}, {}, {}, {}]",
        target.calories(),
        target.protein(),
        target.carbs(),
        target.fat()
    )
}

/// Round one: turn free text into `ingredients`, `weights` and `nutrients` lists.
pub fn extraction_prompt(user_input: &str) -> String {
    let default_target = target_list(&DEFAULT_NUTRIENT_TARGET);
    format!(
        r#"Do not write program code.

Extract food data from the user's message. The message describes available ingredients, sometimes their quantities, and sometimes nutrient goals for one meal.

1. List every ingredient mentioned in an `ingredients` list.
2. List the amount of each ingredient in a `weights` list, in the same order. If no amount is given, estimate a common serving size.
3. If nutrient goals are given, put them in a `nutrients` list as calories, protein, carbs, fat. If they are missing, use {default_target}.

The user's message is:
{user_input}

Answer with exactly three lines and nothing else:

ingredients = ['ingredient1', 'ingredient2', 'ingredient3']
weights = ['weight1', 'weight2', 'weight3']
nutrients = [calories, protein, carbs, fat]

Rules:
- Numbers are integers such as 500, 50, 30, never 500.0 or 50.0.
- Every weight is a quoted string. Use a unit for bulk ingredients ('200g', '100ml', '1 tsp') and a bare count for individual items such as eggs or apples ('3').
- `nutrients` holds exactly four values in the order calories, protein, carbs, fat.
- Never write None or null; estimate a value instead.
- Quote every ingredient name.

Example:
ingredients = ['chicken', 'rice', 'curry', 'eggs', 'mustard', 'salt', 'olive oil']
weights = ['200g', '100g', '50g', '3', '5ml', '1 tsp', '10ml']
nutrients = {default_target}

Do not add explanations, code, or any other text."#,
        default_target = default_target,
        user_input = user_input.trim(),
    )
}

/// Round two: write the recipe under the extracted constraints.
pub fn final_prompt(
    ingredients: &[IngredientSpec],
    nutrient_summary: &NutrientSummary,
    reference_recipe: &str,
    target: &NutrientTarget,
) -> String {
    let names = quoted_list(ingredients.iter().map(|spec| spec.name.as_str()));
    let weights = quoted_list(ingredients.iter().map(|spec| spec.weight.as_str()));
    format!(
        r#"You are an expert in nutrition and cooking. Create a recipe that uses only the available ingredients and meets specific nutritional goals.

Available ingredients: {names}
Amount of each ingredient (with its unit, or a bare count): {weights}
Nutritional values of each ingredient (calories, protein, carbs, fat):
{summary}
A recipe to use as inspiration:
{reference}

Create a unique recipe that:
- Contains in total (calories, protein, carbs, fat): {target}, within a tolerance of ±5%.
- Uses only the available ingredients.
- Gives detailed preparation steps, ingredient proportions and cooking methods.
- Works as a complete meal.

Format the answer as:
- Recipe name
- Ingredients with precise quantities (grams or other measures)
- Nutritional values of the finished dish (calories, protein, carbs, fat)
- Step-by-step preparation instructions

Write as a human nutrition and cooking expert. Do not mention yourself or anything suggesting the recipe was generated automatically.

IMPORTANT: Use only the ingredients and amounts listed above, or less. With 200g of chicken and 100g of rice available, the recipe may use at most 200g of chicken and 100g of rice.

If the nutritional goals cannot be met with these ingredients, explain the limitation and suggest adjustments."#,
        names = names,
        weights = weights,
        summary = nutrient_summary,
        reference = reference_recipe,
        target = target_list(target),
    )
}
