//! Beverage recipes and the read-only recipe book.

use indexmap::IndexMap;

use crate::config::ConfigError;

/// Ingredient requirements for one beverage, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    name: String,
    ingredients: IndexMap<String, u32>,
}

impl Recipe {
    /// Build a recipe. Every quantity must be positive and the recipe must
    /// name at least one ingredient.
    pub fn new(
        name: impl Into<String>,
        ingredients: IndexMap<String, u32>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName { what: "beverage" });
        }
        if ingredients.is_empty() {
            return Err(ConfigError::EmptyRecipe { beverage: name });
        }
        for (ingredient, quantity) in &ingredients {
            if ingredient.trim().is_empty() {
                return Err(ConfigError::EmptyName { what: "ingredient" });
            }
            if *quantity == 0 {
                return Err(ConfigError::ZeroQuantity {
                    beverage: name,
                    ingredient: ingredient.clone(),
                });
            }
        }
        Ok(Self { name, ingredients })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ingredients(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ingredients.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn requires(&self, ingredient: &str) -> Option<u32> {
        self.ingredients.get(ingredient).copied()
    }
}

/// Immutable beverage name -> recipe mapping, built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: IndexMap<String, Recipe>,
}

impl RecipeBook {
    /// Later recipes with a duplicate name replace earlier ones.
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        Self {
            recipes: recipes
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
        }
    }

    pub fn from_compositions(
        compositions: IndexMap<String, IndexMap<String, u32>>,
    ) -> Result<Self, ConfigError> {
        let recipes = compositions
            .into_iter()
            .map(|(name, ingredients)| Recipe::new(name, ingredients))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(recipes))
    }

    /// Unknown names are a normal outcome, not a fault.
    pub fn lookup(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
