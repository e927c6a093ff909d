//! Prompt and forfeit content.
//!
//! The protocol only needs one thing from content: for a category name, a
//! non-empty list of prompts and a non-empty list of forfeits. [`Catalog`] is
//! the stock provider, validated up front so draws can never hit an empty
//! pool.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{env::Environment, error::ConfigError};

/// Category that draws from every configured category at once.
pub const MIX_CATEGORY: &str = "mix";

/// Source of prompts and forfeits.
pub trait ContentProvider: Send + Sync {
    /// Content for `category`, or `None` if the category does not exist.
    ///
    /// Must return non-empty pools for every category it knows, including
    /// [`MIX_CATEGORY`].
    fn prompts_and_forfeits(&self, category: &str) -> Option<&ContentPool>;

    /// True if `category` can be selected.
    fn has_category(&self, category: &str) -> bool {
        self.prompts_and_forfeits(category).is_some()
    }
}

/// Prompts and forfeits for one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentPool {
    /// Questions the current player answers.
    #[serde(alias = "questions")]
    prompts: Vec<String>,
    /// Tasks for a player who declines the prompt.
    #[serde(alias = "dares")]
    forfeits: Vec<String>,
}

impl ContentPool {
    /// Build a pool. Emptiness is checked when the pool joins a [`Catalog`].
    pub fn new(prompts: Vec<String>, forfeits: Vec<String>) -> Self {
        Self { prompts, forfeits }
    }

    /// All prompts.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// All forfeits.
    pub fn forfeits(&self) -> &[String] {
        &self.forfeits
    }

    /// Uniformly random prompt, `None` only for an empty pool.
    pub fn draw_prompt<E: Environment>(&self, env: &E) -> Option<String> {
        draw(&self.prompts, env)
    }

    /// Uniformly random forfeit, `None` only for an empty pool.
    pub fn draw_forfeit<E: Environment>(&self, env: &E) -> Option<String> {
        draw(&self.forfeits, env)
    }
}

fn draw<E: Environment>(items: &[String], env: &E) -> Option<String> {
    let index = env.random_below(items.len() as u64) as usize;
    items.get(index).cloned()
}

/// Validated set of categories plus the synthesized [`MIX_CATEGORY`].
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: BTreeMap<String, ContentPool>,
    mix: ContentPool,
}

impl Catalog {
    /// Validate `categories` and build the aggregate pool.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyCatalog`] if there are no categories
    /// - [`ConfigError::EmptyPool`] if any category lacks prompts or forfeits
    /// - [`ConfigError::ReservedCategory`] if a category is named `"mix"`
    pub fn new(categories: BTreeMap<String, ContentPool>) -> Result<Self, ConfigError> {
        if categories.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        for (name, pool) in &categories {
            if name == MIX_CATEGORY {
                return Err(ConfigError::ReservedCategory(name.clone()));
            }
            if pool.prompts.is_empty() {
                return Err(ConfigError::EmptyPool { category: name.clone(), pool: "prompts" });
            }
            if pool.forfeits.is_empty() {
                return Err(ConfigError::EmptyPool { category: name.clone(), pool: "forfeits" });
            }
        }

        // Concatenated in category order, duplicates kept.
        let mix = ContentPool {
            prompts: categories.values().flat_map(|p| p.prompts.iter().cloned()).collect(),
            forfeits: categories.values().flat_map(|p| p.forfeits.iter().cloned()).collect(),
        };

        Ok(Self { categories, mix })
    }

    /// Parse a JSON catalog of the form
    /// `{ "<category>": { "questions": [...], "dares": [...] } }`.
    ///
    /// `prompts` and `forfeits` are accepted as field names too.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let categories: BTreeMap<String, ContentPool> =
            serde_json::from_str(json).map_err(|e| ConfigError::Catalog(e.to_string()))?;
        Self::new(categories)
    }

    /// Configured category names, excluding [`MIX_CATEGORY`].
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// First configured category, the default for new rooms.
    pub fn default_category(&self) -> &str {
        self.categories().next().unwrap_or(MIX_CATEGORY)
    }
}

impl ContentProvider for Catalog {
    fn prompts_and_forfeits(&self, category: &str) -> Option<&ContentPool> {
        if category == MIX_CATEGORY { Some(&self.mix) } else { self.categories.get(category) }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::env::SystemEnv;

    fn pool(prompts: &[&str], forfeits: &[&str]) -> ContentPool {
        ContentPool::new(
            prompts.iter().map(ToString::to_string).collect(),
            forfeits.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn mix_concatenates_without_dedup() {
        let mut categories = BTreeMap::new();
        categories.insert("a".to_owned(), pool(&["p1", "shared"], &["f1"]));
        categories.insert("b".to_owned(), pool(&["shared"], &["f2", "f3"]));
        let catalog = Catalog::new(categories).unwrap();

        let mix = catalog.prompts_and_forfeits(MIX_CATEGORY).unwrap();
        assert_eq!(mix.prompts(), ["p1", "shared", "shared"]);
        assert_eq!(mix.forfeits(), ["f1", "f2", "f3"]);
    }

    #[test]
    fn rejects_empty_pools() {
        let mut categories = BTreeMap::new();
        categories.insert("a".to_owned(), pool(&["p"], &[]));
        assert_eq!(
            Catalog::new(categories).unwrap_err(),
            ConfigError::EmptyPool { category: "a".into(), pool: "forfeits" }
        );
        assert_eq!(Catalog::new(BTreeMap::new()).unwrap_err(), ConfigError::EmptyCatalog);
    }

    #[test]
    fn rejects_reserved_name() {
        let mut categories = BTreeMap::new();
        categories.insert("mix".to_owned(), pool(&["p"], &["f"]));
        assert!(matches!(Catalog::new(categories), Err(ConfigError::ReservedCategory(_))));
    }

    #[test]
    fn loads_question_and_dare_json() {
        let catalog = Catalog::from_json(
            r#"{
                "friends": { "questions": ["Q1", "Q2"], "dares": ["D1"] },
                "party": { "prompts": ["P1"], "forfeits": ["F1"] }
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.categories().collect::<Vec<_>>(), ["friends", "party"]);
        assert_eq!(catalog.default_category(), "friends");
        assert!(catalog.has_category("mix"));
        assert!(!catalog.has_category("nope"));
        assert_eq!(catalog.prompts_and_forfeits("party").unwrap().forfeits(), ["F1"]);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(Catalog::from_json("{ nope"), Err(ConfigError::Catalog(_))));
    }

    #[test]
    fn draws_come_from_the_pool() {
        let pool = pool(&["a", "b", "c"], &["x"]);
        for _ in 0..32 {
            let prompt = pool.draw_prompt(&SystemEnv).unwrap();
            assert!(pool.prompts().contains(&prompt));
            assert_eq!(pool.draw_forfeit(&SystemEnv).as_deref(), Some("x"));
        }
    }

    proptest! {
        #[test]
        fn mix_pool_sizes_are_sums(sizes in proptest::collection::vec((1usize..6, 1usize..6), 1..6)) {
            let categories: BTreeMap<String, ContentPool> = sizes
                .iter()
                .enumerate()
                .map(|(i, &(p, f))| {
                    let prompts = (0..p).map(|j| format!("p{j}")).collect();
                    let forfeits = (0..f).map(|j| format!("f{j}")).collect();
                    (format!("cat{i}"), ContentPool::new(prompts, forfeits))
                })
                .collect();
            let catalog = Catalog::new(categories).unwrap();
            let mix = catalog.prompts_and_forfeits(MIX_CATEGORY).unwrap();

            prop_assert_eq!(mix.prompts().len(), sizes.iter().map(|s| s.0).sum::<usize>());
            prop_assert_eq!(mix.forfeits().len(), sizes.iter().map(|s| s.1).sum::<usize>());
        }
    }
}
