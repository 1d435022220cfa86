//! Spending category taxonomy.
//!
//! The set of categories is closed: every table keyed by category (constraint
//! fractions, group membership, feature slots) is an exhaustive `match`, so a
//! new category cannot silently fall through a lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Groceries,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Healthcare,
    Investment,
    Education,
    Savings,
}

/// Named partitions that drive constraint and risk-multiplier logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryGroup {
    Essential,
    Discretionary,
    Investment,
}

impl Category {
    /// Fixed taxonomy order. Feature vectors and persisted metadata follow it.
    pub const ALL: [Category; 10] = [
        Category::Food,
        Category::Groceries,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Healthcare,
        Category::Investment,
        Category::Education,
        Category::Savings,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Groceries => "groceries",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Bills => "bills",
            Category::Healthcare => "healthcare",
            Category::Investment => "investment",
            Category::Education => "education",
            Category::Savings => "savings",
        }
    }

    /// Position of this category in [`Category::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn in_group(self, group: CategoryGroup) -> bool {
        match group {
            CategoryGroup::Essential => matches!(
                self,
                Category::Groceries | Category::Bills | Category::Healthcare | Category::Transport
            ),
            CategoryGroup::Discretionary => matches!(
                self,
                Category::Entertainment | Category::Shopping | Category::Food
            ),
            CategoryGroup::Investment => matches!(self, Category::Investment | Category::Savings),
        }
    }

    pub fn is_essential(self) -> bool {
        self.in_group(CategoryGroup::Essential)
    }

    pub fn is_discretionary(self) -> bool {
        self.in_group(CategoryGroup::Discretionary)
    }

    /// Investment and savings: the financial-instrument categories.
    pub fn is_investment(self) -> bool {
        self.in_group(CategoryGroup::Investment)
    }

    pub fn members(group: CategoryGroup) -> impl Iterator<Item = Category> {
        Self::ALL.into_iter().filter(move |c| c.in_group(group))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown spending category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
