use std::fmt;

use serde::{Serialize, Serializer};

/// Closed set of news categories. The discriminant is the dataset label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Politics = 0,
    Sport = 1,
    Technology = 2,
    Entertainment = 3,
    Business = 4,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Politics,
        Category::Sport,
        Category::Technology,
        Category::Entertainment,
        Category::Business,
    ];

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(Category::Politics),
            1 => Some(Category::Sport),
            2 => Some(Category::Technology),
            3 => Some(Category::Entertainment),
            4 => Some(Category::Business),
            _ => None,
        }
    }

    pub fn label(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Sport => "Sport",
            Category::Technology => "Technology",
            Category::Entertainment => "Entertainment",
            Category::Business => "Business",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Politics => {
                "Government, elections, policies, international relations, politicians"
            }
            Category::Sport => "Sports events, athletes, competitions, games",
            Category::Technology => {
                "Tech companies, software, hardware, innovations, digital trends"
            }
            Category::Entertainment => "Movies, music, celebrities, TV shows, arts, culture",
            Category::Business => "Economy, finance, markets, companies, business deals",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
