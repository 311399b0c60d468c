use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "DSA")]
    Dsa,
    #[serde(rename = "Web Development")]
    WebDevelopment,
    #[serde(rename = "Project")]
    Project,
    #[serde(rename = "Communication")]
    Communication,
    #[serde(rename = "Aptitude")]
    Aptitude,
    #[serde(rename = "Core Subjects")]
    CoreSubjects,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Dsa,
        Category::WebDevelopment,
        Category::Project,
        Category::Communication,
        Category::Aptitude,
        Category::CoreSubjects,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Dsa => "DSA",
            Category::WebDevelopment => "Web Development",
            Category::Project => "Project",
            Category::Communication => "Communication",
            Category::Aptitude => "Aptitude",
            Category::CoreSubjects => "Core Subjects",
            Category::Other => "Other",
        }
    }
}

/// Categories sort by label so grouped output reads alphabetically.
impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        match Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
        {
            Some(category) => Ok(category),
            None => bail!(
                "Unknown category: {trimmed}. Expected one of: {}",
                Self::ALL
                    .iter()
                    .map(|category| category.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}
