// Sort key chain parsing

use serde::Serialize;
use std::fmt;

use crate::error::DirectoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortCriterion {
    Nearest,
    OutOfFunds,
    Newest,
    Updated,
    Bigger,
}

impl SortCriterion {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "nearest" => Some(SortCriterion::Nearest),
            "out_of_funds" => Some(SortCriterion::OutOfFunds),
            "newest" => Some(SortCriterion::Newest),
            "updated" => Some(SortCriterion::Updated),
            "bigger" => Some(SortCriterion::Bigger),
            _ => None,
        }
    }

    pub fn default_direction(self) -> Direction {
        match self {
            SortCriterion::Nearest | SortCriterion::OutOfFunds => Direction::Asc,
            SortCriterion::Newest | SortCriterion::Updated | SortCriterion::Bigger => {
                Direction::Desc
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub criterion: SortCriterion,
    pub direction: Direction,
}

impl SortKey {
    pub fn new(criterion: SortCriterion, direction: Direction) -> Self {
        Self {
            criterion,
            direction,
        }
    }
}

/// Ordered chain of sort keys; later keys only break ties left by earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortChain(Vec<SortKey>);

impl SortChain {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }

    /// Parses `criterion[:ASC|:DESC](;criterion[:ASC|:DESC])*`.
    pub fn parse(raw: Option<&str>) -> Result<Self, DirectoryError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };

        let mut keys: Vec<SortKey> = Vec::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, direction) = match part.split_once(':') {
                Some((name, dir)) => (name, Some(dir)),
                None => (part, None),
            };
            let criterion = SortCriterion::parse(name)
                .ok_or_else(|| DirectoryError::InvalidSort(part.to_string()))?;
            let direction = match direction.map(|d| d.trim().to_uppercase()) {
                None => criterion.default_direction(),
                Some(d) if d == "ASC" => Direction::Asc,
                Some(d) if d == "DESC" => Direction::Desc,
                Some(_) => return Err(DirectoryError::InvalidSort(part.to_string())),
            };
            if keys.iter().any(|k| k.criterion == criterion) {
                return Err(DirectoryError::InvalidSort(format!(
                    "{} listed more than once",
                    name.trim()
                )));
            }
            keys.push(SortKey::new(criterion, direction));
        }
        Ok(Self(keys))
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn requires_origin(&self) -> bool {
        self.0.iter().any(|k| k.criterion == SortCriterion::Nearest)
    }

    /// An empty chain ranks by beneficiary count, descending.
    pub fn or_default(&self) -> SortChain {
        if self.0.is_empty() {
            SortChain(vec![SortKey::new(SortCriterion::Bigger, Direction::Desc)])
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for SortChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|k| format!("{:?}:{}", k.criterion, k.direction.as_str()))
            .collect();
        f.write_str(&parts.join(";"))
    }
}
