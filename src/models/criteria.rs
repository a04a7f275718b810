//! Typed query criteria.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ContextError, ContextResult};
use crate::models::query::QueryParam;

/// Wildcard placement for the pattern-matching criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchMode {
    /// Build the `LIKE` pattern for `value`.
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Equals => value.to_string(),
            Self::Contains => format!("%{value}%"),
            Self::StartsWith => format!("{value}%"),
            Self::EndsWith => format!("%{value}"),
        }
    }
}

/// A single predicate on one property of the target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    Eq {
        property: String,
        value: QueryParam,
    },
    Ne {
        property: String,
        value: QueryParam,
    },
    Between {
        property: String,
        min: QueryParam,
        max: QueryParam,
    },
    Gt {
        property: String,
        value: QueryParam,
    },
    Ge {
        property: String,
        value: QueryParam,
    },
    Lt {
        property: String,
        value: QueryParam,
    },
    Le {
        property: String,
        value: QueryParam,
    },
    Like {
        property: String,
        pattern: String,
        #[serde(default)]
        match_mode: MatchMode,
    },
    /// Case-insensitive like.
    Ilike {
        property: String,
        pattern: String,
        #[serde(default)]
        match_mode: MatchMode,
    },
    IsNull {
        property: String,
    },
    IsNotNull {
        property: String,
    },
}

impl Criterion {
    pub fn property(&self) -> &str {
        match self {
            Self::Eq { property, .. }
            | Self::Ne { property, .. }
            | Self::Between { property, .. }
            | Self::Gt { property, .. }
            | Self::Ge { property, .. }
            | Self::Lt { property, .. }
            | Self::Le { property, .. }
            | Self::Like { property, .. }
            | Self::Ilike { property, .. }
            | Self::IsNull { property }
            | Self::IsNotNull { property } => property,
        }
    }

    fn property_mut(&mut self) -> &mut String {
        match self {
            Self::Eq { property, .. }
            | Self::Ne { property, .. }
            | Self::Between { property, .. }
            | Self::Gt { property, .. }
            | Self::Ge { property, .. }
            | Self::Lt { property, .. }
            | Self::Le { property, .. }
            | Self::Like { property, .. }
            | Self::Ilike { property, .. }
            | Self::IsNull { property }
            | Self::IsNotNull { property } => property,
        }
    }

    /// Number of positional parameters this criterion contributes.
    pub fn operand_count(&self) -> usize {
        match self {
            Self::Between { .. } => 2,
            Self::IsNull { .. } | Self::IsNotNull { .. } => 0,
            Self::Eq { .. }
            | Self::Ne { .. }
            | Self::Gt { .. }
            | Self::Ge { .. }
            | Self::Lt { .. }
            | Self::Le { .. }
            | Self::Like { .. }
            | Self::Ilike { .. } => 1,
        }
    }

    /// Parse one criterion from its JSON form.
    pub fn from_json(value: &JsonValue) -> ContextResult<Self> {
        Self::deserialize(value).map_err(|e| {
            let kind = value.get("kind").and_then(JsonValue::as_str).unwrap_or("<none>");
            ContextError::unsupported_criterion(format!("kind '{kind}': {e}"))
        })
    }
}

/// An ordered, AND-conjoined list of criteria on one qualified table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaSet {
    /// Qualified name `database.schema.table` of the target table.
    pub table: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl CriteriaSet {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: Vec::new(),
        }
    }

    /// Parse a criteria set from JSON; unknown kinds fail with `UnsupportedCriterion`.
    pub fn from_json(value: &JsonValue) -> ContextResult<Self> {
        let table = value
            .get("table")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ContextError::invalid_input("criteria set without a 'table'"))?;
        let criteria = match value.get("criteria") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(Criterion::from_json)
                .collect::<ContextResult<_>>()?,
            Some(_) => {
                return Err(ContextError::invalid_input(
                    "'criteria' must be an array of criteria",
                ));
            }
        };
        Ok(Self {
            table: table.to_string(),
            criteria,
        })
    }

    pub fn push(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn eq(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Eq {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn ne(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Ne {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn between(
        self,
        property: impl Into<String>,
        min: impl Into<QueryParam>,
        max: impl Into<QueryParam>,
    ) -> Self {
        self.push(Criterion::Between {
            property: property.into(),
            min: min.into(),
            max: max.into(),
        })
    }

    pub fn gt(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Gt {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn ge(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Ge {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn lt(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Lt {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn le(self, property: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(Criterion::Le {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn like(
        self,
        property: impl Into<String>,
        pattern: impl Into<String>,
        match_mode: MatchMode,
    ) -> Self {
        self.push(Criterion::Like {
            property: property.into(),
            pattern: pattern.into(),
            match_mode,
        })
    }

    pub fn ilike(
        self,
        property: impl Into<String>,
        pattern: impl Into<String>,
        match_mode: MatchMode,
    ) -> Self {
        self.push(Criterion::Ilike {
            property: property.into(),
            pattern: pattern.into(),
            match_mode,
        })
    }

    pub fn is_null(self, property: impl Into<String>) -> Self {
        self.push(Criterion::IsNull {
            property: property.into(),
        })
    }

    pub fn is_not_null(self, property: impl Into<String>) -> Self {
        self.push(Criterion::IsNotNull {
            property: property.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter()
    }

    /// Rewrite every property through `resolve`, e.g. property name to column name.
    pub fn map_properties<F>(&self, mut resolve: F) -> ContextResult<Self>
    where
        F: FnMut(&str) -> ContextResult<String>,
    {
        let mut mapped = self.clone();
        for criterion in &mut mapped.criteria {
            let column = resolve(criterion.property())?;
            *criterion.property_mut() = column;
        }
        Ok(mapped)
    }
}
