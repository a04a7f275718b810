//! Criteria-to-query compiler.
//!
//! Turns a [`CriteriaSet`] into `FROM <table> [WHERE ...]` with `?`
//! placeholders, optionally spliced into an expanded query template. The
//! output still names tables by their qualified model name; see
//! [`crate::query::native`] for the executable form.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{ContextError, ContextResult};
use crate::models::{
    CompiledQuery, CriteriaSet, Criterion, DatabaseType, Model, QualifiedName, QueryParam,
};
use crate::query::template;

static WHERE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("Invalid where regex"));

static FROM_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfrom\s+([\w$-]+)\.([\w$-]+)\.([\w$-]+)").expect("Invalid from regex")
});

/// Predicate fragment and operands for one criterion, with the column
/// rendered through `quote`.
pub fn predicate(criterion: &Criterion, quote: impl Fn(&str) -> String) -> (String, Vec<QueryParam>) {
    let column = quote(criterion.property());
    match criterion {
        Criterion::Eq { value, .. } => (format!("{column} = ?"), vec![value.clone()]),
        Criterion::Ne { value, .. } => (format!("{column} <> ?"), vec![value.clone()]),
        Criterion::Between { min, max, .. } => (
            format!("{column} >= ? AND {column} <= ?"),
            vec![min.clone(), max.clone()],
        ),
        Criterion::Gt { value, .. } => (format!("{column} > ?"), vec![value.clone()]),
        Criterion::Ge { value, .. } => (format!("{column} >= ?"), vec![value.clone()]),
        Criterion::Lt { value, .. } => (format!("{column} < ?"), vec![value.clone()]),
        Criterion::Le { value, .. } => (format!("{column} <= ?"), vec![value.clone()]),
        Criterion::Like {
            pattern,
            match_mode,
            ..
        } => (
            format!("{column} LIKE ?"),
            vec![QueryParam::String(match_mode.apply(pattern))],
        ),
        // Both sides are lower-cased so the parameter keeps its original case.
        Criterion::Ilike {
            pattern,
            match_mode,
            ..
        } => (
            format!("LOWER({column}) LIKE LOWER(?)"),
            vec![QueryParam::String(match_mode.apply(pattern))],
        ),
        Criterion::IsNull { .. } => (format!("{column} IS NULL"), Vec::new()),
        Criterion::IsNotNull { .. } => (format!("{column} IS NOT NULL"), Vec::new()),
    }
}

/// Standard SQL delimited identifier.
fn ansi_quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Extract the target table from the first `FROM db.schema.table` in `query`.
pub fn target_table(query: &str) -> ContextResult<QualifiedName> {
    let caps = FROM_TARGET
        .captures(query)
        .ok_or_else(|| ContextError::ambiguous_query_target(query))?;
    Ok(QualifiedName::new(&caps[1], &caps[2], &caps[3]))
}

/// Compiles criteria, optionally resolving property names against a model.
///
/// Columns are quoted for the configured dialect, or as standard SQL
/// delimited identifiers when none is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCompiler<'m> {
    model: Option<&'m Model>,
    dialect: Option<DatabaseType>,
}

impl QueryCompiler<'static> {
    /// A compiler that uses property names verbatim as column names.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'m> QueryCompiler<'m> {
    /// A compiler that checks the table and maps property names to column names.
    pub fn for_model(model: &'m Model) -> Self {
        Self {
            model: Some(model),
            dialect: None,
        }
    }

    /// Quote columns the way `dialect` does.
    pub fn with_dialect(mut self, dialect: DatabaseType) -> Self {
        self.dialect = Some(dialect);
        self
    }

    fn quote(&self, name: &str) -> String {
        match self.dialect {
            Some(dialect) => dialect.quote_identifier(name),
            None => ansi_quote(name),
        }
    }

    fn resolve(&self, criteria: &CriteriaSet) -> ContextResult<CriteriaSet> {
        let Some(model) = self.model else {
            return Ok(criteria.clone());
        };
        let table = model.table(&criteria.table)?;
        criteria.map_properties(|property| {
            table
                .find_column_by_property(property)
                .or_else(|| table.find_column_by_name(property))
                .map(|c| c.column_name.clone())
                .ok_or_else(|| ContextError::unknown_property(&criteria.table, property))
        })
    }

    fn where_clause(&self, criteria: &CriteriaSet) -> (String, Vec<QueryParam>) {
        let mut fragments = Vec::with_capacity(criteria.len());
        let mut parameters = Vec::new();
        for criterion in criteria.iter() {
            let (fragment, operands) = predicate(criterion, |name| self.quote(name));
            fragments.push(fragment);
            parameters.extend(operands);
        }
        (fragments.join(" AND "), parameters)
    }

    /// `FROM <table>` followed by `WHERE <predicates>` when there are any.
    ///
    /// Fails with `AmbiguousQueryTarget` unless the table is a qualified
    /// `db.schema.table` name.
    pub fn compile(&self, criteria: &CriteriaSet) -> ContextResult<CompiledQuery> {
        let criteria = self.resolve(criteria)?;
        let (clause, parameters) = self.where_clause(&criteria);
        let query = if clause.is_empty() {
            format!("FROM {}", criteria.table)
        } else {
            format!("FROM {} WHERE {}", criteria.table, clause)
        };
        debug!(query = %query, params = parameters.len(), "Compiled criteria");
        targeted(CompiledQuery::new(query, parameters))
    }

    /// Expand `template` against `root` and append the criteria predicate.
    ///
    /// The predicate joins an existing `WHERE` with `AND`, otherwise it opens
    /// one. Template parameters come before criteria parameters.
    pub fn compile_with_template(
        &self,
        template: &str,
        root: &JsonValue,
        criteria: Option<&CriteriaSet>,
    ) -> ContextResult<CompiledQuery> {
        let expanded = template::expand(template, root);
        let Some(criteria) = criteria.filter(|c| !c.is_empty()) else {
            return targeted(expanded);
        };

        let criteria = self.resolve(criteria)?;
        let (clause, criteria_parameters) = self.where_clause(&criteria);
        let keyword = if WHERE_KEYWORD.is_match(&expanded.query) {
            "AND"
        } else {
            "WHERE"
        };
        let query = format!("{} {} {}", expanded.query.trim_end(), keyword, clause);
        let mut parameters = expanded.parameters;
        parameters.extend(criteria_parameters);
        debug!(query = %query, params = parameters.len(), "Compiled template with criteria");
        targeted(CompiledQuery::new(query, parameters))
    }
}

/// Attach the `FROM` target, failing when there is none.
fn targeted(compiled: CompiledQuery) -> ContextResult<CompiledQuery> {
    let target = target_table(&compiled.query)?;
    Ok(compiled.with_target(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Database, MatchMode, Schema, Table};
    use serde_json::json;

    fn model() -> Model {
        let mut model = Model::new(vec![Database::new("crm").with_schema(
            Schema::new("public").with_table(
                Table::new("person")
                    .with_column(Column::new("id", "INTEGER"))
                    .with_column(Column::new("first_name", "VARCHAR").with_property_name("firstName")),
            ),
        )]);
        model.init().unwrap();
        model
    }

    #[test]
    fn test_fragments() {
        let cases = [
            (Criterion::Ne { property: "a".into(), value: 1.into() }, "a <> ?"),
            (Criterion::Gt { property: "a".into(), value: 1.into() }, "a > ?"),
            (Criterion::Ge { property: "a".into(), value: 1.into() }, "a >= ?"),
            (Criterion::Lt { property: "a".into(), value: 1.into() }, "a < ?"),
            (Criterion::Le { property: "a".into(), value: 1.into() }, "a <= ?"),
            (
                Criterion::Between { property: "a".into(), min: 1.into(), max: 2.into() },
                "a >= ? AND a <= ?",
            ),
            (Criterion::IsNull { property: "a".into() }, "a IS NULL"),
            (Criterion::IsNotNull { property: "a".into() }, "a IS NOT NULL"),
        ];
        for (criterion, expected) in cases {
            let (fragment, operands) = predicate(&criterion, str::to_string);
            assert_eq!(fragment, expected);
            assert_eq!(operands.len(), criterion.operand_count());
        }
    }

    #[test]
    fn test_ilike_lowers_both_sides() {
        let (fragment, operands) = predicate(
            &Criterion::Ilike {
                property: "name".into(),
                pattern: "Ann".into(),
                match_mode: MatchMode::StartsWith,
            },
            ansi_quote,
        );
        assert_eq!(fragment, "LOWER(\"name\") LIKE LOWER(?)");
        assert_eq!(operands, vec![QueryParam::from("Ann%")]);
    }

    #[test]
    fn test_compile_joins_with_and() {
        let criteria = CriteriaSet::new("db.sch.t").eq("a", 1).is_null("b").gt("c", 2);
        let compiled = QueryCompiler::new().compile(&criteria).unwrap();
        assert_eq!(
            compiled.query,
            r#"FROM db.sch.t WHERE "a" = ? AND "b" IS NULL AND "c" > ?"#
        );
        assert_eq!(compiled.parameters, vec![QueryParam::Int(1), QueryParam::Int(2)]);
        assert_eq!(compiled.target, Some(QualifiedName::new("db", "sch", "t")));
    }

    #[test]
    fn test_columns_are_quoted_for_dialect() {
        let criteria = CriteriaSet::new("db.sch.t").eq("order", 1).like("user", "a", MatchMode::Contains);
        let compiled = QueryCompiler::new()
            .with_dialect(DatabaseType::MySQL)
            .compile(&criteria)
            .unwrap();
        assert_eq!(compiled.query, "FROM db.sch.t WHERE `order` = ? AND `user` LIKE ?");

        let compiled = QueryCompiler::new()
            .with_dialect(DatabaseType::SQLite)
            .compile(&CriteriaSet::new("db.sch.t").is_null("say \"hi\""))
            .unwrap();
        assert_eq!(compiled.query, r#"FROM db.sch.t WHERE "say ""hi""" IS NULL"#);
    }

    #[test]
    fn test_compile_requires_qualified_target() {
        let err = QueryCompiler::new()
            .compile(&CriteriaSet::new("person").eq("id", 1))
            .unwrap_err();
        assert!(matches!(err, ContextError::AmbiguousQueryTarget { .. }));

        let criteria = CriteriaSet::new("db.sch.t").eq("y", 5);
        let err = QueryCompiler::new()
            .compile_with_template("SELECT 1", &json!({}), Some(&criteria))
            .unwrap_err();
        assert!(matches!(err, ContextError::AmbiguousQueryTarget { .. }));

        let err = QueryCompiler::new()
            .compile_with_template("SELECT 1", &json!({}), None)
            .unwrap_err();
        assert!(matches!(err, ContextError::AmbiguousQueryTarget { .. }));
    }

    #[test]
    fn test_template_without_where_opens_one() {
        let criteria = CriteriaSet::new("db.sch.t").eq("y", 5);
        let compiled = QueryCompiler::new()
            .compile_with_template("SELECT x FROM db.sch.t", &json!({}), Some(&criteria))
            .unwrap();
        assert_eq!(compiled.query, r#"SELECT x FROM db.sch.t WHERE "y" = ?"#);
    }

    #[test]
    fn test_template_where_is_case_insensitive() {
        let criteria = CriteriaSet::new("db.sch.t").eq("y", 5);
        let compiled = QueryCompiler::new()
            .compile_with_template(
                "select x from db.sch.t where x > %{min}",
                &json!({"min": 1}),
                Some(&criteria),
            )
            .unwrap();
        assert_eq!(compiled.query, r#"select x from db.sch.t where x > ? AND "y" = ?"#);
        assert_eq!(compiled.parameters, vec![QueryParam::Int(1), QueryParam::Int(5)]);
    }

    #[test]
    fn test_model_resolves_property_names() {
        let model = model();
        let criteria = CriteriaSet::new("crm.public.person").eq("firstName", "Ann");
        let compiled = QueryCompiler::for_model(&model).compile(&criteria).unwrap();
        assert_eq!(compiled.query, r#"FROM crm.public.person WHERE "first_name" = ?"#);

        let err = QueryCompiler::for_model(&model)
            .compile(&CriteriaSet::new("crm.public.person").eq("age", 3))
            .unwrap_err();
        assert!(matches!(err, ContextError::UnknownProperty { .. }));

        let err = QueryCompiler::for_model(&model)
            .compile(&CriteriaSet::new("crm.public.nobody"))
            .unwrap_err();
        assert!(matches!(err, ContextError::TableNotFound { .. }));
    }

    #[test]
    fn test_target_table() {
        let name = target_table("select * FROM crm.public.person p WHERE p.id = ?").unwrap();
        assert_eq!(name, QualifiedName::new("crm", "public", "person"));

        let name = target_table("SELECT (SELECT 1) AS one from my-db.main.t").unwrap();
        assert_eq!(name.database, "my-db");

        let err = target_table("SELECT * FROM person").unwrap_err();
        assert!(matches!(err, ContextError::AmbiguousQueryTarget { .. }));
    }
}
