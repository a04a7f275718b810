//! Rendering compiled queries into executable SQL.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{DatabaseType, Model, QualifiedName};

static QUALIFIED_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w$-]+)\.([\w$-]+)\.([\w$-]+)").expect("Invalid qualified name regex")
});

/// Apply `rewrite` to the parts of `sql` outside single-quoted literals.
fn map_unquoted(sql: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    for (i, segment) in sql.split('\'').enumerate() {
        if i > 0 {
            out.push('\'');
        }
        if i % 2 == 0 {
            out.push_str(&rewrite(segment));
        } else {
            out.push_str(segment);
        }
    }
    out
}

/// Turn a compiled query into SQL for `dialect`.
///
/// A query starting with `FROM` selects every column. Qualified names of
/// model tables become the dialect's quoted `schema.table`; other dotted
/// tokens are left alone. Placeholders stay `?`; the driver rewrites them.
pub fn render(model: &Model, dialect: DatabaseType, query: &str) -> String {
    let trimmed = query.trim();
    let query = if trimmed
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("from "))
    {
        format!("SELECT * {trimmed}")
    } else {
        trimmed.to_string()
    };

    map_unquoted(&query, |segment| {
        QUALIFIED_TABLE
            .replace_all(segment, |caps: &Captures| {
                let name = QualifiedName::new(&caps[1], &caps[2], &caps[3]);
                match model.find_table(&name) {
                    Some(_) => dialect.qualified_table(&name),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Database, Schema, Table};

    fn model() -> Model {
        let mut model = Model::new(vec![Database::new("crm").with_schema(
            Schema::new("public").with_table(Table::new("person").with_column(Column::new("id", "INTEGER"))),
        )]);
        model.init().unwrap();
        model
    }

    #[test]
    fn test_leading_from_selects_all() {
        let sql = render(&model(), DatabaseType::PostgreSQL, "FROM crm.public.person WHERE id = ?");
        assert_eq!(sql, "SELECT * FROM \"public\".\"person\" WHERE id = ?");
    }

    #[test]
    fn test_only_model_tables_are_rewritten() {
        let sql = render(
            &model(),
            DatabaseType::MySQL,
            "SELECT p.id FROM crm.public.person p JOIN other.x.y o ON o.id = p.id",
        );
        assert_eq!(
            sql,
            "SELECT p.id FROM `public`.`person` p JOIN other.x.y o ON o.id = p.id"
        );
    }

    #[test]
    fn test_literals_are_untouched() {
        let sql = render(
            &model(),
            DatabaseType::SQLite,
            "from crm.public.person WHERE note = 'crm.public.person'",
        );
        assert_eq!(
            sql,
            "SELECT * from \"person\" WHERE note = 'crm.public.person'"
        );
    }
}
