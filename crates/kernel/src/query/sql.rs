//! PostgreSQL compiler for document collections using SeaQuery.
//!
//! Collections are tables of `(id, doc JSONB, created_at, updated_at)`.
//! Conditions address fields through `doc ->> 'field'` with a cast picked
//! from the operand type. Dot paths address nested objects.

use sea_query::{Alias, Cond, Expr, Order, PostgresQueryBuilder, Query, SimpleExpr};

use super::compiler::{FindOptions, Projection, SortKey};
use super::error::QueryError;
use super::filter::{Condition, MatchMode, Operand};
use super::types::{FieldKind, SortDirection};

/// Validate a SQL identifier name (table names, JSON keys).
/// Allows only `[a-zA-Z_][a-zA-Z0-9_]*` with max 63 chars (PostgreSQL limit).
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// Each dot-separated segment must be a safe identifier.
fn is_safe_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_safe_identifier)
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn unsafe_name(name: &str) -> QueryError {
    QueryError::InvalidSchema(format!("unsafe identifier '{name}'"))
}

/// `doc -> 'a' ->> 'b'` for text extraction.
fn text_path(field: &str) -> Result<String, QueryError> {
    json_path(field, true)
}

/// `doc -> 'a' -> 'b'` for JSONB extraction.
fn jsonb_path(field: &str) -> Result<String, QueryError> {
    json_path(field, false)
}

fn json_path(field: &str, as_text: bool) -> Result<String, QueryError> {
    if !is_safe_path(field) {
        return Err(unsafe_name(field));
    }
    let parts: Vec<&str> = field.split('.').collect();
    let mut expr = String::from("doc");
    for (i, part) in parts.iter().enumerate() {
        let arrow = if as_text && i == parts.len() - 1 {
            "->>"
        } else {
            "->"
        };
        expr = format!("{expr} {arrow} '{part}'");
    }
    Ok(format!("({expr})"))
}

/// Cast applied to the extracted text for ordered comparisons.
fn cast_for(operand: &Operand) -> &'static str {
    match operand {
        Operand::Int(_) | Operand::Float(_) => "::numeric",
        Operand::Date(_) => "::timestamptz",
        Operand::Bool(_) => "::boolean",
        Operand::Text(_) | Operand::Null => "",
    }
}

fn bind_value(operand: &Operand) -> sea_query::Value {
    match operand {
        Operand::Null => sea_query::Value::String(None),
        Operand::Bool(b) => (*b).into(),
        Operand::Int(i) => (*i).into(),
        Operand::Float(f) => (*f).into(),
        Operand::Text(s) => s.clone().into(),
        Operand::Date(d) => d.to_rfc3339().into(),
    }
}

fn jsonb_literal(operand: &Operand) -> sea_query::Value {
    operand.to_json().to_string().into()
}

/// Placeholder for one operand, cast where the text form needs it.
fn placeholder(n: usize, operand: &Operand) -> String {
    match operand {
        Operand::Date(_) => format!("${n}::timestamptz"),
        _ => format!("${n}"),
    }
}

/// Compile a condition tree into a SeaQuery expression.
pub fn condition_expr(condition: &Condition) -> Result<SimpleExpr, QueryError> {
    match condition {
        Condition::All(items) if items.is_empty() => Ok(Expr::cust("TRUE")),
        Condition::Any(items) if items.is_empty() => Ok(Expr::cust("FALSE")),
        Condition::All(items) => {
            let mut cond = Cond::all();
            for item in items {
                cond = cond.add(condition_expr(item)?);
            }
            Ok(cond.into())
        }
        Condition::Any(items) => {
            let mut cond = Cond::any();
            for item in items {
                cond = cond.add(condition_expr(item)?);
            }
            Ok(cond.into())
        }
        Condition::Eq { field, value } => equality(field, value, false),
        Condition::Ne { field, value } => equality(field, value, true),
        Condition::Match {
            field,
            needle,
            mode,
        } => {
            let escaped = escape_like_wildcards(needle);
            let pattern = match mode {
                MatchMode::Contains => format!("%{escaped}%"),
                MatchMode::Prefix => format!("{escaped}%"),
                MatchMode::Suffix => format!("%{escaped}"),
            };
            Ok(Expr::cust_with_values(
                format!("{} ILIKE $1", text_path(field)?),
                [pattern],
            ))
        }
        Condition::Gt { field, value } => ordered(field, value, ">"),
        Condition::Lt { field, value } => ordered(field, value, "<"),
        Condition::In { field, values } => {
            let Some(first) = values.first() else {
                return Ok(Expr::cust("FALSE"));
            };
            if matches!(first, Operand::Date(_)) {
                let marks: Vec<String> = (1..=values.len())
                    .map(|n| format!("${n}::timestamptz"))
                    .collect();
                Ok(Expr::cust_with_values(
                    format!("{}::timestamptz IN ({})", text_path(field)?, marks.join(", ")),
                    values.iter().map(bind_value),
                ))
            } else {
                let marks: Vec<String> =
                    (1..=values.len()).map(|n| format!("${n}::jsonb")).collect();
                Ok(Expr::cust_with_values(
                    format!("{} IN ({})", jsonb_path(field)?, marks.join(", ")),
                    values.iter().map(jsonb_literal),
                ))
            }
        }
        Condition::Between { field, low, high } => Ok(Expr::cust_with_values(
            format!(
                "{}{} BETWEEN {} AND {}",
                text_path(field)?,
                cast_for(low),
                placeholder(1, low),
                placeholder(2, high)
            ),
            [bind_value(low), bind_value(high)],
        )),
    }
}

fn equality(field: &str, value: &Operand, negate: bool) -> Result<SimpleExpr, QueryError> {
    let expr = match value {
        Operand::Null => {
            let op = if negate { "<>" } else { "=" };
            Expr::cust(format!(
                "COALESCE({}, 'null'::jsonb) {op} 'null'::jsonb",
                jsonb_path(field)?
            ))
        }
        Operand::Date(_) => {
            let op = if negate { "IS DISTINCT FROM" } else { "=" };
            Expr::cust_with_values(
                format!("{}::timestamptz {op} $1::timestamptz", text_path(field)?),
                [bind_value(value)],
            )
        }
        _ => {
            let op = if negate { "IS DISTINCT FROM" } else { "=" };
            Expr::cust_with_values(
                format!("{} {op} $1::jsonb", jsonb_path(field)?),
                [jsonb_literal(value)],
            )
        }
    };
    Ok(expr)
}

fn ordered(field: &str, value: &Operand, op: &str) -> Result<SimpleExpr, QueryError> {
    Ok(Expr::cust_with_values(
        format!(
            "{}{} {op} {}",
            text_path(field)?,
            cast_for(value),
            placeholder(1, value)
        ),
        [bind_value(value)],
    ))
}

fn sort_expr(key: &SortKey) -> Result<String, QueryError> {
    Ok(match key.kind {
        FieldKind::Number => format!("{}::numeric", text_path(&key.field)?),
        FieldKind::Date => format!("{}::timestamptz", text_path(&key.field)?),
        FieldKind::Boolean => format!("{}::boolean", text_path(&key.field)?),
        FieldKind::Text => text_path(&key.field)?,
        FieldKind::Any => jsonb_path(&key.field)?,
    })
}

/// Build the page SELECT returning one `doc` column.
///
/// Missing values sort first in ascending order and last in descending
/// order; ties fall back to creation order.
pub fn select(
    table: &str,
    filter: &Condition,
    projection: Option<&Projection>,
    options: &FindOptions,
) -> Result<String, QueryError> {
    if !is_safe_identifier(table) {
        return Err(unsafe_name(table));
    }
    let mut stmt = Query::select();

    match projection {
        None => {
            stmt.expr_as(Expr::cust("doc"), Alias::new("doc"));
        }
        Some(projection) => {
            let fields = projection.fields();
            let marks: Vec<String> = (1..=fields.len()).map(|n| format!("${n}")).collect();
            stmt.expr_as(
                Expr::cust_with_values(
                    format!(
                        "COALESCE((SELECT jsonb_object_agg(key, value) FROM jsonb_each(doc) \
                         WHERE key IN ({})), '{{}}'::jsonb)",
                        marks.join(", ")
                    ),
                    fields.iter().cloned(),
                ),
                Alias::new("doc"),
            );
        }
    }

    stmt.from(Alias::new(table));
    if !filter.is_match_all() {
        stmt.and_where(condition_expr(filter)?);
    }

    if let Some(key) = &options.sort {
        let expr = sort_expr(key)?;
        let (nulls, order) = match key.direction {
            SortDirection::Asc => (Order::Desc, Order::Asc),
            SortDirection::Desc => (Order::Asc, Order::Desc),
        };
        stmt.order_by_expr(Expr::cust(format!("({expr} IS NULL)")), nulls);
        stmt.order_by_expr(Expr::cust(expr), order);
    }
    stmt.order_by(Alias::new("created_at"), Order::Asc);
    stmt.order_by(Alias::new("id"), Order::Asc);

    if let Some(limit) = options.limit {
        stmt.limit(u64::from(limit));
    }
    if options.skip > 0 {
        stmt.offset(options.skip);
    }

    Ok(stmt.to_string(PostgresQueryBuilder))
}

/// Build a COUNT(*) over the rows matching `filter`.
pub fn count(table: &str, filter: &Condition) -> Result<String, QueryError> {
    if !is_safe_identifier(table) {
        return Err(unsafe_name(table));
    }
    let mut stmt = Query::select();
    stmt.expr(Expr::cust("COUNT(*)"));
    stmt.from(Alias::new(table));
    if !filter.is_match_all() {
        stmt.and_where(condition_expr(filter)?);
    }
    Ok(stmt.to_string(PostgresQueryBuilder))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::compiler::CompiledQuery;
    use chrono::TimeZone;

    fn select_all(table: &str, query: &CompiledQuery) -> Result<String, QueryError> {
        select(
            table,
            &query.filter,
            query.projection.as_ref(),
            &query.options,
        )
    }

    fn compiled(filter: Condition) -> CompiledQuery {
        CompiledQuery {
            filter,
            projection: None,
            options: FindOptions {
                limit: Some(10),
                skip: 0,
                sort: None,
            },
        }
    }

    #[test]
    fn safe_identifier_validation() {
        assert!(is_safe_identifier("users"));
        assert!(is_safe_identifier("_private"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("123abc"));
        assert!(!is_safe_identifier("users; DROP TABLE--"));
        assert!(!is_safe_identifier("foo bar"));
        assert!(is_safe_path("seo.metaTitle"));
        assert!(!is_safe_path("seo..metaTitle"));
        assert!(!is_safe_path("name'"));
    }

    #[test]
    fn escape_like() {
        assert_eq!(escape_like_wildcards("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn simple_select() {
        let sql = select_all("users", &compiled(Condition::match_all())).unwrap();
        assert!(sql.contains("FROM \"users\""), "{sql}");
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
        assert!(sql.contains("ORDER BY \"created_at\" ASC"), "{sql}");
    }

    #[test]
    fn rejects_unsafe_table() {
        assert!(select_all("users;--", &compiled(Condition::match_all())).is_err());
        assert!(count("bad name", &Condition::match_all()).is_err());
    }

    #[test]
    fn rejects_unsafe_field() {
        let cond = Condition::Eq {
            field: "name' OR 1=1".into(),
            value: Operand::Int(1),
        };
        assert!(select_all("users", &compiled(cond)).is_err());
    }

    #[test]
    fn contains_is_case_insensitive_and_escaped() {
        let cond = Condition::Match {
            field: "name".into(),
            needle: "j_o".into(),
            mode: MatchMode::Contains,
        };
        let sql = select_all("users", &compiled(cond)).unwrap();
        assert!(sql.contains("(doc ->> 'name') ILIKE"), "{sql}");
        assert!(sql.contains("\\_o%"), "{sql}");
    }

    #[test]
    fn prefix_and_suffix_anchor() {
        let prefix = Condition::Match {
            field: "slug".into(),
            needle: "blog".into(),
            mode: MatchMode::Prefix,
        };
        let sql = count("pages", &prefix).unwrap();
        assert!(sql.contains("'blog%'"), "{sql}");

        let suffix = Condition::Match {
            field: "slug".into(),
            needle: "blog".into(),
            mode: MatchMode::Suffix,
        };
        let sql = count("pages", &suffix).unwrap();
        assert!(sql.contains("'%blog'"), "{sql}");
    }

    #[test]
    fn numeric_comparison_casts() {
        let cond = Condition::Gt {
            field: "age".into(),
            value: Operand::Int(18),
        };
        let sql = count("users", &cond).unwrap();
        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains("(doc ->> 'age')::numeric > 18"), "{sql}");
    }

    #[test]
    fn date_between_casts_both_sides() {
        let cond = Condition::Between {
            field: "createdAt".into(),
            low: Operand::Date(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            high: Operand::Date(chrono::Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
        };
        let sql = count("users", &cond).unwrap();
        assert!(sql.contains("(doc ->> 'createdAt')::timestamptz BETWEEN"), "{sql}");
        assert!(sql.contains("2024-01-01T00:00:00+00:00"), "{sql}");
        assert!(sql.contains("::timestamptz AND"), "{sql}");
    }

    #[test]
    fn equality_uses_jsonb() {
        let cond = Condition::Eq {
            field: "isActive".into(),
            value: Operand::Bool(true),
        };
        let sql = count("users", &cond).unwrap();
        assert!(sql.contains("(doc -> 'isActive') = 'true'::jsonb"), "{sql}");
    }

    #[test]
    fn null_equality_covers_missing_fields() {
        let cond = Condition::Eq {
            field: "lastLoginAt".into(),
            value: Operand::Null,
        };
        let sql = count("users", &cond).unwrap();
        assert!(sql.contains("COALESCE((doc -> 'lastLoginAt'), 'null'::jsonb)"), "{sql}");
    }

    #[test]
    fn in_list() {
        let cond = Condition::In {
            field: "status".into(),
            values: vec![Operand::Text("DRAFT".into()), Operand::Text("PUBLISHED".into())],
        };
        let sql = count("pages", &cond).unwrap();
        assert!(sql.contains("(doc -> 'status') IN ("), "{sql}");
        assert!(sql.contains("DRAFT"), "{sql}");
        assert!(sql.contains("PUBLISHED"), "{sql}");
    }

    #[test]
    fn nested_paths() {
        let cond = Condition::Eq {
            field: "seo.metaTitle".into(),
            value: Operand::Text("Home".into()),
        };
        let sql = count("pages", &cond).unwrap();
        assert!(sql.contains("(doc -> 'seo' -> 'metaTitle')"), "{sql}");
    }

    #[test]
    fn any_combines_with_or() {
        let cond = Condition::Any(vec![
            Condition::Match {
                field: "name".into(),
                needle: "jo".into(),
                mode: MatchMode::Contains,
            },
            Condition::Match {
                field: "email".into(),
                needle: "jo".into(),
                mode: MatchMode::Contains,
            },
        ]);
        let sql = count("users", &cond).unwrap();
        assert!(sql.contains(" OR "), "{sql}");
        assert!(count("users", &Condition::Any(vec![])).unwrap().contains("FALSE"));
    }

    #[test]
    fn pagination_and_sort() {
        let mut query = compiled(Condition::match_all());
        query.options.skip = 20;
        query.options.sort = Some(SortKey {
            field: "createdAt".into(),
            direction: SortDirection::Desc,
            kind: FieldKind::Date,
        });
        let sql = select_all("users", &query).unwrap();
        assert!(sql.contains("OFFSET 20"), "{sql}");
        assert!(
            sql.contains("((doc ->> 'createdAt')::timestamptz IS NULL) ASC"),
            "{sql}"
        );
        assert!(sql.contains("(doc ->> 'createdAt')::timestamptz DESC"), "{sql}");
    }

    #[test]
    fn projection_selects_listed_keys() {
        let mut query = compiled(Condition::match_all());
        query.projection = Projection::new(["name"]);
        let sql = select_all("users", &query).unwrap();
        assert!(sql.contains("jsonb_object_agg"), "{sql}");
        assert!(sql.contains("'name'"), "{sql}");
        assert!(sql.contains("'id'"), "{sql}");
    }
}
