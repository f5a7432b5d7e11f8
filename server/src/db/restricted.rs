use std::collections::HashMap;

use serde_json::Value;
use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Join,
    JoinConstraint, ObjectName, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::instrument;

use crate::error::{DbaError, Result};
use shared::AccessMode;

use super::driver::Driver;
use super::PgPool;

/// Wraps a base [`Driver`] and, in [`AccessMode::Restricted`], rejects any
/// statement that is not a read-only `SELECT`/`WITH ... SELECT` before it
/// reaches the server.
#[derive(Clone)]
pub struct RestrictedDriver {
    driver: Driver,
    access_mode: AccessMode,
}

impl RestrictedDriver {
    pub fn new(driver: Driver, access_mode: AccessMode) -> Self {
        Self { driver, access_mode }
    }

    pub fn pool(&self) -> &PgPool {
        self.driver.pool()
    }

    #[instrument(skip(self, params))]
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<HashMap<String, Value>>> {
        if self.access_mode == AccessMode::Restricted {
            check_read_only(sql)?;
        }
        self.driver.query(sql, params).await
    }

    /// Used by components (EXPLAIN, advisor) that must run arbitrary SQL
    /// regardless of access mode because it never touches user data: they
    /// call the inner driver directly instead of going through here.
    pub fn inner(&self) -> &Driver {
        &self.driver
    }
}

/// Functions allowed to appear in a restricted-mode statement. Curated:
/// catalog introspection, time/text/math builtins, aggregates, and HypoPG
/// helpers. Nothing that writes, invokes server-side code, or touches the
/// filesystem is on this list.
const ALLOWED_FUNCTIONS: &[&str] = &[
    // catalog introspection
    "pg_get_indexdef",
    "pg_get_constraintdef",
    "pg_get_viewdef",
    "pg_get_expr",
    "pg_get_serial_sequence",
    "format_type",
    "pg_table_size",
    "pg_relation_size",
    "pg_total_relation_size",
    "pg_indexes_size",
    "pg_size_pretty",
    "obj_description",
    "col_description",
    "current_schema",
    "current_schemas",
    "current_database",
    "version",
    // aggregates
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "array_agg",
    "string_agg",
    "json_agg",
    "jsonb_agg",
    "bool_and",
    "bool_or",
    // time
    "now",
    "current_timestamp",
    "current_date",
    "age",
    "date_trunc",
    "extract",
    "to_char",
    "to_timestamp",
    "clock_timestamp",
    "statement_timestamp",
    "make_interval",
    // text
    "lower",
    "upper",
    "concat",
    "concat_ws",
    "substring",
    "length",
    "char_length",
    "trim",
    "btrim",
    "ltrim",
    "rtrim",
    "replace",
    "coalesce",
    "nullif",
    "regexp_replace",
    "regexp_match",
    "regexp_matches",
    "left",
    "right",
    "position",
    "split_part",
    "lpad",
    "rpad",
    // math
    "round",
    "ceil",
    "ceiling",
    "floor",
    "abs",
    "power",
    "sqrt",
    "mod",
    "greatest",
    "least",
    "random",
    // json
    "jsonb_build_object",
    "json_build_object",
    "jsonb_array_elements",
    "json_array_elements",
    "jsonb_path_query",
    "to_jsonb",
    "row_to_json",
    "jsonb_pretty",
];

fn is_allowed_function(name: &ObjectName) -> bool {
    let normalized = name
        .0
        .last()
        .map(|ident| ident.value.to_ascii_lowercase())
        .unwrap_or_default();
    normalized.starts_with("hypopg_")
        || (normalized.starts_with("has_") && normalized.ends_with("_privilege"))
        || ALLOWED_FUNCTIONS.contains(&normalized.as_str())
}

/// Schemas a restricted-mode statement may reference. Anything else whose
/// name starts with `pg_` (e.g. `pg_toast`, `pg_temp`) is the server's own
/// internal storage, never the user's data.
fn is_allowed_schema(schema: &str) -> bool {
    let schema = schema.to_ascii_lowercase();
    schema == "pg_catalog" || schema == "information_schema" || !schema.starts_with("pg_")
}

/// Parses `sql` with the PostgreSQL dialect and accepts it only if it is a
/// single read-only statement: a plain `SELECT`/CTE/set-operation query, a
/// `SHOW`, or a non-`ANALYZE` `EXPLAIN` of one of those, using only
/// whitelisted functions and touching only non-internal schemas.
pub fn check_read_only(sql: &str) -> Result<()> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| DbaError::SqlSyntax(e.to_string()))?;

    if statements.is_empty() {
        return Err(DbaError::SqlSyntax("empty statement".to_string()));
    }
    if statements.len() > 1 {
        return Err(DbaError::UnsupportedSyntaxForRestrictedMode(
            "multiple statements are not allowed in restricted mode".to_string(),
        ));
    }

    check_statement(&statements[0])
}

fn check_statement(statement: &Statement) -> Result<()> {
    match statement {
        Statement::Query(query) => check_query(query),
        Statement::ShowVariable { .. } => Ok(()),
        Statement::Explain { analyze, statement, .. } => {
            if *analyze {
                return Err(DbaError::UnsupportedSyntaxForRestrictedMode(
                    "EXPLAIN ANALYZE executes the statement and is not allowed in restricted mode"
                        .to_string(),
                ));
            }
            check_statement(statement)
        }
        other => Err(DbaError::StatementNotAllowed {
            access_mode: AccessMode::Restricted.to_string(),
            statement_kind: statement_kind_name(other),
        }),
    }
}

fn check_query(query: &Query) -> Result<()> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)?;
    for order_by in query.order_by.iter().flat_map(|o| o.exprs.iter()) {
        check_function_allow_list(&order_by.expr)?;
    }
    Ok(())
}

fn check_set_expr(expr: &SetExpr) -> Result<()> {
    match expr {
        SetExpr::Select(select) => check_select(select),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(values) => {
            for row in &values.rows {
                for expr in row {
                    check_function_allow_list(expr)?;
                }
            }
            Ok(())
        }
        SetExpr::Table(_) => Ok(()),
        SetExpr::Insert(_) => Err(DbaError::UnsupportedSyntaxForRestrictedMode(
            "INSERT embedded in a query body is not allowed in restricted mode".to_string(),
        )),
        SetExpr::Update(_) => Err(DbaError::UnsupportedSyntaxForRestrictedMode(
            "UPDATE embedded in a query body is not allowed in restricted mode".to_string(),
        )),
    }
}

fn check_select(select: &Select) -> Result<()> {
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                check_function_allow_list(expr)?;
            }
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {}
        }
    }
    for twj in &select.from {
        check_table_with_joins(twj)?;
    }
    if let Some(selection) = &select.selection {
        check_function_allow_list(selection)?;
    }
    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            check_function_allow_list(expr)?;
        }
    }
    if let Some(having) = &select.having {
        check_function_allow_list(having)?;
    }
    Ok(())
}

fn check_table_with_joins(twj: &TableWithJoins) -> Result<()> {
    check_table_factor(&twj.relation)?;
    for join in &twj.joins {
        check_join(join)?;
    }
    Ok(())
}

fn check_join(join: &Join) -> Result<()> {
    check_table_factor(&join.relation)?;
    let constraint = match &join.join_operator {
        sqlparser::ast::JoinOperator::Inner(c)
        | sqlparser::ast::JoinOperator::LeftOuter(c)
        | sqlparser::ast::JoinOperator::RightOuter(c)
        | sqlparser::ast::JoinOperator::FullOuter(c) => Some(c),
        _ => None,
    };
    if let Some(JoinConstraint::On(expr)) = constraint {
        check_function_allow_list(expr)?;
    }
    Ok(())
}

fn check_table_factor(factor: &TableFactor) -> Result<()> {
    match factor {
        TableFactor::Table { name, .. } => check_schema_allowed(name),
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin { table_with_joins, .. } => check_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}

fn check_schema_allowed(name: &ObjectName) -> Result<()> {
    if name.0.len() >= 2 {
        let schema = &name.0[name.0.len() - 2].value;
        if !is_allowed_schema(schema) {
            return Err(DbaError::UnsupportedSyntaxForRestrictedMode(format!(
                "access to schema {schema} is not allowed in restricted mode"
            )));
        }
    }
    Ok(())
}

/// Walks an expression tree, rejecting any function call outside the
/// allow-list and recursing into subqueries, `CASE`, casts, and nested
/// expressions.
fn check_function_allow_list(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Function(Function { name, args, .. }) => {
            if !is_allowed_function(name) {
                return Err(DbaError::UnsupportedSyntaxForRestrictedMode(format!(
                    "function {name} is not allowed in restricted mode"
                )));
            }
            if let FunctionArguments::List(list) = args {
                for arg in &list.args {
                    check_function_arg(arg)?;
                }
            }
            Ok(())
        }
        Expr::BinaryOp { left, right, .. } => {
            check_function_allow_list(left)?;
            check_function_allow_list(right)
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::Cast { expr, .. }
        | Expr::Collate { expr, .. } => check_function_allow_list(expr),
        Expr::Between { expr, low, high, .. } => {
            check_function_allow_list(expr)?;
            check_function_allow_list(low)?;
            check_function_allow_list(high)
        }
        Expr::InList { expr, list, .. } => {
            check_function_allow_list(expr)?;
            for item in list {
                check_function_allow_list(item)?;
            }
            Ok(())
        }
        Expr::InSubquery { expr, subquery, .. } => {
            check_function_allow_list(expr)?;
            check_query(subquery)
        }
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => check_query(query),
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                check_function_allow_list(operand)?;
            }
            for expr in conditions.iter().chain(results.iter()) {
                check_function_allow_list(expr)?;
            }
            if let Some(else_result) = else_result {
                check_function_allow_list(else_result)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_function_arg(arg: &FunctionArg) -> Result<()> {
    let expr = match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Some(expr),
        FunctionArg::Named {
            arg: FunctionArgExpr::Expr(expr),
            ..
        } => Some(expr),
        _ => None,
    };
    match expr {
        Some(expr) => check_function_allow_list(expr),
        None => Ok(()),
    }
}

fn statement_kind_name(statement: &Statement) -> String {
    // `Statement` has no `Display` that yields just the variant name, so we
    // take the first word of its rendered SQL.
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(check_read_only("SELECT 1").is_ok());
    }

    #[test]
    fn accepts_cte_select() {
        assert!(check_read_only("WITH x AS (SELECT 1) SELECT * FROM x").is_ok());
    }

    #[test]
    fn accepts_union() {
        assert!(check_read_only("SELECT 1 UNION SELECT 2").is_ok());
    }

    #[test]
    fn accepts_show() {
        assert!(check_read_only("SHOW server_version_num").is_ok());
    }

    #[test]
    fn accepts_explain_without_analyze() {
        assert!(check_read_only("EXPLAIN SELECT 1").is_ok());
    }

    #[test]
    fn rejects_explain_analyze() {
        let err = check_read_only("EXPLAIN ANALYZE SELECT 1").unwrap_err();
        assert!(matches!(err, DbaError::UnsupportedSyntaxForRestrictedMode(_)));
    }

    #[test]
    fn rejects_insert() {
        let err = check_read_only("INSERT INTO t VALUES (1)").unwrap_err();
        assert!(matches!(err, DbaError::StatementNotAllowed { .. }));
    }

    #[test]
    fn rejects_update() {
        assert!(check_read_only("UPDATE t SET a = 1").is_err());
    }

    #[test]
    fn rejects_delete() {
        assert!(check_read_only("DELETE FROM t").is_err());
    }

    #[test]
    fn rejects_ddl() {
        assert!(check_read_only("DROP TABLE t").is_err());
        assert!(check_read_only("CREATE TABLE t (id int)").is_err());
        assert!(check_read_only("ALTER TABLE t ADD COLUMN b int").is_err());
    }

    #[test]
    fn rejects_call() {
        assert!(check_read_only("CALL some_procedure()").is_err());
    }

    #[test]
    fn rejects_malformed_sql() {
        let err = check_read_only("SELEKT * FROM t").unwrap_err();
        assert!(matches!(err, DbaError::SqlSyntax(_)));
    }

    #[test]
    fn rejects_multi_statement() {
        assert!(check_read_only("SELECT 1; SELECT 2;").is_err());
        assert!(check_read_only("SELECT 1; DELETE FROM t;").is_err());
    }

    #[test]
    fn rejects_disallowed_function() {
        let err = check_read_only("SELECT pg_reload_conf()").unwrap_err();
        assert!(matches!(err, DbaError::UnsupportedSyntaxForRestrictedMode(_)));
    }

    #[test]
    fn accepts_allow_listed_function() {
        assert!(check_read_only("SELECT count(*), now() FROM t WHERE lower(name) = 'x'").is_ok());
    }

    #[test]
    fn accepts_hypopg_helper() {
        assert!(check_read_only("SELECT * FROM hypopg_list_indexes()").is_ok());
    }

    #[test]
    fn rejects_pg_toast_access() {
        let err = check_read_only("SELECT * FROM pg_toast.pg_toast_12345").unwrap_err();
        assert!(matches!(err, DbaError::UnsupportedSyntaxForRestrictedMode(_)));
    }

    #[test]
    fn accepts_pg_catalog_access() {
        assert!(check_read_only("SELECT * FROM pg_catalog.pg_class").is_ok());
    }
}
