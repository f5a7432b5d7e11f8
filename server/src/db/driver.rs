use std::collections::HashMap;
use std::time::Duration;

use postgres_types::ToSql;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::{debug, instrument};

use crate::error::{DbaError, Result};

use super::PgPool;

/// Thin wrapper around the pool that executes SQL and maps rows to JSON.
/// `RestrictedDriver` (see `db::restricted`) wraps this and adds the AST
/// gatekeeper; `Driver` itself applies no statement-level policy.
#[derive(Clone)]
pub struct Driver {
    pool: PgPool,
    statement_timeout: Duration,
}

impl Driver {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self, params))]
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<HashMap<String, Value>>> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                self.statement_timeout.as_millis()
            ))
            .await?;

        let bound: Vec<JsonParam> = params.iter().cloned().map(JsonParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = tokio::time::timeout(self.statement_timeout, client.query(sql, &refs))
            .await
            .map_err(|_| DbaError::QueryTimeout(self.statement_timeout))??;

        debug!(row_count = rows.len(), "query completed");
        rows.iter().map(row_to_json).collect()
    }

    #[instrument(skip(self, params))]
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let client = self.pool.get().await?;
        let bound: Vec<JsonParam> = params.iter().cloned().map(JsonParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let affected = tokio::time::timeout(self.statement_timeout, client.execute(sql, &refs))
            .await
            .map_err(|_| DbaError::QueryTimeout(self.statement_timeout))??;
        Ok(affected)
    }
}

/// Wraps a `serde_json::Value` so it can be passed as a bind parameter
/// without forcing callers to know the target column's PostgreSQL type.
struct JsonParam(Value);

impl ToSql for JsonParam {
    fn to_sql(
        &self,
        ty: &postgres_types::Type,
        out: &mut bytes::BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Value::Null => Ok(postgres_types::IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.to_sql(ty, out)
                } else if let Some(f) = n.as_f64() {
                    f.to_sql(ty, out)
                } else {
                    Err("unsupported numeric literal".into())
                }
            }
            Value::String(s) => s.to_sql(ty, out),
            other => other.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &postgres_types::Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

fn row_to_json(row: &Row) -> Result<HashMap<String, Value>> {
    let mut map = HashMap::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_to_json(row, idx, column.type_())
            .map_err(|e| DbaError::internal(format!("could not decode column {}: {e}", column.name())))?;
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

fn column_to_json(
    row: &Row,
    idx: usize,
    ty: &postgres_types::Type,
) -> std::result::Result<Value, Box<dyn std::error::Error + Sync + Send>> {
    use postgres_types::Type;

    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool).unwrap_or(Value::Null),
        Type::INT2 => json_from_opt(row.try_get::<_, Option<i16>>(idx)?),
        Type::INT4 => json_from_opt(row.try_get::<_, Option<i32>>(idx)?),
        Type::INT8 => json_from_opt(row.try_get::<_, Option<i64>>(idx)?),
        Type::FLOAT4 => json_from_opt(row.try_get::<_, Option<f32>>(idx)?),
        Type::FLOAT8 => json_from_opt(row.try_get::<_, Option<f64>>(idx)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            json_from_opt(row.try_get::<_, Option<String>>(idx)?)
        }
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.unwrap_or(Value::Null),
        Type::UUID => json_from_opt(row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(|u| u.to_string())),
        Type::TIMESTAMPTZ => json_from_opt(
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                .map(|t| t.to_rfc3339()),
        ),
        Type::TIMESTAMP => json_from_opt(
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                .map(|t| t.to_string()),
        ),
        // Numerics are returned as strings, not floats, so callers don't lose
        // precision round-tripping through `f64`/JSON number parsing.
        Type::NUMERIC => json_from_opt(row.try_get::<_, Option<Decimal>>(idx)?.map(|d| d.to_string())),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            json_from_opt(row.try_get::<_, Option<Vec<Option<String>>>>(idx)?.map(|items| {
                Value::Array(items.into_iter().map(|v| v.map(Value::String).unwrap_or(Value::Null)).collect())
            }))
        }
        Type::INT2_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<i16>>>>(idx)?),
        Type::INT4_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<i32>>>>(idx)?),
        Type::INT8_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<i64>>>>(idx)?),
        Type::FLOAT4_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<f32>>>>(idx)?),
        Type::FLOAT8_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<f64>>>>(idx)?),
        Type::BOOL_ARRAY => json_array_of(row.try_get::<_, Option<Vec<Option<bool>>>>(idx)?),
        Type::NUMERIC_ARRAY => {
            json_from_opt(row.try_get::<_, Option<Vec<Option<Decimal>>>>(idx)?.map(|items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|d| d.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null))
                        .collect(),
                )
            }))
        }
        _ => {
            // Fall back to text representation for types we don't special-case
            // (interval, bytea, range types, enums, etc).
            match row.try_get::<_, Option<String>>(idx) {
                Ok(v) => json_from_opt(v),
                Err(_) => Value::Null,
            }
        }
    };
    Ok(value)
}

fn json_array_of<T: Into<Value>>(v: Option<Vec<Option<T>>>) -> Value {
    match v {
        Some(items) => Value::Array(items.into_iter().map(|v| v.map(Into::into).unwrap_or(Value::Null)).collect()),
        None => Value::Null,
    }
}

fn json_from_opt<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}
