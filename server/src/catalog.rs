use shared::{
    ColumnDetail, ConstraintDetail, GetObjectDetailsRequest, IndexDetail, ListObjectsRequest,
    ListObjectsResponse, ListSchemasResponse, ObjectDetails, ObjectSummary, TableRef,
};
use tracing::instrument;

use crate::db::driver::Driver;
use crate::error::{DbaError, Result};

/// Schema/object inspection backing `postgres_list_schemas`,
/// `postgres_list_objects`, and `postgres_get_object_details`. All three
/// read only from `pg_catalog`/`information_schema`, so they run
/// unconditionally regardless of access mode.
pub struct Catalog {
    driver: Driver,
}

impl Catalog {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    #[instrument(skip(self))]
    pub async fn list_schemas(&self) -> Result<ListSchemasResponse> {
        let client = self.driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT LIKE 'pg\\_%' AND schema_name != 'information_schema' \
                 ORDER BY schema_name",
                &[],
            )
            .await?;
        let schemas = rows.iter().map(|row| row.get(0)).collect();
        Ok(ListSchemasResponse { schemas })
    }

    #[instrument(skip(self))]
    pub async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsResponse> {
        let schema = request.schema.clone().unwrap_or_else(|| "public".to_string());
        let type_filter = if request.object_types.is_empty() {
            vec!["table".to_string(), "view".to_string(), "materialized_view".to_string()]
        } else {
            request.object_types.clone()
        };
        let limit = request.limit.unwrap_or(200).clamp(1, 1000);
        let offset = request.offset.unwrap_or(0).max(0);

        let client = self.driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT n.nspname AS schema, c.relname AS name, \
                        CASE c.relkind \
                          WHEN 'r' THEN 'table' WHEN 'v' THEN 'view' \
                          WHEN 'm' THEN 'materialized_view' WHEN 'p' THEN 'table' \
                          WHEN 'f' THEN 'foreign_table' WHEN 'S' THEN 'sequence' \
                          ELSE 'other' END AS object_type \
                 FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 \
                 ORDER BY c.relname \
                 LIMIT $2 OFFSET $3",
                &[&schema, &limit, &offset],
            )
            .await?;

        let objects: Vec<ObjectSummary> = rows
            .iter()
            .map(|row| ObjectSummary {
                schema: row.get("schema"),
                name: row.get("name"),
                object_type: row.get("object_type"),
            })
            .filter(|o| type_filter.contains(&o.object_type))
            .collect();

        let total = client
            .query_one(
                "SELECT count(*) FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1",
                &[&schema],
            )
            .await?
            .get(0);

        Ok(ListObjectsResponse { objects, total })
    }

    #[instrument(skip(self))]
    pub async fn get_object_details(&self, request: &GetObjectDetailsRequest) -> Result<ObjectDetails> {
        let client = self.driver.pool().get().await?;

        let exists: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2)",
                &[&request.schema, &request.name],
            )
            .await?
            .get(0);
        if !exists {
            return Err(DbaError::object_not_found(format!(
                "{}.{}",
                request.schema, request.name
            )));
        }

        let column_rows = client
            .query(
                "SELECT column_name, data_type, is_nullable = 'YES' AS is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&request.schema, &request.name],
            )
            .await?;
        let columns = column_rows
            .iter()
            .map(|row| ColumnDetail {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                is_nullable: row.get("is_nullable"),
                default: row.get("column_default"),
            })
            .collect();

        let constraint_rows = client
            .query(
                "SELECT conname, contype, pg_get_constraintdef(oid) AS definition \
                 FROM pg_constraint \
                 WHERE conrelid = format('%I.%I', $1::text, $2::text)::regclass",
                &[&request.schema, &request.name],
            )
            .await?;
        let constraints = constraint_rows
            .iter()
            .map(|row| {
                let contype: i8 = row.get::<_, i8>("contype");
                ConstraintDetail {
                    name: row.get("conname"),
                    constraint_type: constraint_type_name(contype as u8 as char),
                    definition: row.get("definition"),
                }
            })
            .collect();

        let index_rows = client
            .query(
                "SELECT i.relname AS index_name, pg_get_indexdef(ix.indexrelid) AS definition, \
                        ix.indisunique AS is_unique, ix.indisvalid AS is_valid \
                 FROM pg_index ix \
                 JOIN pg_class i ON i.oid = ix.indexrelid \
                 JOIN pg_class t ON t.oid = ix.indrelid \
                 JOIN pg_namespace n ON n.oid = t.relnamespace \
                 WHERE n.nspname = $1 AND t.relname = $2",
                &[&request.schema, &request.name],
            )
            .await?;
        let indexes = index_rows
            .iter()
            .map(|row| IndexDetail {
                name: row.get("index_name"),
                definition: row.get("definition"),
                is_unique: row.get("is_unique"),
                is_valid: row.get("is_valid"),
            })
            .collect();

        Ok(ObjectDetails {
            table: TableRef {
                schema: request.schema.clone(),
                name: request.name.clone(),
            },
            columns,
            constraints,
            indexes,
        })
    }
}

fn constraint_type_name(code: char) -> String {
    match code {
        'p' => "primary_key",
        'f' => "foreign_key",
        'u' => "unique",
        'c' => "check",
        'x' => "exclusion",
        _ => "other",
    }
    .to_string()
}
