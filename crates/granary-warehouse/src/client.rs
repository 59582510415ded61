//! Warehouse client backed by the `postgres` driver
//!
//! Redshift speaks the PostgreSQL wire protocol, so a plain [`postgres`]
//! connection over TLS is all we need. Every statement goes through the
//! simple-query protocol: Redshift statements like COPY and VACUUM are not
//! preparable, and the executor only ever sends literal SQL anyway.

use std::time::Instant;

use granary_core::RelationName;
use postgres::SimpleQueryMessage;

use crate::scrub::scrub_credentials;
use crate::warehouse::{LoadErrorRow, Warehouse, WarehouseError};

/// A live connection to one warehouse cluster.
pub struct RedshiftClient {
    name: String,
    client: postgres::Client,
}

impl RedshiftClient {
    /// Connect to the cluster at `dsn`, labelled `name` in logs and errors.
    pub fn connect(name: impl Into<String>, dsn: &str) -> Result<Self, WarehouseError> {
        let name = name.into();
        let connector = native_tls::TlsConnector::builder()
            .build()
            .map_err(|error| WarehouseError::ConnectionError(name.clone(), error.to_string()))?;
        let connector = postgres_native_tls::MakeTlsConnector::new(connector);
        let client = postgres::Client::connect(dsn, connector)
            .map_err(|error| WarehouseError::ConnectionError(name.clone(), error.to_string()))?;
        Ok(Self { name, client })
    }

    fn run(&mut self, sql: &str) -> Result<Vec<SimpleQueryMessage>, WarehouseError> {
        let printable = scrub_credentials(sql);
        tracing::debug!("QUERY:\n{printable}\n;");
        let started = Instant::now();
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|error| WarehouseError::StatementError(error.to_string()))?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "QUERY STATUS: ok");
        Ok(messages)
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Catalog query listing the relations a view or table depends on.
///
/// Flattens `pg_depend` across the intermediate dependency objects, so it
/// covers both view rewrite rules and constraint edges.
fn dependencies_query(name: &RelationName) -> String {
    format!(
        "\
SELECT DISTINCT
       n_c.nspname AS dependency_schema
     , c_c.relname AS dependency_name
  FROM pg_class c_p
  JOIN pg_depend d_p ON c_p.relfilenode = d_p.refobjid
  JOIN pg_depend d_c ON d_p.objid = d_c.objid
  -- relfilenode of a recently copied table may no longer match its OID
  JOIN pg_class c_c ON d_c.refobjid = c_c.relfilenode OR d_c.refobjid = c_c.oid
  LEFT JOIN pg_namespace n_p ON c_p.relnamespace = n_p.oid
  LEFT JOIN pg_namespace n_c ON c_c.relnamespace = n_c.oid
 WHERE c_p.relname = '{table}'
   AND n_p.nspname = '{schema}'
   AND c_p.oid != c_c.oid",
        table = escape_literal(&name.table),
        schema = escape_literal(&name.schema),
    )
}

fn columns_query(name: &RelationName) -> String {
    format!(
        "\
SELECT a.attname
  FROM pg_class c, pg_attribute a, pg_type t, pg_namespace n
 WHERE c.relname = '{table}'
   AND a.attnum > 0
   AND a.attrelid = c.oid
   AND a.atttypid = t.oid
   AND c.relnamespace = n.oid
   AND n.nspname = '{schema}'
 ORDER BY attnum ASC",
        table = escape_literal(&name.table),
        schema = escape_literal(&name.schema),
    )
}

const LOAD_ERRORS_QUERY: &str = "\
SELECT query, starttime, filename, colname, type, col_length,
       line_number, position, err_code, err_reason
  FROM stl_load_errors
 WHERE session = pg_backend_pid()
 ORDER BY starttime DESC
 LIMIT 1";

impl Warehouse for RedshiftClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        let messages = self.run(sql)?;
        let mut rows = 0;
        for message in messages {
            if let SimpleQueryMessage::CommandComplete(count) = message {
                rows = count;
            }
        }
        Ok(rows)
    }

    fn begin(&mut self) -> Result<(), WarehouseError> {
        self.run("BEGIN").map(|_| ())
    }

    fn commit(&mut self) -> Result<(), WarehouseError> {
        self.run("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), WarehouseError> {
        self.run("ROLLBACK").map(|_| ())
    }

    fn explain(&mut self, query: &str) -> Result<Vec<String>, WarehouseError> {
        let messages = self.run(&format!("EXPLAIN\n{query}"))?;
        let mut plan = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                plan.push(row.get(0).unwrap_or("").to_string());
            }
        }
        Ok(plan)
    }

    fn last_load_error(&mut self) -> Result<Option<LoadErrorRow>, WarehouseError> {
        let messages = self.run(LOAD_ERRORS_QUERY)?;
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let field = |idx: usize| row.get(idx).unwrap_or("").trim().to_string();
                return Ok(Some(LoadErrorRow {
                    query: field(0),
                    starttime: field(1),
                    filename: field(2),
                    colname: field(3),
                    column_type: field(4),
                    col_length: field(5),
                    line_number: field(6),
                    position: field(7),
                    err_code: field(8),
                    err_reason: field(9),
                }));
            }
        }
        Ok(None)
    }

    fn view_dependencies(
        &mut self,
        name: &RelationName,
    ) -> Result<Vec<RelationName>, WarehouseError> {
        let messages = self.run(&dependencies_query(name))?;
        let mut dependencies = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let schema = row.get(0).unwrap_or("").to_string();
                let table = row.get(1).unwrap_or("").to_string();
                dependencies.push(RelationName::new(schema, table));
            }
        }
        dependencies.sort();
        Ok(dependencies)
    }

    fn relation_columns(&mut self, name: &RelationName) -> Result<Vec<String>, WarehouseError> {
        let messages = self.run(&columns_query(name))?;
        let mut columns = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                columns.push(row.get(0).unwrap_or("").to_string());
            }
        }
        Ok(columns)
    }
}
