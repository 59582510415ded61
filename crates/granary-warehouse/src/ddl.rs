//! Statement builders
//!
//! Pure functions turning a relation design (plus optional query text)
//! into the SQL the executor runs. Everything here is deterministic: the
//! same design always renders byte-identical text, which keeps re-runs
//! idempotent and lets tests assert exact output.
//!
//! Identity columns get special treatment. The final table leaves the
//! identity sequence off so the sentinel row at key 0 can be inserted
//! explicitly; the staging variant keeps the sequence so key values are
//! generated while filling, and the swap copies them across verbatim.

use granary_core::{ColumnDef, DistStyle, Distribution, RelationName, TableDesign};

/// Render the staging table for a target relation
///
/// Staging tables are session-local temporaries, so the name is a single
/// unqualified identifier under a reserved prefix.
pub fn staging_table_name(name: &RelationName) -> String {
    format!("\"staging${}\"", name.table)
}

fn quoted_column_list<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted_relation(identifier: &str) -> String {
    match RelationName::from_identifier(identifier) {
        Ok(name) => name.to_string(),
        Err(_) => format!("\"{identifier}\""),
    }
}

/// Continuation-line indentation, applied last so every embedded newline
/// lines up the same way in logs.
fn indent(text: &str) -> String {
    text.replace('\n', "\n    ")
}

fn build_column(column: &ColumnDef, use_identity: bool, skip_references: bool) -> String {
    let mut ddl = format!("\"{}\" {}", column.name, column.sql_type);
    if column.identity && use_identity {
        ddl.push_str(" IDENTITY(1, 1)");
    }
    if let Some(encoding) = &column.encoding {
        ddl.push_str(&format!(" ENCODE {encoding}"));
    }
    if column.not_null {
        ddl.push_str(" NOT NULL");
    }
    if let Some((relation, columns)) = &column.references {
        if !skip_references {
            ddl.push_str(&format!(
                " REFERENCES {} ( {} )",
                quoted_relation(relation),
                quoted_column_list(columns.iter().map(String::as_str))
            ));
        }
    }
    ddl
}

fn build_constraints(design: &TableDesign, exclude_foreign_keys: bool) -> Vec<String> {
    let constraints = &design.constraints;
    let mut ddl = Vec::new();
    for key in [&constraints.primary_key, &constraints.surrogate_key] {
        if let Some(columns) = key {
            ddl.push(format!(
                "PRIMARY KEY ( {} )",
                quoted_column_list(columns.iter().map(String::as_str))
            ));
        }
    }
    for key in [&constraints.unique, &constraints.natural_key] {
        if let Some(columns) = key {
            ddl.push(format!(
                "UNIQUE ( {} )",
                quoted_column_list(columns.iter().map(String::as_str))
            ));
        }
    }
    if let Some(foreign_key) = &constraints.foreign_key {
        if !exclude_foreign_keys {
            let (relation, referenced) = &foreign_key.references;
            ddl.push(format!(
                "FOREIGN KEY ( {} ) REFERENCES {} ( {} )",
                quoted_column_list(foreign_key.columns.iter().map(String::as_str)),
                quoted_relation(relation),
                quoted_column_list(referenced.iter().map(String::as_str))
            ));
        }
    }
    ddl
}

fn build_attributes(design: &TableDesign) -> Vec<String> {
    let attributes = &design.attributes;
    let mut ddl = Vec::new();
    match &attributes.distribution {
        Some(Distribution::Key(columns)) => {
            ddl.push("DISTSTYLE KEY".to_string());
            ddl.push(format!(
                "DISTKEY ( {} )",
                quoted_column_list(columns.iter().map(String::as_str))
            ));
        }
        Some(Distribution::Style(DistStyle::All)) => ddl.push("DISTSTYLE ALL".to_string()),
        Some(Distribution::Style(DistStyle::Even)) => ddl.push("DISTSTYLE EVEN".to_string()),
        None => {}
    }
    if let Some(columns) = &attributes.compound_sort {
        ddl.push(format!(
            "COMPOUND SORTKEY ( {} )",
            quoted_column_list(columns.iter().map(String::as_str))
        ));
    } else if let Some(columns) = &attributes.interleaved_sort {
        ddl.push(format!(
            "INTERLEAVED SORTKEY ( {} )",
            quoted_column_list(columns.iter().map(String::as_str))
        ));
    }
    ddl
}

/// Assemble the DDL to create a table for this design
///
/// `target` is the already-rendered SQL name, either the qualified final
/// table or the staging name. The staging variant keeps the identity
/// sequence but drops references, foreign keys, and physical attributes.
pub fn build_table(design: &TableDesign, target: &str, is_staging: bool) -> String {
    let mut body: Vec<String> = design
        .unskipped_columns()
        .map(|column| build_column(column, is_staging, is_staging))
        .collect();
    body.extend(build_constraints(design, is_staging));
    let attributes = if is_staging {
        Vec::new()
    } else {
        build_attributes(design)
    };
    let table_type = if is_staging { "TEMP TABLE" } else { "TABLE" };

    let ddl = format!(
        "CREATE {} IF NOT EXISTS {} (\n{})\n{}",
        table_type,
        target,
        body.join(",\n"),
        attributes.join("\n"),
    );
    indent(&ddl).trim_end().to_string()
}

/// CTAS form of the staging table, used when no identity column is declared
pub fn build_staging_ctas(design: &TableDesign, staging: &str, query: &str) -> String {
    let columns = quoted_column_list(
        design
            .unskipped_columns()
            .filter(|column| !column.identity)
            .map(|column| column.name.as_str()),
    );
    let header = format!("CREATE TEMP TABLE {staging} (\n{columns})\nAS\n");
    format!("{}{}", indent(&header), query)
}

/// Populate a literal staging table from the transformation query
///
/// The column list leaves the identity column out so the sequence fills it.
pub fn build_staging_fill(design: &TableDesign, staging: &str, query: &str) -> String {
    let columns = quoted_column_list(
        design
            .unskipped_columns()
            .filter(|column| !column.identity)
            .map(|column| column.name.as_str()),
    );
    format!("INSERT INTO {staging} (\n{columns}\n) (\n{query}\n)")
}

/// Swap DML moving staged rows into the final table
///
/// With an identity column the staged rows are extended by one literal row
/// at key 0 so every foreign key pointing at the identity column has a
/// valid "unknown" target.
pub fn build_swap(design: &TableDesign, name: &RelationName, staging: &str) -> String {
    let columns = quoted_column_list(design.unskipped_column_names());
    if design.has_identity() {
        let values = design
            .unskipped_columns()
            .map(sentinel_value)
            .collect::<Vec<_>>()
            .join(", ");
        indent(&format!(
            "INSERT INTO {name}\n(SELECT\n     {columns}\n   FROM {staging}\n  UNION ALL\n SELECT\n     {values})"
        ))
    } else {
        format!("INSERT INTO {name}\n    (SELECT {columns}\n       FROM {staging})")
    }
}

fn sentinel_value(column: &ColumnDef) -> String {
    if column.identity {
        return "0".to_string();
    }
    if !column.not_null {
        // Cast so the UNION ALL type-checks against the staged rows.
        return format!("NULL::{}", column.sql_type);
    }
    if column.sql_type.contains("timestamp") {
        return "'0000-01-01 00:00:00'".to_string();
    }
    let generic = column.generic_type.as_deref().unwrap_or("");
    if generic.contains("string") {
        "''".to_string()
    } else if generic.contains("boolean") {
        "FALSE".to_string()
    } else {
        "0".to_string()
    }
}

/// View DDL with an explicit column list
pub fn build_view(design: &TableDesign, name: &RelationName, query: &str) -> String {
    let columns = quoted_column_list(design.unskipped_column_names());
    format!("CREATE OR REPLACE VIEW {name} (\n{columns}\n) AS\n{query}")
}

/// COPY statement loading a table from object storage
pub fn build_copy(
    name: &RelationName,
    location: &str,
    iam_role: &str,
    with_manifest: bool,
) -> String {
    let manifest = if with_manifest { " MANIFEST" } else { "" };
    format!(
        "COPY {name}\n\
         FROM '{location}'\n\
         CREDENTIALS 'aws_iam_role={iam_role}'{manifest}\n\
         FORMAT AS CSV GZIP IGNOREHEADER 1\n\
         NULL AS '\\\\N'\n\
         TIMEFORMAT AS 'auto' DATEFORMAT AS 'auto'\n\
         TRUNCATECOLUMNS"
    )
}

/// Truncation substitute: only the owner may TRUNCATE, anyone with write
/// access may DELETE.
pub fn build_delete(name: &RelationName) -> String {
    format!("DELETE FROM {name}")
}

pub fn build_drop_table(name: &RelationName) -> String {
    format!("DROP TABLE IF EXISTS {name} CASCADE")
}

pub fn build_drop_view(name: &RelationName) -> String {
    format!("DROP VIEW IF EXISTS {name} CASCADE")
}

pub fn build_drop_staging(staging: &str) -> String {
    format!("DROP TABLE {staging}")
}

pub fn build_alter_owner(name: &RelationName, owner: &str) -> String {
    format!("ALTER TABLE {name} OWNER TO \"{owner}\"")
}

pub fn build_grant_all(name: &RelationName, group: &str) -> String {
    format!("GRANT ALL PRIVILEGES ON {name} TO GROUP \"{group}\"")
}

pub fn build_grant_select(name: &RelationName, group: &str) -> String {
    format!("GRANT SELECT ON {name} TO GROUP \"{group}\"")
}

pub fn build_analyze(name: &RelationName) -> String {
    format!("ANALYZE {name}")
}

pub fn build_vacuum(name: &RelationName) -> String {
    format!("VACUUM {name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::{Constraints, ForeignKey, SourceKind, TableAttributes};
    use pretty_assertions::assert_eq;

    fn orders_design() -> TableDesign {
        TableDesign::new("www.orders", SourceKind::Ctas)
            .with_columns(vec![
                ColumnDef::new("id", "integer").with_identity().with_not_null(),
                ColumnDef::new("amount", "numeric(10,2)"),
            ])
            .with_constraints(Constraints {
                primary_key: Some(vec!["id".to_string()]),
                ..Constraints::default()
            })
            .with_attributes(TableAttributes {
                distribution: Some(Distribution::Key(vec!["id".to_string()])),
                compound_sort: Some(vec!["id".to_string()]),
                ..TableAttributes::default()
            })
    }

    #[test]
    fn test_final_table_ddl() {
        let design = orders_design();
        let name = RelationName::new("www", "orders");
        let ddl = build_table(&design, &name.to_string(), false);
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"www\".\"orders\" (\n    \
             \"id\" integer NOT NULL,\n    \
             \"amount\" numeric(10,2),\n    \
             PRIMARY KEY ( \"id\" ))\n    \
             DISTSTYLE KEY\n    \
             DISTKEY ( \"id\" )\n    \
             COMPOUND SORTKEY ( \"id\" )"
        );
    }

    #[test]
    fn test_staging_table_keeps_identity_drops_attributes() {
        let design = orders_design();
        let name = RelationName::new("www", "orders");
        let ddl = build_table(&design, &staging_table_name(&name), true);
        assert_eq!(
            ddl,
            "CREATE TEMP TABLE IF NOT EXISTS \"staging$orders\" (\n    \
             \"id\" integer IDENTITY(1, 1) NOT NULL,\n    \
             \"amount\" numeric(10,2),\n    \
             PRIMARY KEY ( \"id\" ))"
        );
        assert!(ddl.contains("\"id\" integer IDENTITY(1, 1) NOT NULL"));
        assert!(ddl.contains("PRIMARY KEY ( \"id\" )"));
    }

    #[test]
    fn test_ddl_is_deterministic() {
        let design = orders_design();
        let name = RelationName::new("www", "orders");
        assert_eq!(
            build_table(&design, &name.to_string(), false),
            build_table(&design, &name.to_string(), false)
        );
    }

    #[test]
    fn test_column_clause_order() {
        let column = ColumnDef::new("status", "varchar(32)")
            .with_encoding("lzo")
            .with_not_null()
            .with_references("www.status_codes", vec!["code".to_string()]);
        let design = TableDesign::new("www.t", SourceKind::Ctas).with_columns(vec![column]);
        let ddl = build_table(&design, "\"www\".\"t\"", false);
        assert!(ddl.contains(
            "\"status\" varchar(32) ENCODE lzo NOT NULL \
             REFERENCES \"www\".\"status_codes\" ( \"code\" )"
        ));
    }

    #[test]
    fn test_staging_drops_references_and_foreign_keys() {
        let design = TableDesign::new("www.t", SourceKind::Ctas)
            .with_columns(vec![ColumnDef::new("user_id", "bigint").with_references(
                "www.users",
                vec!["user_id".to_string()],
            )])
            .with_constraints(Constraints {
                foreign_key: Some(ForeignKey {
                    columns: vec!["user_id".to_string()],
                    references: ("www.users".to_string(), vec!["user_id".to_string()]),
                }),
                ..Constraints::default()
            });
        let final_ddl = build_table(&design, "\"www\".\"t\"", false);
        assert!(final_ddl.contains("REFERENCES \"www\".\"users\" ( \"user_id\" )"));
        assert!(final_ddl
            .contains("FOREIGN KEY ( \"user_id\" ) REFERENCES \"www\".\"users\" ( \"user_id\" )"));

        let staging_ddl = build_table(&design, "\"staging$t\"", true);
        assert!(!staging_ddl.contains("REFERENCES"));
        assert!(!staging_ddl.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_skipped_columns_are_left_out() {
        let design = TableDesign::new("www.t", SourceKind::Ctas).with_columns(vec![
            ColumnDef::new("kept", "integer"),
            ColumnDef::new("dropped", "integer").with_skipped(),
        ]);
        let ddl = build_table(&design, "\"www\".\"t\"", false);
        assert!(ddl.contains("\"kept\""));
        assert!(!ddl.contains("\"dropped\""));
    }

    #[test]
    fn test_distribution_styles() {
        let mut design = TableDesign::new("www.t", SourceKind::Ctas)
            .with_columns(vec![ColumnDef::new("a", "integer")]);

        design.attributes.distribution = Some(Distribution::Style(DistStyle::All));
        assert!(build_table(&design, "\"www\".\"t\"", false).contains("DISTSTYLE ALL"));

        design.attributes.distribution = Some(Distribution::Style(DistStyle::Even));
        assert!(build_table(&design, "\"www\".\"t\"", false).contains("DISTSTYLE EVEN"));
    }

    #[test]
    fn test_compound_sort_takes_precedence() {
        let mut design = TableDesign::new("www.t", SourceKind::Ctas)
            .with_columns(vec![ColumnDef::new("a", "integer")]);
        design.attributes.compound_sort = Some(vec!["a".to_string()]);
        design.attributes.interleaved_sort = Some(vec!["a".to_string()]);
        let ddl = build_table(&design, "\"www\".\"t\"", false);
        assert!(ddl.contains("COMPOUND SORTKEY ( \"a\" )"));
        assert!(!ddl.contains("INTERLEAVED"));
    }

    #[test]
    fn test_staging_ctas() {
        let design = TableDesign::new("www.t", SourceKind::Ctas).with_columns(vec![
            ColumnDef::new("a", "integer"),
            ColumnDef::new("b", "varchar(10)"),
        ]);
        let ddl = build_staging_ctas(&design, "\"staging$t\"", "SELECT a, b\nFROM raw.t");
        assert_eq!(
            ddl,
            "CREATE TEMP TABLE \"staging$t\" (\n    \
             \"a\", \"b\")\n    \
             AS\n    \
             SELECT a, b\nFROM raw.t"
        );
    }

    #[test]
    fn test_staging_fill_excludes_identity() {
        let design = orders_design();
        let dml = build_staging_fill(&design, "\"staging$orders\"", "SELECT amount FROM raw.orders");
        assert_eq!(
            dml,
            "INSERT INTO \"staging$orders\" (\n\
             \"amount\"\n\
             ) (\n\
             SELECT amount FROM raw.orders\n\
             )"
        );
    }

    #[test]
    fn test_swap_without_identity() {
        let design = TableDesign::new("www.t", SourceKind::Ctas).with_columns(vec![
            ColumnDef::new("a", "integer"),
            ColumnDef::new("b", "varchar(10)"),
        ]);
        let name = RelationName::new("www", "t");
        let dml = build_swap(&design, &name, "\"staging$t\"");
        assert_eq!(
            dml,
            "INSERT INTO \"www\".\"t\"\n    \
             (SELECT \"a\", \"b\"\n       \
             FROM \"staging$t\")"
        );
    }

    #[test]
    fn test_swap_with_identity_appends_sentinel_row() {
        let design = TableDesign::new("www.orders", SourceKind::Ctas).with_columns(vec![
            ColumnDef::new("id", "integer").with_identity().with_not_null(),
            ColumnDef::new("created_at", "timestamp").with_not_null(),
            ColumnDef::new("status", "varchar(32)")
                .with_generic_type("string")
                .with_not_null(),
            ColumnDef::new("is_open", "boolean")
                .with_generic_type("boolean")
                .with_not_null(),
            ColumnDef::new("amount", "numeric(10,2)"),
        ]);
        let name = RelationName::new("www", "orders");
        let dml = build_swap(&design, &name, "\"staging$orders\"");
        assert!(dml.contains("UNION ALL"));
        assert!(dml.contains("0, '0000-01-01 00:00:00', '', FALSE, NULL::numeric(10,2)"));
    }

    #[test]
    fn test_sentinel_falls_back_to_zero() {
        let column = ColumnDef::new("count", "integer").with_not_null();
        assert_eq!(sentinel_value(&column), "0");
    }

    #[test]
    fn test_view_ddl() {
        let design = TableDesign::new("stg.orders_view", SourceKind::View).with_columns(vec![
            ColumnDef::new("order_id", "integer"),
            ColumnDef::new("status", "varchar(32)"),
        ]);
        let name = RelationName::new("stg", "orders_view");
        let ddl = build_view(&design, &name, "SELECT order_id, status\nFROM raw.orders");
        assert_eq!(
            ddl,
            "CREATE OR REPLACE VIEW \"stg\".\"orders_view\" (\n\
             \"order_id\", \"status\"\n\
             ) AS\n\
             SELECT order_id, status\nFROM raw.orders"
        );
    }

    #[test]
    fn test_copy_with_manifest() {
        let name = RelationName::new("raw", "orders");
        let dml = build_copy(
            &name,
            "s3://acme-dwh/data/raw/orders.manifest",
            "arn:aws:iam::123456789012:role/dwh-load",
            true,
        );
        assert_eq!(
            dml,
            "COPY \"raw\".\"orders\"\n\
             FROM 's3://acme-dwh/data/raw/orders.manifest'\n\
             CREDENTIALS 'aws_iam_role=arn:aws:iam::123456789012:role/dwh-load' MANIFEST\n\
             FORMAT AS CSV GZIP IGNOREHEADER 1\n\
             NULL AS '\\\\N'\n\
             TIMEFORMAT AS 'auto' DATEFORMAT AS 'auto'\n\
             TRUNCATECOLUMNS"
        );
    }

    #[test]
    fn test_copy_from_prefix_has_no_manifest_keyword() {
        let name = RelationName::new("raw", "orders");
        let dml = build_copy(&name, "s3://acme-dwh/data/raw/orders", "role", false);
        assert!(dml.contains("CREDENTIALS 'aws_iam_role=role'\n"));
        assert!(!dml.contains("MANIFEST"));
    }

    #[test]
    fn test_administrative_statements() {
        let name = RelationName::new("www", "orders");
        assert_eq!(build_delete(&name), "DELETE FROM \"www\".\"orders\"");
        assert_eq!(
            build_drop_table(&name),
            "DROP TABLE IF EXISTS \"www\".\"orders\" CASCADE"
        );
        assert_eq!(
            build_drop_view(&name),
            "DROP VIEW IF EXISTS \"www\".\"orders\" CASCADE"
        );
        assert_eq!(build_drop_staging("\"staging$orders\""), "DROP TABLE \"staging$orders\"");
        assert_eq!(
            build_alter_owner(&name, "etl"),
            "ALTER TABLE \"www\".\"orders\" OWNER TO \"etl\""
        );
        assert_eq!(
            build_grant_all(&name, "etl"),
            "GRANT ALL PRIVILEGES ON \"www\".\"orders\" TO GROUP \"etl\""
        );
        assert_eq!(
            build_grant_select(&name, "analytics"),
            "GRANT SELECT ON \"www\".\"orders\" TO GROUP \"analytics\""
        );
        assert_eq!(build_analyze(&name), "ANALYZE \"www\".\"orders\"");
        assert_eq!(build_vacuum(&name), "VACUUM \"www\".\"orders\"");
    }

    #[test]
    fn test_unparseable_reference_is_quoted_whole() {
        let design = TableDesign::new("www.t", SourceKind::Ctas).with_columns(vec![
            ColumnDef::new("code", "integer").with_references("codes", vec!["code".to_string()]),
        ]);
        let ddl = build_table(&design, "\"www\".\"t\"", false);
        assert!(ddl.contains("REFERENCES \"codes\" ( \"code\" )"));
    }
}
