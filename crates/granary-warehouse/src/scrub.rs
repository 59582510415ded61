//! Credential scrubbing
//!
//! Statements carry credentials inline (COPY) and sometimes passwords
//! (user administration). Anything that ends up in a log line or a run
//! report goes through here first.

use once_cell::sync::Lazy;
use regex::Regex;

static CREDENTIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(CREDENTIALS|PASSWORD)\s*'[^']*'").unwrap());

/// Replace any credentials payload in a statement with an empty literal
///
/// The keyword is kept as written so the scrubbed text still reads like
/// the original statement.
pub fn scrub_credentials(statement: &str) -> String {
    CREDENTIALS.replace_all(statement, "$1 ''").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrubs_password() {
        let scrubbed =
            scrub_credentials("CREATE USER dw_user IN GROUP etl PASSWORD 'horse_staple_battery';");
        assert_eq!(scrubbed, "CREATE USER dw_user IN GROUP etl PASSWORD '';");
    }

    #[test]
    fn test_scrubs_copy_credentials_preserving_case() {
        let scrubbed = scrub_credentials(
            "copy listing from 's3://mybucket/data/listing/' credentials 'aws_access_key_id=AKIA...';",
        );
        assert_eq!(
            scrubbed,
            "copy listing from 's3://mybucket/data/listing/' credentials '';"
        );

        let scrubbed = scrub_credentials(
            "COPY LISTING FROM 's3://mybucket/data/listing/' CREDENTIALS 'aws_iam_role=arn:aws:iam::123:role/x';",
        );
        assert_eq!(
            scrubbed,
            "COPY LISTING FROM 's3://mybucket/data/listing/' CREDENTIALS '';"
        );
    }

    #[test]
    fn test_leaves_other_statements_alone() {
        let statement = "SELECT 'credentials are safe here' AS note";
        assert_eq!(scrub_credentials(statement), statement);
    }
}
