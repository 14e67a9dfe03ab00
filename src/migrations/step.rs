//! One migration step: identity, dependencies, upgrade and downgrade.

use crate::error::{AppError, SchemaError};
use crate::storage::Session;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn migration_id(&self) -> Uuid;

    /// Dependency tokens as declared; the loader resolves them to filenames.
    fn depends(&self) -> &[String];

    async fn upgrade(&self, session: &mut Session) -> Result<(), AppError>;

    async fn downgrade(&self, session: &mut Session) -> Result<(), AppError>;
}

/// A step parsed from a `.sql` file.
///
/// The file carries its identity and dependencies in header comments, then
/// one statement block per direction:
///
/// ```sql
/// -- migration_id: 9a1c6f00-0000-4000-8000-000000000000
/// -- depends: init-tables
/// -- upgrade
/// CREATE TABLE vms (uuid CHAR(36) PRIMARY KEY, name VARCHAR(255));
/// -- downgrade
/// DROP TABLE vms;
/// ```
#[derive(Debug)]
pub struct SqlFileStep {
    id: Uuid,
    depends: Vec<String>,
    upgrade: Vec<String>,
    downgrade: Vec<String>,
}

enum Section {
    Header,
    Upgrade,
    Downgrade,
}

impl SqlFileStep {
    pub fn parse(filename: &str, text: &str) -> Result<SqlFileStep, SchemaError> {
        let mut id = None;
        let mut depends = Vec::new();
        let mut upgrade = String::new();
        let mut downgrade = String::new();
        let mut section = Section::Header;

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(raw) = trimmed.strip_prefix("-- migration_id:") {
                let parsed = Uuid::parse_str(raw.trim()).map_err(|e| {
                    SchemaError::Migration(format!("{}: bad migration_id: {}", filename, e))
                })?;
                id = Some(parsed);
            } else if let Some(raw) = trimmed.strip_prefix("-- depends:") {
                depends.extend(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from),
                );
            } else if trimmed == "-- upgrade" {
                section = Section::Upgrade;
            } else if trimmed == "-- downgrade" {
                section = Section::Downgrade;
            } else if !trimmed.starts_with("--") {
                match section {
                    Section::Header => {}
                    Section::Upgrade => {
                        upgrade.push_str(line);
                        upgrade.push('\n');
                    }
                    Section::Downgrade => {
                        downgrade.push_str(line);
                        downgrade.push('\n');
                    }
                }
            }
        }

        let id = id.ok_or_else(|| {
            SchemaError::Migration(format!("{}: no migration_id header", filename))
        })?;
        Ok(SqlFileStep {
            id,
            depends,
            upgrade: split_statements(&upgrade),
            downgrade: split_statements(&downgrade),
        })
    }

    pub fn upgrade_statements(&self) -> &[String] {
        &self.upgrade
    }

    pub fn downgrade_statements(&self) -> &[String] {
        &self.downgrade
    }
}

fn split_statements(block: &str) -> Vec<String> {
    block
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl MigrationStep for SqlFileStep {
    fn migration_id(&self) -> Uuid {
        self.id
    }

    fn depends(&self) -> &[String] {
        &self.depends
    }

    async fn upgrade(&self, session: &mut Session) -> Result<(), AppError> {
        for stmt in &self.upgrade {
            session.execute(stmt, &[]).await?;
        }
        Ok(())
    }

    async fn downgrade(&self, session: &mut Session) -> Result<(), AppError> {
        for stmt in &self.downgrade {
            session.execute(stmt, &[]).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
-- migration_id: 9a1c6f00-0000-4000-8000-000000000000
-- depends: init-tables, seed-data
-- upgrade
CREATE TABLE vms (
    uuid CHAR(36) PRIMARY KEY,
    name VARCHAR(255)
);
ALTER TABLE vms ADD COLUMN cores INT;
-- downgrade
DROP TABLE vms;
";

    #[test]
    fn parses_headers_and_sections() {
        let step = SqlFileStep::parse("a.sql", SAMPLE).unwrap();
        assert_eq!(
            step.migration_id().to_string(),
            "9a1c6f00-0000-4000-8000-000000000000"
        );
        assert_eq!(step.depends(), ["init-tables", "seed-data"]);
        assert_eq!(step.upgrade_statements().len(), 2);
        assert!(step.upgrade_statements()[0].starts_with("CREATE TABLE vms"));
        assert_eq!(step.downgrade_statements(), ["DROP TABLE vms"]);
    }

    #[test]
    fn missing_id_fails_parse() {
        let err = SqlFileStep::parse("a.sql", "-- upgrade\nSELECT 1;").unwrap_err();
        assert!(matches!(err, SchemaError::Migration(m) if m.contains("no migration_id")));
    }

    #[test]
    fn bad_uuid_fails_parse() {
        let err = SqlFileStep::parse("a.sql", "-- migration_id: nope\n").unwrap_err();
        assert!(matches!(err, SchemaError::Migration(m) if m.contains("bad migration_id")));
    }

    #[test]
    fn comment_lines_are_not_statements() {
        let step = SqlFileStep::parse(
            "a.sql",
            "-- migration_id: 9a1c6f00-0000-4000-8000-000000000000\n\
             -- upgrade\n\
             -- just a note\n\
             SELECT 1;\n",
        )
        .unwrap();
        assert_eq!(step.upgrade_statements(), ["SELECT 1"]);
    }
}
