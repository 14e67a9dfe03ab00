//! Loads migration files, plans execution order, runs steps against storage.

use crate::error::{AppError, SchemaError};
use crate::filters::Filter;
use crate::migrations::step::{MigrationStep, SqlFileStep};
use crate::model::{FieldDef, FieldInit, Model, ModelSchema};
use crate::storage::{Engine, Objects, Session};
use crate::types::Boolean;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const LEDGER_TABLE: &str = "migrations";

/// A loaded step with its dependency tokens resolved to filenames.
pub struct LoadedStep {
    pub filename: String,
    pub step: Box<dyn MigrationStep>,
    pub depends: Vec<String>,
}

impl std::fmt::Debug for LoadedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStep")
            .field("filename", &self.filename)
            .field("migration_id", &self.step.migration_id())
            .field("depends", &self.depends)
            .finish()
    }
}

/// Directory-backed migration runner. Steps are `.sql` files; applied state
/// lives in the `migrations` ledger table, created on demand.
pub struct MigrationEngine {
    path: PathBuf,
}

impl MigrationEngine {
    pub fn new(path: impl Into<PathBuf>) -> MigrationEngine {
        MigrationEngine { path: path.into() }
    }

    fn list_files(&self) -> Result<Vec<String>, AppError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(".sql") {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Resolve a dependency token by substring match over the migration
    /// filenames. No match and several matches are both load failures.
    pub fn resolve(&self, token: &str) -> Result<String, AppError> {
        let files = self.list_files()?;
        Ok(resolve_token(&files, token)?)
    }

    /// Parse every migration file and resolve its dependencies.
    pub fn load(&self) -> Result<BTreeMap<String, LoadedStep>, AppError> {
        let files = self.list_files()?;
        let mut steps = BTreeMap::new();
        for filename in &files {
            let text = std::fs::read_to_string(self.path.join(filename))?;
            let step = SqlFileStep::parse(filename, &text)?;
            let depends = step
                .depends()
                .iter()
                .map(|token| resolve_token(&files, token))
                .collect::<Result<Vec<_>, _>>()?;
            steps.insert(
                filename.clone(),
                LoadedStep {
                    filename: filename.clone(),
                    step: Box::new(step),
                    depends,
                },
            );
        }
        Ok(steps)
    }

    /// Apply the named step and everything it depends on. When the step is
    /// already applied, its dependents are rolled back instead.
    pub async fn apply_by_name(&self, engine: &Engine, token: &str) -> Result<(), AppError> {
        let target = self.resolve(token)?;
        let steps = self.load()?;
        let applied = filename_state(&steps, &self.applied_state(engine).await?);
        let (direction, plan) = plan_toggle(&target, &depends_map(&steps), &applied);
        self.run(engine, &steps, &plan, direction).await
    }

    /// Roll back the named step, unwinding its dependents first.
    pub async fn rollback_by_name(&self, engine: &Engine, token: &str) -> Result<(), AppError> {
        let target = self.resolve(token)?;
        let steps = self.load()?;
        let applied = filename_state(&steps, &self.applied_state(engine).await?);
        let plan = plan_rollback(&target, &depends_map(&steps), &applied);
        self.run(engine, &steps, &plan, Direction::Down).await
    }

    /// Scaffold a new migration file with resolved dependency filenames.
    pub fn new_migration(&self, depends: &[String], message: &str) -> Result<PathBuf, AppError> {
        let resolved = depends
            .iter()
            .map(|token| self.resolve(token))
            .collect::<Result<Vec<_>, _>>()?;
        let id = Uuid::new_v4();
        let filename = format!("{}-{}.sql", &id.to_string()[..6], message.replace(' ', "-"));
        let path = self.path.join(filename);
        let body = format!(
            "-- migration_id: {}\n-- created: {}\n-- depends: {}\n-- upgrade\n\n-- downgrade\n",
            id,
            chrono::Utc::now().format("%Y-%m-%d"),
            resolved.join(", ")
        );
        std::fs::write(&path, body)?;
        Ok(path)
    }

    async fn run(
        &self,
        engine: &Engine,
        steps: &BTreeMap<String, LoadedStep>,
        plan: &[String],
        direction: Direction,
    ) -> Result<(), AppError> {
        for name in plan {
            let loaded = steps
                .get(name)
                .ok_or_else(|| AppError::NotFound(format!("migration file '{}'", name)))?;
            let mut session = engine.session().await?;
            let result = self
                .run_one(engine, &mut session, loaded, direction)
                .await;
            match result {
                Ok(()) => session.commit().await?,
                Err(e) => {
                    let _ = session.rollback().await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn run_one(
        &self,
        engine: &Engine,
        session: &mut Session,
        loaded: &LoadedStep,
        direction: Direction,
    ) -> Result<(), AppError> {
        match direction {
            Direction::Up => {
                tracing::info!(migration = %loaded.filename, "upgrade");
                loaded.step.upgrade(session).await?;
            }
            Direction::Down => {
                tracing::info!(migration = %loaded.filename, "downgrade");
                loaded.step.downgrade(session).await?;
            }
        }
        self.save_state(
            engine,
            session,
            loaded.step.migration_id(),
            matches!(direction, Direction::Up),
        )
        .await
    }

    /// Read the ledger, creating the table when absent. Keys are migration
    /// ids; [`filename_state`] re-keys them for the planners.
    async fn applied_state(&self, engine: &Engine) -> Result<BTreeMap<String, bool>, AppError> {
        let mut session = engine.session().await?;
        let result = self.applied_state_in(engine, &mut session).await;
        match result {
            Ok(state) => {
                session.commit().await?;
                Ok(state)
            }
            Err(e) => {
                let _ = session.rollback().await;
                Err(e)
            }
        }
    }

    async fn applied_state_in(
        &self,
        engine: &Engine,
        session: &mut Session,
    ) -> Result<BTreeMap<String, bool>, AppError> {
        self.init_ledger(session).await?;
        let ledger = Objects::new(ledger_schema()?);
        let rows = ledger
            .get_all(engine, Some(session), &BTreeMap::new())
            .await?;
        let mut state = BTreeMap::new();
        for row in rows {
            let id = row
                .identifier()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            let applied = row.get("applied").and_then(Value::as_bool).unwrap_or(false);
            state.insert(id, applied);
        }
        Ok(state)
    }

    async fn init_ledger(&self, session: &mut Session) -> Result<(), AppError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (uuid CHAR(36) NOT NULL, applied BOOLEAN NOT NULL, PRIMARY KEY (uuid))",
            LEDGER_TABLE
        );
        session.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn save_state(
        &self,
        engine: &Engine,
        session: &mut Session,
        id: Uuid,
        applied: bool,
    ) -> Result<(), AppError> {
        let schema = ledger_schema()?;
        let ledger = Objects::new(schema.clone());
        let mut filters = BTreeMap::new();
        filters.insert("uuid".to_string(), Filter::Eq(json!(id.to_string())));
        match ledger.get_one(engine, Some(session), &filters).await {
            Ok(mut row) => {
                let mut init = BTreeMap::new();
                init.insert("applied".to_string(), FieldInit::Value(json!(applied)));
                row.apply(init)?;
                row.update(engine, Some(session)).await
            }
            Err(AppError::NotFound(_)) => {
                let mut init = BTreeMap::new();
                init.insert(
                    "uuid".to_string(),
                    FieldInit::Value(json!(id.to_string())),
                );
                init.insert("applied".to_string(), FieldInit::Value(json!(applied)));
                let mut row = Model::new(&schema, init)?;
                row.insert(engine, Some(session)).await
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Plan selection for the apply toggle: an unapplied target applies with its
/// dependencies; an applied target instead unwinds its dependents, staying
/// applied itself.
fn plan_toggle(
    target: &str,
    depends: &BTreeMap<String, Vec<String>>,
    applied: &BTreeMap<String, bool>,
) -> (Direction, Vec<String>) {
    if is_applied(applied, target) {
        let mut plan = plan_rollback(target, depends, applied);
        plan.pop();
        (Direction::Down, plan)
    } else {
        (Direction::Up, plan_apply(target, depends, applied))
    }
}

fn ledger_schema() -> Result<Arc<ModelSchema>, SchemaError> {
    ModelSchema::builder("migration", LEDGER_TABLE)
        .field(FieldDef::uuid_identifier())
        .field(FieldDef::scalar("applied", Boolean).required())
        .build()
}

fn resolve_token(files: &[String], token: &str) -> Result<String, SchemaError> {
    let matches: Vec<&String> = files.iter().filter(|f| f.contains(token)).collect();
    match matches.len() {
        1 => Ok(matches[0].clone()),
        0 => Err(SchemaError::UnknownDependency {
            token: token.to_string(),
        }),
        _ => Err(SchemaError::AmbiguousDependency {
            token: token.to_string(),
            matches: matches.into_iter().cloned().collect(),
        }),
    }
}

/// Re-key ledger state (migration id -> applied) by filename.
fn filename_state(
    steps: &BTreeMap<String, LoadedStep>,
    by_id: &BTreeMap<String, bool>,
) -> BTreeMap<String, bool> {
    steps
        .iter()
        .map(|(name, loaded)| {
            let id = loaded.step.migration_id().to_string();
            (name.clone(), by_id.get(&id).copied().unwrap_or(false))
        })
        .collect()
}

fn depends_map(steps: &BTreeMap<String, LoadedStep>) -> BTreeMap<String, Vec<String>> {
    steps
        .iter()
        .map(|(name, loaded)| (name.clone(), loaded.depends.clone()))
        .collect()
}

fn is_applied(applied: &BTreeMap<String, bool>, name: &str) -> bool {
    applied.get(name).copied().unwrap_or(false)
}

/// Execution order for applying `target`: dependencies first, already-applied
/// steps skipped. Applied state is keyed by filename.
pub fn plan_apply(
    target: &str,
    depends: &BTreeMap<String, Vec<String>>,
    applied: &BTreeMap<String, bool>,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    visit_apply(target, depends, applied, &mut seen, &mut out);
    out
}

fn visit_apply(
    name: &str,
    depends: &BTreeMap<String, Vec<String>>,
    applied: &BTreeMap<String, bool>,
    seen: &mut BTreeSet<String>,
    out: &mut Vec<String>,
) {
    if !seen.insert(name.to_string()) || is_applied(applied, name) {
        return;
    }
    if let Some(deps) = depends.get(name) {
        for dep in deps {
            visit_apply(dep, depends, applied, seen, out);
        }
    }
    out.push(name.to_string());
}

/// Execution order for rolling back `target`: applied dependents unwind
/// first, unapplied steps are skipped.
pub fn plan_rollback(
    target: &str,
    depends: &BTreeMap<String, Vec<String>>,
    applied: &BTreeMap<String, bool>,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    visit_rollback(target, depends, applied, &mut seen, &mut out);
    out
}

fn visit_rollback(
    name: &str,
    depends: &BTreeMap<String, Vec<String>>,
    applied: &BTreeMap<String, bool>,
    seen: &mut BTreeSet<String>,
    out: &mut Vec<String>,
) {
    if !seen.insert(name.to_string()) || !is_applied(applied, name) {
        return;
    }
    for (dependent, deps) in depends {
        if deps.iter().any(|d| d == name) {
            visit_rollback(dependent, depends, applied, seen, out);
        }
    }
    out.push(name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> BTreeMap<String, Vec<String>> {
        // c depends on b depends on a
        let mut m = BTreeMap::new();
        m.insert("a.sql".to_string(), vec![]);
        m.insert("b.sql".to_string(), vec!["a.sql".to_string()]);
        m.insert("c.sql".to_string(), vec!["b.sql".to_string()]);
        m
    }

    fn state(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn apply_orders_dependencies_first() {
        let plan = plan_apply("c.sql", &chain(), &BTreeMap::new());
        assert_eq!(plan, ["a.sql", "b.sql", "c.sql"]);
    }

    #[test]
    fn apply_skips_already_applied() {
        let plan = plan_apply("c.sql", &chain(), &state(&[("a.sql", true)]));
        assert_eq!(plan, ["b.sql", "c.sql"]);
        let plan = plan_apply("c.sql", &chain(), &state(&[("c.sql", true)]));
        assert!(plan.is_empty());
    }

    #[test]
    fn rollback_unwinds_dependents_first() {
        let all = state(&[("a.sql", true), ("b.sql", true), ("c.sql", true)]);
        let plan = plan_rollback("a.sql", &chain(), &all);
        assert_eq!(plan, ["c.sql", "b.sql", "a.sql"]);
    }

    #[test]
    fn rollback_skips_unapplied() {
        let some = state(&[("a.sql", true), ("b.sql", true)]);
        let plan = plan_rollback("a.sql", &chain(), &some);
        assert_eq!(plan, ["b.sql", "a.sql"]);
        assert!(plan_rollback("c.sql", &chain(), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn toggle_applies_an_unapplied_target() {
        let (direction, plan) = plan_toggle("c.sql", &chain(), &BTreeMap::new());
        assert_eq!(direction, Direction::Up);
        assert_eq!(plan, ["a.sql", "b.sql", "c.sql"]);
    }

    #[test]
    fn toggle_unwinds_dependents_of_an_applied_target() {
        let all = state(&[("a.sql", true), ("b.sql", true), ("c.sql", true)]);
        let (direction, plan) = plan_toggle("a.sql", &chain(), &all);
        assert_eq!(direction, Direction::Down);
        // The target itself stays applied; only its dependents unwind.
        assert_eq!(plan, ["c.sql", "b.sql"]);
    }

    #[test]
    fn toggle_on_an_applied_leaf_plans_nothing() {
        let all = state(&[("a.sql", true), ("b.sql", true), ("c.sql", true)]);
        let (direction, plan) = plan_toggle("c.sql", &chain(), &all);
        assert_eq!(direction, Direction::Down);
        assert!(plan.is_empty());
    }

    #[test]
    fn diamond_dependency_applies_once() {
        // d depends on b and c, both depend on a
        let mut m = BTreeMap::new();
        m.insert("a.sql".to_string(), vec![]);
        m.insert("b.sql".to_string(), vec!["a.sql".to_string()]);
        m.insert("c.sql".to_string(), vec!["a.sql".to_string()]);
        m.insert(
            "d.sql".to_string(),
            vec!["b.sql".to_string(), "c.sql".to_string()],
        );
        let plan = plan_apply("d.sql", &m, &BTreeMap::new());
        assert_eq!(plan, ["a.sql", "b.sql", "c.sql", "d.sql"]);
    }

    #[test]
    fn ledger_state_rekeys_by_filename() {
        let step = SqlFileStep::parse(
            "a.sql",
            "-- migration_id: 9a1c6f00-0000-4000-8000-000000000000\n-- upgrade\n",
        )
        .unwrap();
        let mut steps = BTreeMap::new();
        steps.insert(
            "a.sql".to_string(),
            LoadedStep {
                filename: "a.sql".to_string(),
                step: Box::new(step),
                depends: vec![],
            },
        );
        let mut by_id = BTreeMap::new();
        by_id.insert("9a1c6f00-0000-4000-8000-000000000000".to_string(), true);
        let state = filename_state(&steps, &by_id);
        assert_eq!(state.get("a.sql"), Some(&true));
        assert_eq!(
            filename_state(&steps, &BTreeMap::new()).get("a.sql"),
            Some(&false)
        );
    }

    #[test]
    fn token_resolution_is_substring_based() {
        let files = vec![
            "9a1c6f-init-tables.sql".to_string(),
            "77b2aa-seed-data.sql".to_string(),
        ];
        assert_eq!(
            resolve_token(&files, "init").unwrap(),
            "9a1c6f-init-tables.sql"
        );
        assert!(matches!(
            resolve_token(&files, "nope"),
            Err(SchemaError::UnknownDependency { .. })
        ));
        assert!(matches!(
            resolve_token(&files, ".sql"),
            Err(SchemaError::AmbiguousDependency { .. })
        ));
    }

    #[test]
    fn loader_resolves_dependency_tokens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("9a1c6f-init-tables.sql"),
            "-- migration_id: 9a1c6f00-0000-4000-8000-000000000000\n\
             -- upgrade\nCREATE TABLE t (x INT);\n-- downgrade\nDROP TABLE t;\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("77b2aa-seed-data.sql"),
            "-- migration_id: 77b2aa00-0000-4000-8000-000000000000\n\
             -- depends: init\n\
             -- upgrade\nINSERT INTO t VALUES (1);\n-- downgrade\nDELETE FROM t;\n",
        )
        .unwrap();
        let engine = MigrationEngine::new(dir.path());
        let steps = engine.load().unwrap();
        assert_eq!(
            steps["77b2aa-seed-data.sql"].depends,
            ["9a1c6f-init-tables.sql"]
        );
        assert!(steps["9a1c6f-init-tables.sql"].depends.is_empty());
    }

    #[test]
    fn loader_fails_on_unknown_dependency() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.sql"),
            "-- migration_id: 9a1c6f00-0000-4000-8000-000000000000\n\
             -- depends: missing\n-- upgrade\nSELECT 1;\n",
        )
        .unwrap();
        let err = MigrationEngine::new(dir.path()).load().unwrap_err();
        assert!(matches!(
            err,
            AppError::Schema(SchemaError::UnknownDependency { token }) if token == "missing"
        ));
    }

    #[test]
    fn scaffold_writes_resolved_depends() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("9a1c6f-init-tables.sql"),
            "-- migration_id: 9a1c6f00-0000-4000-8000-000000000000\n-- upgrade\n",
        )
        .unwrap();
        let engine = MigrationEngine::new(dir.path());
        let path = engine
            .new_migration(&["init".to_string()], "add vms table")
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-add-vms-table.sql"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("-- depends: 9a1c6f-init-tables.sql"));
        assert!(SqlFileStep::parse(&name, &body).is_ok());
    }
}
