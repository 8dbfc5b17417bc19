use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use tracing::debug;

use super::{AssessmentStore, Ledger, StoreError};
use crate::workflows::assessment::domain::{
    AnswerId, AnswerStatus, AnswerWrite, Auditor, AuditorId, AuditorScore, AuditorScoreId,
    AuditorSubmission, Choice, ChoiceId, Company, CompanyAnswer, CompanyId, CompanySubmission,
    Pillar, PillarId, PillarResult, Point, PointId, Question, QuestionId, RecordRef, SubjectId,
    SubmissionId, SubmissionTarget, Upserted,
};

const SCHEMA_VERSION: i64 = 1;

/// v001: catalog, answer ledgers, submission markers, pillar result cache.
///
/// Partial unique indexes (`WHERE deleted_at IS NULL`) are the authoritative guards for the
/// natural keys; soft-deleted rows never block a new active row.
const MIGRATION_V001: &str = "
    CREATE TABLE IF NOT EXISTS companies (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        subject     TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_companies_subject ON companies(subject);

    CREATE TABLE IF NOT EXISTS auditors (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        subject     TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_auditors_subject ON auditors(subject);

    CREATE TABLE IF NOT EXISTS pillars (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        key         TEXT NOT NULL,
        name        TEXT NOT NULL,
        weight      REAL CHECK (weight IS NULL OR weight >= 0),
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_pillars_key
        ON pillars(key) WHERE deleted_at IS NULL;

    CREATE TABLE IF NOT EXISTS questions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        pillar_id   INTEGER NOT NULL REFERENCES pillars(id),
        title       TEXT NOT NULL,
        description TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_questions_pillar ON questions(pillar_id);

    CREATE TABLE IF NOT EXISTS points (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        score       REAL NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );

    CREATE TABLE IF NOT EXISTS choices (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id INTEGER NOT NULL REFERENCES questions(id),
        label       TEXT NOT NULL,
        point_id    INTEGER REFERENCES points(id),
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_choices_question ON choices(question_id);

    CREATE TABLE IF NOT EXISTS company_answers (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id        INTEGER NOT NULL REFERENCES companies(id),
        question_id       INTEGER NOT NULL REFERENCES questions(id),
        choice_id         INTEGER REFERENCES choices(id),
        performance_notes TEXT,
        status            TEXT NOT NULL CHECK (status IN ('draft', 'submitted')),
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL,
        deleted_at        TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_company_answers_question
        ON company_answers(company_id, question_id) WHERE deleted_at IS NULL;

    CREATE TRIGGER IF NOT EXISTS trg_company_answers_frozen
    BEFORE UPDATE OF status, choice_id, performance_notes ON company_answers
    WHEN OLD.status = 'submitted'
        AND (NEW.status <> 'submitted'
            OR NEW.choice_id IS NOT OLD.choice_id
            OR NEW.performance_notes IS NOT OLD.performance_notes)
    BEGIN
        SELECT RAISE(ABORT, 'submitted answers are frozen');
    END;

    CREATE TABLE IF NOT EXISTS auditor_scores (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        auditor_id  INTEGER NOT NULL REFERENCES auditors(id),
        company_id  INTEGER NOT NULL REFERENCES companies(id),
        question_id INTEGER NOT NULL REFERENCES questions(id),
        answer_id   INTEGER NOT NULL REFERENCES company_answers(id),
        choice_id   INTEGER NOT NULL REFERENCES choices(id),
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_auditor_scores_answer
        ON auditor_scores(auditor_id, answer_id) WHERE deleted_at IS NULL;

    CREATE TABLE IF NOT EXISTS company_submissions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id  INTEGER NOT NULL REFERENCES companies(id),
        pillar_id   INTEGER REFERENCES pillars(id),
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_company_submissions_company
        ON company_submissions(company_id, created_at);

    CREATE TABLE IF NOT EXISTS auditor_submissions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        auditor_id  INTEGER NOT NULL REFERENCES auditors(id),
        company_id  INTEGER NOT NULL REFERENCES companies(id),
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_auditor_submissions_pair
        ON auditor_submissions(auditor_id, company_id) WHERE deleted_at IS NULL;

    CREATE TABLE IF NOT EXISTS pillar_results (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id  INTEGER NOT NULL REFERENCES companies(id),
        pillar_id   INTEGER NOT NULL REFERENCES pillars(id),
        score       REAL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        deleted_at  TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_pillar_results_pair
        ON pillar_results(company_id, pillar_id) WHERE deleted_at IS NULL;
";

/// SQLite-backed store. One connection guarded by a mutex; every unit of work is an
/// `IMMEDIATE` transaction so concurrent writers serialize on the database lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// How long a unit of work waits for another connection's write lock before failing
    /// with [`StoreError::Conflict`]. SQLite's default through rusqlite is five seconds.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Result<Self, StoreError> {
        let conn = self
            .conn
            .get_mut()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))?;
        conn.busy_timeout(timeout)?;
        Ok(self)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(MIGRATION_V001)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!(from = version, to = SCHEMA_VERSION, "applied sqlite migration");
    }
    Ok(())
}

impl AssessmentStore for SqliteStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let output = {
            let mut ledger = SqliteLedger { conn: &tx };
            work(&mut ledger)?
        };
        tx.commit().map_err(StoreError::from)?;
        Ok(output)
    }
}

fn locked(answer: &CompanyAnswer) -> StoreError {
    StoreError::Locked {
        answer: answer.id,
        question: answer.question_id,
    }
}

/// `trg_company_answers_frozen` aborts with `SQLITE_CONSTRAINT_TRIGGER`; that is a submitted
/// answer, not a uniqueness race.
fn frozen_or_store(err: rusqlite::Error, answer: &CompanyAnswer) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER =>
        {
            locked(answer)
        }
        _ => StoreError::from(err),
    }
}

struct SqliteLedger<'a> {
    conn: &'a Connection,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn status_from_sql(index: usize, raw: String) -> rusqlite::Result<AnswerStatus> {
    AnswerStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("unknown answer status '{raw}'").into(),
        )
    })
}

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: CompanyId(row.get(0)?),
        name: row.get(1)?,
        subject: row.get::<_, Option<String>>(2)?.map(SubjectId),
    })
}

fn auditor_from_row(row: &Row<'_>) -> rusqlite::Result<Auditor> {
    Ok(Auditor {
        id: AuditorId(row.get(0)?),
        subject: SubjectId(row.get(1)?),
    })
}

fn pillar_from_row(row: &Row<'_>) -> rusqlite::Result<Pillar> {
    Ok(Pillar {
        id: PillarId(row.get(0)?),
        key: row.get(1)?,
        name: row.get(2)?,
        weight: row.get(3)?,
    })
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: QuestionId(row.get(0)?),
        pillar_id: PillarId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
    })
}

fn choice_from_row(row: &Row<'_>) -> rusqlite::Result<Choice> {
    Ok(Choice {
        id: ChoiceId(row.get(0)?),
        question_id: QuestionId(row.get(1)?),
        label: row.get(2)?,
        point_id: row.get::<_, Option<i64>>(3)?.map(PointId),
    })
}

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<Point> {
    Ok(Point {
        id: PointId(row.get(0)?),
        score: row.get(1)?,
    })
}

const ANSWER_COLUMNS: &str =
    "id, company_id, question_id, choice_id, performance_notes, status, updated_at";

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyAnswer> {
    Ok(CompanyAnswer {
        id: AnswerId(row.get(0)?),
        company_id: CompanyId(row.get(1)?),
        question_id: QuestionId(row.get(2)?),
        choice_id: row.get::<_, Option<i64>>(3)?.map(ChoiceId),
        performance_notes: row.get(4)?,
        status: status_from_sql(5, row.get(5)?)?,
        updated_at: row.get(6)?,
    })
}

fn auditor_score_from_row(row: &Row<'_>) -> rusqlite::Result<AuditorScore> {
    Ok(AuditorScore {
        id: AuditorScoreId(row.get(0)?),
        auditor_id: AuditorId(row.get(1)?),
        company_id: CompanyId(row.get(2)?),
        question_id: QuestionId(row.get(3)?),
        answer_id: AnswerId(row.get(4)?),
        choice_id: ChoiceId(row.get(5)?),
        updated_at: row.get(6)?,
    })
}

fn company_submission_from_row(row: &Row<'_>) -> rusqlite::Result<CompanySubmission> {
    let target = match row.get::<_, Option<i64>>(2)? {
        Some(pillar) => SubmissionTarget::Pillar(PillarId(pillar)),
        None => SubmissionTarget::Assessment,
    };
    Ok(CompanySubmission {
        id: SubmissionId(row.get(0)?),
        company_id: CompanyId(row.get(1)?),
        target,
        submitted_at: row.get(3)?,
    })
}

fn auditor_submission_from_row(row: &Row<'_>) -> rusqlite::Result<AuditorSubmission> {
    Ok(AuditorSubmission {
        id: SubmissionId(row.get(0)?),
        auditor_id: AuditorId(row.get(1)?),
        company_id: CompanyId(row.get(2)?),
        submitted_at: row.get(3)?,
    })
}

fn target_pillar(target: SubmissionTarget) -> Option<i64> {
    match target {
        SubmissionTarget::Pillar(pillar) => Some(pillar.0),
        SubmissionTarget::Assessment => None,
    }
}

impl SqliteLedger<'_> {
    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn collect<T>(
        &self,
        sql: &str,
        ids: impl IntoIterator<Item = i64>,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(ids), map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn answer_for(
        &self,
        company: CompanyId,
        question: QuestionId,
    ) -> Result<Option<CompanyAnswer>, StoreError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM company_answers
             WHERE company_id = ?1 AND question_id = ?2 AND deleted_at IS NULL"
        );
        Ok(self
            .conn
            .query_row(&sql, params![company.0, question.0], answer_from_row)
            .optional()?)
    }
}

impl Ledger for SqliteLedger<'_> {
    fn insert_company(
        &mut self,
        name: &str,
        subject: Option<&SubjectId>,
    ) -> Result<CompanyId, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO companies (name, subject, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, subject.map(|subject| subject.0.as_str()), now],
        )?;
        Ok(CompanyId(self.conn.last_insert_rowid()))
    }

    fn insert_auditor(&mut self, subject: &SubjectId) -> Result<AuditorId, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO auditors (subject, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![subject.0, now],
        )?;
        Ok(AuditorId(self.conn.last_insert_rowid()))
    }

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, subject FROM companies WHERE id = ?1 AND deleted_at IS NULL",
                params![id.0],
                company_from_row,
            )
            .optional()?)
    }

    fn company_by_subject(&self, subject: &SubjectId) -> Result<Option<Company>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, subject FROM companies
                 WHERE subject = ?1 AND deleted_at IS NULL ORDER BY id LIMIT 1",
                params![subject.0],
                company_from_row,
            )
            .optional()?)
    }

    fn auditor(&self, id: AuditorId) -> Result<Option<Auditor>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, subject FROM auditors WHERE id = ?1 AND deleted_at IS NULL",
                params![id.0],
                auditor_from_row,
            )
            .optional()?)
    }

    fn auditor_by_subject(&self, subject: &SubjectId) -> Result<Option<Auditor>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, subject FROM auditors
                 WHERE subject = ?1 AND deleted_at IS NULL ORDER BY id LIMIT 1",
                params![subject.0],
                auditor_from_row,
            )
            .optional()?)
    }

    fn upsert_pillar(
        &mut self,
        key: &str,
        name: &str,
        weight: Option<f64>,
    ) -> Result<Upserted<PillarId>, StoreError> {
        let now = Self::now();
        if let Some(existing) = self.pillar_by_key(key)? {
            self.conn.execute(
                "UPDATE pillars SET name = ?1, weight = ?2, updated_at = ?3 WHERE id = ?4",
                params![name, weight, now, existing.id.0],
            )?;
            return Ok(Upserted::Updated(existing.id));
        }

        self.conn.execute(
            "INSERT INTO pillars (key, name, weight, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![key, name, weight, now],
        )?;
        Ok(Upserted::Created(PillarId(self.conn.last_insert_rowid())))
    }

    fn insert_question(
        &mut self,
        pillar: PillarId,
        title: &str,
        description: Option<&str>,
    ) -> Result<QuestionId, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO questions (pillar_id, title, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![pillar.0, title, description, now],
        )?;
        Ok(QuestionId(self.conn.last_insert_rowid()))
    }

    fn insert_point(&mut self, score: f64) -> Result<PointId, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO points (score, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![score, now],
        )?;
        Ok(PointId(self.conn.last_insert_rowid()))
    }

    fn insert_choice(
        &mut self,
        question: QuestionId,
        label: &str,
        point: Option<PointId>,
    ) -> Result<ChoiceId, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO choices (question_id, label, point_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![question.0, label, point.map(|point| point.0), now],
        )?;
        Ok(ChoiceId(self.conn.last_insert_rowid()))
    }

    fn pillars(&self) -> Result<Vec<Pillar>, StoreError> {
        self.collect(
            "SELECT id, key, name, weight FROM pillars WHERE deleted_at IS NULL ORDER BY id",
            [],
            pillar_from_row,
        )
    }

    fn pillar_by_key(&self, key: &str) -> Result<Option<Pillar>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, key, name, weight FROM pillars WHERE key = ?1 AND deleted_at IS NULL",
                params![key],
                pillar_from_row,
            )
            .optional()?)
    }

    fn questions_in_pillar(&self, pillar: PillarId) -> Result<Vec<Question>, StoreError> {
        self.collect(
            "SELECT id, pillar_id, title, description FROM questions
             WHERE pillar_id = ? AND deleted_at IS NULL ORDER BY id",
            [pillar.0],
            question_from_row,
        )
    }

    fn active_question_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM questions WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn choices(&self, ids: &[ChoiceId]) -> Result<Vec<Choice>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, question_id, label, point_id FROM choices
             WHERE id IN ({}) AND deleted_at IS NULL ORDER BY id",
            placeholders(ids.len())
        );
        self.collect(&sql, ids.iter().map(|id| id.0), choice_from_row)
    }

    fn choices_for_questions(&self, questions: &[QuestionId]) -> Result<Vec<Choice>, StoreError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, question_id, label, point_id FROM choices
             WHERE question_id IN ({}) AND deleted_at IS NULL ORDER BY id",
            placeholders(questions.len())
        );
        self.collect(&sql, questions.iter().map(|id| id.0), choice_from_row)
    }

    fn points(&self, ids: &[PointId]) -> Result<Vec<Point>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, score FROM points WHERE id IN ({}) AND deleted_at IS NULL ORDER BY id",
            placeholders(ids.len())
        );
        self.collect(&sql, ids.iter().map(|id| id.0), point_from_row)
    }

    fn all_points(&self) -> Result<Vec<Point>, StoreError> {
        self.collect(
            "SELECT id, score FROM points WHERE deleted_at IS NULL ORDER BY id",
            [],
            point_from_row,
        )
    }

    fn answers(
        &self,
        company: CompanyId,
        questions: &[QuestionId],
    ) -> Result<Vec<CompanyAnswer>, StoreError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM company_answers
             WHERE company_id = ? AND question_id IN ({}) AND deleted_at IS NULL ORDER BY id",
            placeholders(questions.len())
        );
        let ids = std::iter::once(company.0).chain(questions.iter().map(|id| id.0));
        self.collect(&sql, ids, answer_from_row)
    }

    fn company_answers(&self, company: CompanyId) -> Result<Vec<CompanyAnswer>, StoreError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM company_answers
             WHERE company_id = ? AND deleted_at IS NULL ORDER BY id"
        );
        self.collect(&sql, [company.0], answer_from_row)
    }

    fn save_answer(&mut self, write: &AnswerWrite) -> Result<Upserted<AnswerId>, StoreError> {
        let now = Self::now();
        let choice = write.choice_id.map(|choice| choice.0);

        if let Some(existing) = self.answer_for(write.company_id, write.question_id)? {
            if existing.is_submitted() {
                return Err(locked(&existing));
            }
            self.conn
                .execute(
                    "UPDATE company_answers
                     SET choice_id = ?1, performance_notes = ?2, status = 'draft', updated_at = ?3
                     WHERE id = ?4",
                    params![choice, write.performance_notes, now, existing.id.0],
                )
                .map_err(|err| frozen_or_store(err, &existing))?;
            return Ok(Upserted::Updated(existing.id));
        }

        self.conn.execute(
            "INSERT INTO company_answers
                (company_id, question_id, choice_id, performance_notes, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'draft', ?5, ?5)",
            params![
                write.company_id.0,
                write.question_id.0,
                choice,
                write.performance_notes,
                now
            ],
        )?;
        Ok(Upserted::Created(AnswerId(self.conn.last_insert_rowid())))
    }

    fn mark_submitted(
        &mut self,
        company: CompanyId,
        question: QuestionId,
    ) -> Result<Upserted<AnswerId>, StoreError> {
        let now = Self::now();
        if let Some(existing) = self.answer_for(company, question)? {
            self.conn.execute(
                "UPDATE company_answers SET status = 'submitted', updated_at = ?1 WHERE id = ?2",
                params![now, existing.id.0],
            )?;
            return Ok(Upserted::Updated(existing.id));
        }

        self.conn.execute(
            "INSERT INTO company_answers
                (company_id, question_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'submitted', ?3, ?3)",
            params![company.0, question.0, now],
        )?;
        Ok(Upserted::Created(AnswerId(self.conn.last_insert_rowid())))
    }

    fn insert_company_submission(
        &mut self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<CompanySubmission, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO company_submissions (company_id, pillar_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![company.0, target_pillar(target), now],
        )?;
        Ok(CompanySubmission {
            id: SubmissionId(self.conn.last_insert_rowid()),
            company_id: company,
            target,
            submitted_at: now,
        })
    }

    fn latest_company_submission(
        &self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<Option<CompanySubmission>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, company_id, pillar_id, created_at FROM company_submissions
                 WHERE company_id = ?1 AND pillar_id IS ?2 AND deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![company.0, target_pillar(target)],
                company_submission_from_row,
            )
            .optional()?)
    }

    fn assessment_submissions(&self) -> Result<Vec<CompanySubmission>, StoreError> {
        self.collect(
            "SELECT id, company_id, pillar_id, created_at FROM company_submissions
             WHERE pillar_id IS NULL AND deleted_at IS NULL
             ORDER BY company_id ASC, created_at DESC, id DESC",
            [],
            company_submission_from_row,
        )
    }

    fn auditor_scores(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Vec<AuditorScore>, StoreError> {
        self.collect(
            "SELECT s.id, s.auditor_id, s.company_id, s.question_id, s.answer_id, s.choice_id,
                    s.updated_at
             FROM auditor_scores s
             JOIN company_answers a ON a.id = s.answer_id AND a.deleted_at IS NULL
             WHERE s.auditor_id = ? AND a.company_id = ? AND s.deleted_at IS NULL
             ORDER BY s.id",
            [auditor.0, company.0],
            auditor_score_from_row,
        )
    }

    fn upsert_auditor_score(
        &mut self,
        auditor: AuditorId,
        answer: &CompanyAnswer,
        choice: ChoiceId,
    ) -> Result<Upserted<AuditorScoreId>, StoreError> {
        let now = Self::now();
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM auditor_scores
                 WHERE auditor_id = ?1 AND answer_id = ?2 AND deleted_at IS NULL",
                params![auditor.0, answer.id.0],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            self.conn.execute(
                "UPDATE auditor_scores SET choice_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![choice.0, now, id],
            )?;
            return Ok(Upserted::Updated(AuditorScoreId(id)));
        }

        self.conn.execute(
            "INSERT INTO auditor_scores
                (auditor_id, company_id, question_id, answer_id, choice_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                auditor.0,
                answer.company_id.0,
                answer.question_id.0,
                answer.id.0,
                choice.0,
                now
            ],
        )?;
        Ok(Upserted::Created(AuditorScoreId(self.conn.last_insert_rowid())))
    }

    fn insert_auditor_submission(
        &mut self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<AuditorSubmission, StoreError> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO auditor_submissions (auditor_id, company_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![auditor.0, company.0, now],
        )?;
        Ok(AuditorSubmission {
            id: SubmissionId(self.conn.last_insert_rowid()),
            auditor_id: auditor,
            company_id: company,
            submitted_at: now,
        })
    }

    fn latest_auditor_submission(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Option<AuditorSubmission>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, auditor_id, company_id, created_at FROM auditor_submissions
                 WHERE auditor_id = ?1 AND company_id = ?2 AND deleted_at IS NULL
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![auditor.0, company.0],
                auditor_submission_from_row,
            )
            .optional()?)
    }

    fn upsert_pillar_result(
        &mut self,
        company: CompanyId,
        pillar: PillarId,
        score: f64,
    ) -> Result<(), StoreError> {
        let now = Self::now();
        let updated = self.conn.execute(
            "UPDATE pillar_results SET score = ?1, updated_at = ?2
             WHERE company_id = ?3 AND pillar_id = ?4 AND deleted_at IS NULL",
            params![score, now, company.0, pillar.0],
        )?;
        if updated == 0 {
            self.conn.execute(
                "INSERT INTO pillar_results (company_id, pillar_id, score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![company.0, pillar.0, score, now],
            )?;
        }
        Ok(())
    }

    fn pillar_results(&self, company: CompanyId) -> Result<Vec<PillarResult>, StoreError> {
        self.collect(
            "SELECT company_id, pillar_id, score FROM pillar_results
             WHERE company_id = ? AND deleted_at IS NULL ORDER BY id",
            [company.0],
            |row| {
                Ok(PillarResult {
                    company_id: CompanyId(row.get(0)?),
                    pillar_id: PillarId(row.get(1)?),
                    score: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                })
            },
        )
    }

    fn soft_delete(&mut self, target: RecordRef) -> Result<bool, StoreError> {
        let (table, id) = match target {
            RecordRef::Company(id) => ("companies", id.0),
            RecordRef::Auditor(id) => ("auditors", id.0),
            RecordRef::Pillar(id) => ("pillars", id.0),
            RecordRef::Question(id) => ("questions", id.0),
            RecordRef::Choice(id) => ("choices", id.0),
            RecordRef::Point(id) => ("points", id.0),
            RecordRef::Answer(id) => ("company_answers", id.0),
            RecordRef::AuditorScore(id) => ("auditor_scores", id.0),
            RecordRef::CompanySubmission(id) => ("company_submissions", id.0),
            RecordRef::AuditorSubmission(id) => ("auditor_submissions", id.0),
        };
        let sql = format!(
            "UPDATE {table} SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL"
        );
        let changed = self.conn.execute(&sql, params![Self::now(), id])?;
        Ok(changed > 0)
    }
}
