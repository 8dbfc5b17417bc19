use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{AssessmentStore, Ledger, StoreError};
use crate::workflows::assessment::domain::{
    AnswerId, AnswerStatus, AnswerWrite, Auditor, AuditorId, AuditorScore, AuditorScoreId,
    AuditorSubmission, Choice, ChoiceId, Company, CompanyAnswer, CompanyId, CompanySubmission,
    Lifecycle, Pillar, PillarId, PillarResult, Point, PointId, Question, QuestionId, RecordRef,
    SubjectId, SubmissionId, SubmissionTarget, Upserted,
};

/// Process-local store used by tests, the demo, and servers started without a database path.
///
/// Reads go straight to the committed tables. The first write of a transaction copies them,
/// and the copy replaces the committed tables only when the closure returns `Ok`, so a
/// failed batch leaves nothing behind. Uniqueness rules mirror the SQLite indexes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssessmentStore for MemoryStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))?;

        let (output, staged) = {
            let mut ledger = MemoryLedger {
                committed: &*guard,
                staged: None,
            };
            let output = work(&mut ledger)?;
            (output, ledger.staged)
        };
        if let Some(staged) = staged {
            *guard = staged;
        }
        Ok(output)
    }
}

#[derive(Debug, Clone)]
struct Stored<T> {
    record: T,
    lifecycle: Lifecycle,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<T> Stored<T> {
    fn new(record: T) -> Self {
        let now = Utc::now();
        Self {
            record,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn active<T>(rows: &[Stored<T>]) -> impl Iterator<Item = &Stored<T>> {
    rows.iter().filter(|row| row.lifecycle.is_active())
}

fn active_mut<T>(rows: &mut [Stored<T>]) -> impl Iterator<Item = &mut Stored<T>> {
    rows.iter_mut().filter(|row| row.lifecycle.is_active())
}

fn delete_where<T>(rows: &mut [Stored<T>], matches: impl Fn(&T) -> bool) -> bool {
    match active_mut(rows).find(|row| matches(&row.record)) {
        Some(row) => {
            row.lifecycle = Lifecycle::Deleted { at: Utc::now() };
            row.touch();
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequence: i64,
    companies: Vec<Stored<Company>>,
    auditors: Vec<Stored<Auditor>>,
    pillars: Vec<Stored<Pillar>>,
    questions: Vec<Stored<Question>>,
    points: Vec<Stored<Point>>,
    choices: Vec<Stored<Choice>>,
    answers: Vec<Stored<CompanyAnswer>>,
    auditor_scores: Vec<Stored<AuditorScore>>,
    company_submissions: Vec<Stored<CompanySubmission>>,
    auditor_submissions: Vec<Stored<AuditorSubmission>>,
    pillar_results: Vec<Stored<PillarResult>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

struct MemoryLedger<'a> {
    committed: &'a Tables,
    staged: Option<Tables>,
}

impl MemoryLedger<'_> {
    fn read(&self) -> &Tables {
        self.staged.as_ref().unwrap_or(self.committed)
    }

    fn write(&mut self) -> &mut Tables {
        let committed = self.committed;
        self.staged.get_or_insert_with(|| committed.clone())
    }
}

impl Ledger for MemoryLedger<'_> {
    fn insert_company(
        &mut self,
        name: &str,
        subject: Option<&SubjectId>,
    ) -> Result<CompanyId, StoreError> {
        let tables = self.write();
        let id = CompanyId(tables.next_id());
        tables.companies.push(Stored::new(Company {
            id,
            name: name.to_string(),
            subject: subject.cloned(),
        }));
        Ok(id)
    }

    fn insert_auditor(&mut self, subject: &SubjectId) -> Result<AuditorId, StoreError> {
        let tables = self.write();
        let id = AuditorId(tables.next_id());
        tables.auditors.push(Stored::new(Auditor {
            id,
            subject: subject.clone(),
        }));
        Ok(id)
    }

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(active(&self.read().companies)
            .find(|row| row.record.id == id)
            .map(|row| row.record.clone()))
    }

    fn company_by_subject(&self, subject: &SubjectId) -> Result<Option<Company>, StoreError> {
        Ok(active(&self.read().companies)
            .find(|row| row.record.subject.as_ref() == Some(subject))
            .map(|row| row.record.clone()))
    }

    fn auditor(&self, id: AuditorId) -> Result<Option<Auditor>, StoreError> {
        Ok(active(&self.read().auditors)
            .find(|row| row.record.id == id)
            .map(|row| row.record.clone()))
    }

    fn auditor_by_subject(&self, subject: &SubjectId) -> Result<Option<Auditor>, StoreError> {
        Ok(active(&self.read().auditors)
            .find(|row| &row.record.subject == subject)
            .map(|row| row.record.clone()))
    }

    fn upsert_pillar(
        &mut self,
        key: &str,
        name: &str,
        weight: Option<f64>,
    ) -> Result<Upserted<PillarId>, StoreError> {
        let tables = self.write();
        if let Some(row) = active_mut(&mut tables.pillars).find(|row| row.record.key == key) {
            row.record.name = name.to_string();
            row.record.weight = weight;
            row.touch();
            return Ok(Upserted::Updated(row.record.id));
        }

        let id = PillarId(tables.next_id());
        tables.pillars.push(Stored::new(Pillar {
            id,
            key: key.to_string(),
            name: name.to_string(),
            weight,
        }));
        Ok(Upserted::Created(id))
    }

    fn insert_question(
        &mut self,
        pillar: PillarId,
        title: &str,
        description: Option<&str>,
    ) -> Result<QuestionId, StoreError> {
        let tables = self.write();
        let id = QuestionId(tables.next_id());
        tables.questions.push(Stored::new(Question {
            id,
            pillar_id: pillar,
            title: title.to_string(),
            description: description.map(str::to_string),
        }));
        Ok(id)
    }

    fn insert_point(&mut self, score: f64) -> Result<PointId, StoreError> {
        let tables = self.write();
        let id = PointId(tables.next_id());
        tables.points.push(Stored::new(Point { id, score }));
        Ok(id)
    }

    fn insert_choice(
        &mut self,
        question: QuestionId,
        label: &str,
        point: Option<PointId>,
    ) -> Result<ChoiceId, StoreError> {
        let tables = self.write();
        let id = ChoiceId(tables.next_id());
        tables.choices.push(Stored::new(Choice {
            id,
            question_id: question,
            label: label.to_string(),
            point_id: point,
        }));
        Ok(id)
    }

    fn pillars(&self) -> Result<Vec<Pillar>, StoreError> {
        Ok(active(&self.read().pillars)
            .map(|row| row.record.clone())
            .collect())
    }

    fn pillar_by_key(&self, key: &str) -> Result<Option<Pillar>, StoreError> {
        Ok(active(&self.read().pillars)
            .find(|row| row.record.key == key)
            .map(|row| row.record.clone()))
    }

    fn questions_in_pillar(&self, pillar: PillarId) -> Result<Vec<Question>, StoreError> {
        Ok(active(&self.read().questions)
            .filter(|row| row.record.pillar_id == pillar)
            .map(|row| row.record.clone())
            .collect())
    }

    fn active_question_count(&self) -> Result<usize, StoreError> {
        Ok(active(&self.read().questions).count())
    }

    fn choices(&self, ids: &[ChoiceId]) -> Result<Vec<Choice>, StoreError> {
        Ok(active(&self.read().choices)
            .filter(|row| ids.contains(&row.record.id))
            .map(|row| row.record.clone())
            .collect())
    }

    fn choices_for_questions(&self, questions: &[QuestionId]) -> Result<Vec<Choice>, StoreError> {
        Ok(active(&self.read().choices)
            .filter(|row| questions.contains(&row.record.question_id))
            .map(|row| row.record.clone())
            .collect())
    }

    fn points(&self, ids: &[PointId]) -> Result<Vec<Point>, StoreError> {
        Ok(active(&self.read().points)
            .filter(|row| ids.contains(&row.record.id))
            .map(|row| row.record)
            .collect())
    }

    fn all_points(&self) -> Result<Vec<Point>, StoreError> {
        Ok(active(&self.read().points).map(|row| row.record).collect())
    }

    fn answers(
        &self,
        company: CompanyId,
        questions: &[QuestionId],
    ) -> Result<Vec<CompanyAnswer>, StoreError> {
        Ok(active(&self.read().answers)
            .filter(|row| {
                row.record.company_id == company && questions.contains(&row.record.question_id)
            })
            .map(|row| row.record.clone())
            .collect())
    }

    fn company_answers(&self, company: CompanyId) -> Result<Vec<CompanyAnswer>, StoreError> {
        Ok(active(&self.read().answers)
            .filter(|row| row.record.company_id == company)
            .map(|row| row.record.clone())
            .collect())
    }

    fn save_answer(&mut self, write: &AnswerWrite) -> Result<Upserted<AnswerId>, StoreError> {
        let tables = self.write();
        if let Some(row) = active_mut(&mut tables.answers).find(|row| {
            row.record.company_id == write.company_id && row.record.question_id == write.question_id
        }) {
            if row.record.is_submitted() {
                return Err(StoreError::Locked {
                    answer: row.record.id,
                    question: row.record.question_id,
                });
            }
            row.record.choice_id = write.choice_id;
            row.record.performance_notes = write.performance_notes.clone();
            row.touch();
            row.record.updated_at = row.updated_at;
            return Ok(Upserted::Updated(row.record.id));
        }

        let id = AnswerId(tables.next_id());
        let mut stored = Stored::new(CompanyAnswer {
            id,
            company_id: write.company_id,
            question_id: write.question_id,
            choice_id: write.choice_id,
            performance_notes: write.performance_notes.clone(),
            status: AnswerStatus::Draft,
            updated_at: Utc::now(),
        });
        stored.record.updated_at = stored.updated_at;
        tables.answers.push(stored);
        Ok(Upserted::Created(id))
    }

    fn mark_submitted(
        &mut self,
        company: CompanyId,
        question: QuestionId,
    ) -> Result<Upserted<AnswerId>, StoreError> {
        let tables = self.write();
        if let Some(row) = active_mut(&mut tables.answers)
            .find(|row| row.record.company_id == company && row.record.question_id == question)
        {
            row.record.status = AnswerStatus::Submitted;
            row.touch();
            row.record.updated_at = row.updated_at;
            return Ok(Upserted::Updated(row.record.id));
        }

        let id = AnswerId(tables.next_id());
        let mut stored = Stored::new(CompanyAnswer {
            id,
            company_id: company,
            question_id: question,
            choice_id: None,
            performance_notes: None,
            status: AnswerStatus::Submitted,
            updated_at: Utc::now(),
        });
        stored.record.updated_at = stored.updated_at;
        tables.answers.push(stored);
        Ok(Upserted::Created(id))
    }

    fn insert_company_submission(
        &mut self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<CompanySubmission, StoreError> {
        let tables = self.write();
        let stored = Stored::new(CompanySubmission {
            id: SubmissionId(tables.next_id()),
            company_id: company,
            target,
            submitted_at: Utc::now(),
        });
        let record = stored.record;
        tables.company_submissions.push(stored);
        Ok(record)
    }

    fn latest_company_submission(
        &self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<Option<CompanySubmission>, StoreError> {
        Ok(active(&self.read().company_submissions)
            .filter(|row| row.record.company_id == company && row.record.target == target)
            .max_by_key(|row| (row.created_at, row.record.id))
            .map(|row| row.record))
    }

    fn assessment_submissions(&self) -> Result<Vec<CompanySubmission>, StoreError> {
        let mut rows: Vec<CompanySubmission> = active(&self.read().company_submissions)
            .filter(|row| row.record.target == SubmissionTarget::Assessment)
            .map(|row| row.record)
            .collect();
        rows.sort_by(|left, right| {
            left.company_id
                .cmp(&right.company_id)
                .then(right.submitted_at.cmp(&left.submitted_at))
                .then(right.id.cmp(&left.id))
        });
        Ok(rows)
    }

    fn auditor_scores(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Vec<AuditorScore>, StoreError> {
        let live_answers: Vec<AnswerId> = active(&self.read().answers)
            .filter(|row| row.record.company_id == company)
            .map(|row| row.record.id)
            .collect();

        Ok(active(&self.read().auditor_scores)
            .filter(|row| {
                row.record.auditor_id == auditor && live_answers.contains(&row.record.answer_id)
            })
            .map(|row| row.record.clone())
            .collect())
    }

    fn upsert_auditor_score(
        &mut self,
        auditor: AuditorId,
        answer: &CompanyAnswer,
        choice: ChoiceId,
    ) -> Result<Upserted<AuditorScoreId>, StoreError> {
        let tables = self.write();
        if let Some(row) = active_mut(&mut tables.auditor_scores)
            .find(|row| row.record.auditor_id == auditor && row.record.answer_id == answer.id)
        {
            row.record.choice_id = choice;
            row.touch();
            row.record.updated_at = row.updated_at;
            return Ok(Upserted::Updated(row.record.id));
        }

        let id = AuditorScoreId(tables.next_id());
        let mut stored = Stored::new(AuditorScore {
            id,
            auditor_id: auditor,
            company_id: answer.company_id,
            question_id: answer.question_id,
            answer_id: answer.id,
            choice_id: choice,
            updated_at: Utc::now(),
        });
        stored.record.updated_at = stored.updated_at;
        tables.auditor_scores.push(stored);
        Ok(Upserted::Created(id))
    }

    fn insert_auditor_submission(
        &mut self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<AuditorSubmission, StoreError> {
        let tables = self.write();
        if active(&tables.auditor_submissions)
            .any(|row| row.record.auditor_id == auditor && row.record.company_id == company)
        {
            return Err(StoreError::Conflict(format!(
                "auditor_submissions(auditor_id={auditor}, company_id={company})"
            )));
        }

        let stored = Stored::new(AuditorSubmission {
            id: SubmissionId(tables.next_id()),
            auditor_id: auditor,
            company_id: company,
            submitted_at: Utc::now(),
        });
        let record = stored.record;
        tables.auditor_submissions.push(stored);
        Ok(record)
    }

    fn latest_auditor_submission(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Option<AuditorSubmission>, StoreError> {
        Ok(active(&self.read().auditor_submissions)
            .filter(|row| row.record.auditor_id == auditor && row.record.company_id == company)
            .max_by_key(|row| (row.created_at, row.record.id))
            .map(|row| row.record))
    }

    fn upsert_pillar_result(
        &mut self,
        company: CompanyId,
        pillar: PillarId,
        score: f64,
    ) -> Result<(), StoreError> {
        let tables = self.write();
        if let Some(row) = active_mut(&mut tables.pillar_results)
            .find(|row| row.record.company_id == company && row.record.pillar_id == pillar)
        {
            row.record.score = score;
            row.touch();
            return Ok(());
        }

        tables.pillar_results.push(Stored::new(PillarResult {
            company_id: company,
            pillar_id: pillar,
            score,
        }));
        Ok(())
    }

    fn pillar_results(&self, company: CompanyId) -> Result<Vec<PillarResult>, StoreError> {
        Ok(active(&self.read().pillar_results)
            .filter(|row| row.record.company_id == company)
            .map(|row| row.record)
            .collect())
    }

    fn soft_delete(&mut self, target: RecordRef) -> Result<bool, StoreError> {
        let tables = self.write();
        let deleted = match target {
            RecordRef::Company(id) => delete_where(&mut tables.companies, |row| row.id == id),
            RecordRef::Auditor(id) => delete_where(&mut tables.auditors, |row| row.id == id),
            RecordRef::Pillar(id) => delete_where(&mut tables.pillars, |row| row.id == id),
            RecordRef::Question(id) => delete_where(&mut tables.questions, |row| row.id == id),
            RecordRef::Choice(id) => delete_where(&mut tables.choices, |row| row.id == id),
            RecordRef::Point(id) => delete_where(&mut tables.points, |row| row.id == id),
            RecordRef::Answer(id) => delete_where(&mut tables.answers, |row| row.id == id),
            RecordRef::AuditorScore(id) => {
                delete_where(&mut tables.auditor_scores, |row| row.id == id)
            }
            RecordRef::CompanySubmission(id) => {
                delete_where(&mut tables.company_submissions, |row| row.id == id)
            }
            RecordRef::AuditorSubmission(id) => {
                delete_where(&mut tables.auditor_submissions, |row| row.id == id)
            }
        };
        Ok(deleted)
    }
}
