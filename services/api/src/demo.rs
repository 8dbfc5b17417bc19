use crate::infra::print_import_summary;
use assessment_workflow::error::AppError;
use assessment_workflow::workflows::assessment::{
    AssessmentService, AssessmentStore, AuditorScoreItem, ChoiceId, DraftItem, MemoryStore,
    NoEvidence, OverallResult, SheetQuestion, StoreError, SubjectId,
};
use assessment_workflow::workflows::catalog_import::CatalogImporter;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_CATALOG: &str = include_str!("../data/sample_catalog.csv");
const DEMO_COMPANY: &str = "Acme Foods";
const COMPANY_SUBJECT: &str = "demo-company";
const AUDITOR_SUBJECT: &str = "demo-auditor";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Catalog CSV to load instead of the bundled four-pillar sample.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Point value the company picks for every question (closest choice wins).
    #[arg(long, default_value_t = 0.75)]
    pub(crate) company_point: f64,
    /// Point value the auditor picks for every question (closest choice wins).
    #[arg(long, default_value_t = 0.5)]
    pub(crate) auditor_point: f64,
    /// Stop after the company submission.
    #[arg(long)]
    pub(crate) skip_audit: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        catalog,
        company_point,
        auditor_point,
        skip_audit,
    } = args;

    let store = Arc::new(MemoryStore::new());
    println!("Assessment workflow demo");
    let imported = match &catalog {
        Some(path) => CatalogImporter::from_path(store.as_ref(), path)?,
        None => CatalogImporter::from_reader(store.as_ref(), Cursor::new(SAMPLE_CATALOG))?,
    };
    print_import_summary(&imported);

    let pillar_keys: Vec<String> = store
        .transaction(|ledger| -> Result<Vec<String>, StoreError> {
            ledger.insert_company(DEMO_COMPANY, Some(&SubjectId::new(COMPANY_SUBJECT)))?;
            ledger.insert_auditor(&SubjectId::new(AUDITOR_SUBJECT))?;
            Ok(ledger.pillars()?.into_iter().map(|pillar| pillar.key).collect())
        })?;

    let service = Arc::new(AssessmentService::new(store, Arc::new(NoEvidence)));
    let company = service.company_for_subject(&SubjectId::new(COMPANY_SUBJECT))?;

    println!("\nCompany self-assessment ({DEMO_COMPANY}, picking {company_point:.2} points)");
    let mut audit_items = Vec::new();
    for key in &pillar_keys {
        let sheet = service.pillar_sheet(key)?;
        let items: Vec<DraftItem> = sheet
            .questions
            .iter()
            .filter_map(|question| {
                closest_choice(question, company_point).map(|choice| DraftItem {
                    question_id: question.id,
                    choice_id: Some(choice),
                    performance_notes: Some(format!("Evidence pack for '{}'", question.title)),
                })
            })
            .collect();
        audit_items.extend(sheet.questions.iter().filter_map(|question| {
            closest_choice(question, auditor_point).map(|choice| AuditorScoreItem {
                question_id: question.id,
                choice_id: choice,
            })
        }));

        let saved = service.save_draft(company, key, &items)?;
        let submitted = service.submit(company, key)?;
        println!(
            "- {}: {} answers saved, {} frozen at {}",
            sheet.name,
            saved.saved,
            submitted.updated,
            local_time(submitted.submitted_at)
        );
    }

    let status = service.summary_status(company)?;
    if !status.completed {
        println!(
            "Assessment incomplete: {} of {} questions answered",
            status.answered, status.total
        );
        return Ok(());
    }
    service.submit_summary(company)?;
    render_results("Company results", &service.compute_overall(company)?);

    if skip_audit {
        return Ok(());
    }

    let auditor = service.auditor_for_subject(&SubjectId::new(AUDITOR_SUBJECT))?;
    println!("\nAuditor queue");
    for submission in service.list_submissions()? {
        println!(
            "- {} submitted {} (score {:.2})",
            submission.company_name,
            local_time(submission.submitted_at),
            submission.score
        );
    }

    let reviewed = service.submit_auditor_scores(auditor, company, &audit_items)?;
    println!(
        "Auditor review recorded: {} selections ({} new, picking {auditor_point:.2} points)",
        reviewed.processed, reviewed.created
    );
    render_results("Auditor results", &service.auditor_results(auditor, company)?);

    let detail = service.submission_detail(Some(auditor), company)?;
    let reviewed_questions = detail
        .pillars
        .iter()
        .flat_map(|pillar| &pillar.questions)
        .filter(|question| question.auditor_choice_id.is_some())
        .count();
    println!("Submission detail covers {reviewed_questions} reviewed questions");

    Ok(())
}

fn closest_choice(question: &SheetQuestion, target: f64) -> Option<ChoiceId> {
    question
        .choices
        .iter()
        .min_by(|left, right| {
            (left.score - target)
                .abs()
                .total_cmp(&(right.score - target).abs())
        })
        .map(|choice| choice.id)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_results(title: &str, result: &OverallResult) {
    println!("\n{title}");
    for pillar in &result.pillars {
        println!(
            "- {}: {:.2} / {:.2}",
            pillar.name, pillar.score, pillar.max_score
        );
    }
    println!(
        "Overall {:.2} / {:.2} -> {} of 5 stars",
        result.overall_score, result.max_score, result.star_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end() {
        let args = DemoArgs {
            catalog: None,
            company_point: 1.0,
            auditor_point: 0.25,
            skip_audit: false,
        };
        run_demo(args).expect("demo completes");
    }

    #[test]
    fn closest_choice_prefers_the_nearest_point() {
        let service: AssessmentService<MemoryStore, NoEvidence> = AssessmentService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NoEvidence),
        );
        CatalogImporter::from_reader(service.store().as_ref(), Cursor::new(SAMPLE_CATALOG))
            .expect("sample imports");
        let sheet = service.pillar_sheet("pillar-1").expect("sheet");
        let question = &sheet.questions[0];

        let picked = closest_choice(question, 0.6).expect("choice picked");
        let label = question
            .choices
            .iter()
            .find(|choice| choice.id == picked)
            .map(|choice| choice.label.as_str());
        assert_eq!(label, Some("Partial"));
    }
}
