use std::sync::{Arc, Barrier};
use std::thread;

use super::common::*;
use crate::workflows::assessment::domain::{
    AnswerStatus, AuditorId, ChoiceId, CompanyId, EvidenceRecord,
};
use crate::workflows::assessment::{
    AssessmentError, AuditorScoreItem, ChoicePair, SubmissionScope, ValidationError,
};
use crate::workflows::assessment::store::AssessmentStore;

#[test]
fn empty_batches_are_rejected() {
    let (service, seeded, _) = build_service();
    assert!(matches!(
        service.submit_auditor_scores(seeded.auditor, seeded.company, &[]),
        Err(AssessmentError::EmptyBatch { .. })
    ));
}

#[test]
fn unknown_auditor_or_company_is_not_found() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let items = auditor_picks(&seeded.health, HALF);

    assert!(matches!(
        service.submit_auditor_scores(AuditorId(77), seeded.company, &items),
        Err(AssessmentError::NotFound {
            entity: "auditor",
            ..
        })
    ));
    assert!(matches!(
        service.submit_auditor_scores(seeded.auditor, CompanyId(404), &items),
        Err(AssessmentError::NotFound {
            entity: "company",
            ..
        })
    ));
}

#[test]
fn scores_need_a_company_answer_for_every_question() {
    let (service, seeded, _) = build_service();
    service
        .save_draft(seeded.company, HEALTH, &picks(&seeded.health, FULL))
        .expect("draft");

    let mut items = auditor_picks(&seeded.health, HALF);
    items.extend(auditor_picks(&seeded.safety, HALF));

    match service.submit_auditor_scores(seeded.auditor, seeded.company, &items) {
        Err(AssessmentError::Validation(ValidationError::QuestionsNotInPlay { question_ids })) => {
            assert_eq!(question_ids, vec![seeded.safety[0].id, seeded.safety[1].id]);
        }
        other => panic!("expected questions not in play, got {other:?}"),
    }

    let recorded = service
        .auditor_scores(seeded.auditor, seeded.company)
        .expect("scores list");
    assert!(recorded.is_empty(), "rejected batch leaves nothing behind");
}

#[test]
fn unknown_and_mismatched_choices_abort_the_batch() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);

    let unknown = vec![AuditorScoreItem {
        question_id: seeded.health[0].id,
        choice_id: ChoiceId(8_888),
    }];
    match service.submit_auditor_scores(seeded.auditor, seeded.company, &unknown) {
        Err(AssessmentError::Validation(ValidationError::UnknownChoices { choice_ids })) => {
            assert_eq!(choice_ids.len(), 1);
        }
        other => panic!("expected unknown choices, got {other:?}"),
    }

    let mismatched = vec![
        AuditorScoreItem {
            question_id: seeded.health[0].id,
            choice_id: seeded.health[0].choices[HALF],
        },
        AuditorScoreItem {
            question_id: seeded.health[1].id,
            choice_id: seeded.safety[0].choices[HALF],
        },
    ];
    match service.submit_auditor_scores(seeded.auditor, seeded.company, &mismatched) {
        Err(AssessmentError::Validation(ValidationError::ChoiceMismatch { pairs })) => {
            assert_eq!(
                pairs,
                vec![ChoicePair {
                    question_id: seeded.health[1].id,
                    choice_id: seeded.safety[0].choices[HALF],
                }]
            );
        }
        other => panic!("expected choice mismatch, got {other:?}"),
    }

    let summary = service
        .submit_auditor_scores(
            seeded.auditor,
            seeded.company,
            &auditor_picks(&seeded.health, HALF),
        )
        .expect("a clean batch still goes through");
    assert_eq!(summary.processed, 2);
}

#[test]
fn auditor_review_is_one_shot_per_company() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let items = auditor_picks(&seeded.health, HALF);

    let summary = service
        .submit_auditor_scores(seeded.auditor, seeded.company, &items)
        .expect("first review");
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.updated, 0);

    match service.submit_auditor_scores(seeded.auditor, seeded.company, &items) {
        Err(AssessmentError::AlreadySubmitted(SubmissionScope::AuditorReview {
            auditor_id,
            company_id,
        })) => {
            assert_eq!(auditor_id, seeded.auditor);
            assert_eq!(company_id, seeded.company);
        }
        other => panic!("expected review already submitted, got {other:?}"),
    }

    service
        .submit_auditor_scores(seeded.second_auditor, seeded.company, &items)
        .expect("other auditors review independently");
}

#[test]
fn auditor_scores_never_touch_company_answers() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let before = service.draft(seeded.company, HEALTH).expect("draft");

    service
        .submit_auditor_scores(
            seeded.auditor,
            seeded.company,
            &auditor_picks(&seeded.health, ZERO),
        )
        .expect("review");

    let after = service.draft(seeded.company, HEALTH).expect("draft");
    assert_eq!(before, after);
    assert!(after
        .iter()
        .all(|answer| answer.choice_id.is_some() && answer.status == AnswerStatus::Submitted));
}

#[test]
fn recorded_scores_resolve_point_values() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let items = vec![
        AuditorScoreItem {
            question_id: seeded.health[0].id,
            choice_id: seeded.health[0].choices[HALF],
        },
        AuditorScoreItem {
            question_id: seeded.health[1].id,
            choice_id: seeded.health[1].unscored,
        },
    ];
    service
        .submit_auditor_scores(seeded.auditor, seeded.company, &items)
        .expect("review");

    let scores = service
        .auditor_scores(seeded.auditor, seeded.company)
        .expect("scores");
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].question_id, seeded.health[0].id);
    assert_eq!(scores[0].score, Some(0.5));
    assert_eq!(scores[1].choice_id, seeded.health[1].unscored);
    assert_eq!(scores[1].score, None);
}

#[test]
fn concurrent_reviews_of_one_company_admit_exactly_one() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let items = Arc::new(auditor_picks(&seeded.health, HALF));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let items = Arc::clone(&items);
            let barrier = Arc::clone(&barrier);
            let (auditor, company) = (seeded.auditor, seeded.company);
            thread::spawn(move || {
                barrier.wait();
                service.submit_auditor_scores(auditor, company, &items)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(successes, 1);
    let loser = outcomes
        .into_iter()
        .find_map(Result::err)
        .expect("one submission loses");
    assert!(matches!(
        loser,
        AssessmentError::AlreadySubmitted(_) | AssessmentError::Conflict(_)
    ));
}

#[test]
fn submissions_list_latest_assessment_per_company() {
    let (service, seeded, _) = build_service();
    assert!(service.list_submissions().expect("list").is_empty());

    complete_assessment(&service, &seeded, FULL);
    service.submit_summary(seeded.company).expect("first");
    let latest = service.submit_summary(seeded.company).expect("second");
    service.compute_overall(seeded.company).expect("scores cached");

    let listed = service.list_submissions().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].company_id, seeded.company);
    assert_eq!(listed[0].company_name, "Acme Foods");
    assert_eq!(listed[0].submitted_at, latest.submitted_at);
    assert_eq!(listed[0].status, AnswerStatus::Submitted);
    assert_eq!(listed[0].score, 800.0);
}

#[test]
fn submission_detail_combines_answers_evidence_and_review() {
    let (service, seeded, evidence) = build_service();
    complete_assessment(&service, &seeded, HALF);

    let answer_id = service
        .store()
        .transaction(|ledger| ledger.answers(seeded.company, &[seeded.health[0].id]))
        .expect("answers load")[0]
        .id;
    evidence.attach(
        answer_id,
        EvidenceRecord {
            url: None,
            file_path: Some("/srv/uploads/evidence/9c1e_policy.pdf".to_string()),
        },
    );
    evidence.attach(
        answer_id,
        EvidenceRecord {
            url: Some("https://files.example.org/screening.pdf".to_string()),
            file_path: None,
        },
    );

    service
        .submit_auditor_scores(
            seeded.auditor,
            seeded.company,
            &auditor_picks(&seeded.health, FULL),
        )
        .expect("review");
    service.submit_summary(seeded.company).expect("summary");

    let detail = service
        .submission_detail(Some(seeded.auditor), seeded.company)
        .expect("detail");
    assert_eq!(detail.company_name, "Acme Foods");
    assert!(detail.submitted_at.is_some());
    assert!(detail.auditor_submitted);
    assert_eq!(detail.pillars.len(), 3, "empty pillars are skipped");

    let question = &detail.pillars[0].questions[0];
    assert_eq!(question.answer_id, Some(answer_id));
    assert_eq!(question.selected_choice_id, Some(seeded.health[0].choices[HALF]));
    assert_eq!(question.selected_label.as_deref(), Some("Partial"));
    assert_eq!(question.selected_score, Some(0.5));
    assert_eq!(question.options.len(), 6);
    assert_eq!(
        question.options.iter().filter(|option| option.selected).count(),
        1
    );
    assert_eq!(
        question.evidence,
        vec![
            "/uploads/evidence/9c1e_policy.pdf".to_string(),
            "https://files.example.org/screening.pdf".to_string(),
        ]
    );
    assert_eq!(question.auditor_choice_id, Some(seeded.health[0].choices[FULL]));
    assert_eq!(question.auditor_score, Some(1.0));

    let anonymous = service
        .submission_detail(None, seeded.company)
        .expect("detail without reviewer");
    assert!(!anonymous.auditor_submitted);
    assert_eq!(anonymous.pillars[0].questions[0].auditor_choice_id, None);
}

#[test]
fn auditor_results_score_the_auditor_selections() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, ZERO);

    let mut items = auditor_picks(&seeded.health, FULL);
    items.extend(auditor_picks(&seeded.community, FULL));
    service
        .submit_auditor_scores(seeded.auditor, seeded.company, &items)
        .expect("review");

    let auditor_view = service
        .auditor_results(seeded.auditor, seeded.company)
        .expect("auditor results");
    assert_eq!(auditor_view.overall_score, 500.0);
    assert_eq!(auditor_view.max_score, 1000.0);
    assert_eq!(auditor_view.star_count, 3);

    let company_view = service.compute_overall(seeded.company).expect("company results");
    assert_eq!(company_view.overall_score, 0.0);
}

#[test]
fn other_companies_are_invisible_to_a_review() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);

    let items = auditor_picks(&seeded.health, HALF);
    assert!(matches!(
        service.submit_auditor_scores(seeded.auditor, seeded.other_company, &items),
        Err(AssessmentError::Validation(
            ValidationError::QuestionsNotInPlay { .. }
        ))
    ));
}
