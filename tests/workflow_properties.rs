use curricula::error::{ErrorKind, StoreError};
use curricula::identity::ConfiguredIdentity;
use curricula::mapping::editor::{MappingEditor, ValidationRules};
use curricula::mapping::matrix::{self, MatrixView};
use curricula::mapping::stats::compute_stats;
use curricula::mapping::{EdgeDraft, MappingContext, MappingStore, Strength};
use curricula::outcome::catalog::parse_catalog;
use curricula::outcome::{Level, LevelPair, OutcomeProvider};
use curricula::store::SqliteStore;
use curricula::termplan::workflow::{PlanState, SubmitOutcome, TermPlan};
use curricula::termplan::{
    ApprovalStatus, ReviewDecision, RowEdit, TermDetailPersistence, TermRow,
};

fn store_with_outcomes() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("sqlite");
    let catalog = parse_catalog(
        r#"context: EE201
outcomes:
  - { id: ee-co3, code: CO3, level: co }
  - { id: ee-co1, code: CO1, level: co }
  - { id: ee-co2, code: CO2, level: co }
  - { id: po12, code: PO12, level: po }
  - { id: po3, code: PO3, level: po }
  - { id: pso, code: PSO, level: po }
  - { id: po1, code: PO1, level: po }
"#,
    )
    .expect("catalog");
    store.import_catalog(&catalog).expect("import");
    store
}

fn context() -> MappingContext {
    MappingContext::new("EE201", LevelPair::CoPo)
}

fn draft(source: &str, target: &str, strength: Strength) -> EdgeDraft {
    EdgeDraft {
        context_id: "EE201".to_string(),
        source_id: source.to_string(),
        source_level: Level::Co,
        target_id: target.to_string(),
        target_level: Level::Po,
        strength,
        justification: "Lab reports assess this outcome".to_string(),
        contribution: String::new(),
    }
}

fn row(si_no: u32, credits: u32) -> TermRow {
    let mut row = TermRow::new(si_no);
    for edit in [
        RowEdit::TermName(format!("Term {si_no}")),
        RowEdit::DurationWeeks(15),
        RowEdit::Credits(credits),
        RowEdit::TheoryCourseCount(4),
        RowEdit::PracticalOtherCount(2),
        RowEdit::AcademicStartYear(2025),
        RowEdit::AcademicEndYear(2026),
    ] {
        row.apply(edit);
    }
    row
}

#[test]
fn matrix_has_one_cell_per_pair_in_numeric_order() {
    let store = store_with_outcomes();
    store.upsert(&draft("ee-co2", "po12", Strength::Moderate)).expect("edge");
    store.upsert(&draft("ee-co1", "po3", Strength::Weak)).expect("edge");

    let built = matrix::build(&store, &store, &context()).expect("matrix");
    let rows: Vec<&str> = built.rows.iter().map(|o| o.reference_code.as_str()).collect();
    let columns: Vec<&str> = built.columns.iter().map(|o| o.reference_code.as_str()).collect();
    assert_eq!(rows, vec!["CO1", "CO2", "CO3"]);
    assert_eq!(columns, vec!["PO1", "PO3", "PO12", "PSO"]);
    assert_eq!(built.cell_count(), rows.len() * columns.len());
    assert_eq!(built.mapped_count(), 2);
    assert_eq!(
        built.edge_for("ee-co2", "po12").map(|edge| edge.strength),
        Some(Strength::Moderate)
    );
}

#[test]
fn repeated_upserts_keep_a_single_edge() {
    let store = store_with_outcomes();
    let first = store.upsert(&draft("ee-co1", "po1", Strength::Weak)).expect("insert");
    let second = store.upsert(&draft("ee-co1", "po1", Strength::Strong)).expect("update");
    let third = store.upsert(&draft("ee-co1", "po1", Strength::Strong)).expect("again");

    assert_eq!(first.id, second.id);
    assert_eq!(second.id, third.id);
    assert_eq!(first.created_at, third.created_at);
    let edges = store.get_all(&context()).expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].strength, Strength::Strong);
    assert_eq!(compute_stats(&edges).strong_count, 1);
}

#[test]
fn skip_level_edges_are_rejected_by_the_store() {
    let store = store_with_outcomes();
    let mut skip = draft("ee-co1", "po1", Strength::Weak);
    skip.target_level = Level::Peo;
    let err = store.upsert(&skip).expect_err("skip level");
    assert!(matches!(err, StoreError::InvalidLevelPair { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn editor_commit_refreshes_the_open_matrix_view() {
    let store = store_with_outcomes();
    let mut view = MatrixView::new();
    let ticket = view.navigate(&context());
    let initial = matrix::build(&store, &store, &context()).expect("matrix");
    assert!(view.apply(&ticket, initial));

    let co3 = store.find("EE201", "CO3").expect("lookup").expect("co3");
    let pso = store.find("EE201", "pso").expect("lookup").expect("pso");
    let mut editor = MappingEditor::new(ValidationRules::default());
    let buffer = editor.open(&store, &context(), &co3, &pso).expect("open");
    buffer.strength = 2;
    buffer.justification = "Capstone rubric covers it".to_string();
    let committed = editor.commit(&store, &store).expect("commit");

    assert!(view.apply(&ticket, committed.matrix));
    let shown = view.matrix().expect("matrix shown");
    assert!(shown.edge_for("ee-co3", "pso").is_some());
}

#[test]
fn failed_bulk_save_keeps_previously_saved_rows() {
    let store = SqliteStore::open_in_memory().expect("sqlite");
    let good = vec![
        row(1, 18).to_detail("B2025").expect("complete"),
        row(2, 20).to_detail("B2025").expect("complete"),
    ];
    store.save_bulk("B2025", &good).expect("first save");

    let mut mixed = vec![row(1, 10).to_detail("B2025").expect("complete")];
    mixed.push(row(2, 11).to_detail("B2026").expect("complete"));
    let err = store.save_bulk("B2025", &mixed).expect_err("foreign row");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let plan = store.get_by_curriculum("B2025").expect("plan");
    let credits: Vec<u32> = plan.rows.iter().map(|detail| detail.credits).collect();
    assert_eq!(credits, vec![18, 20]);
}

#[test]
fn plan_lifecycle_against_sqlite() {
    let store = SqliteStore::open_in_memory().expect("sqlite");
    let identity = ConfiguredIdentity::new(Some("u-77".to_string()));
    let mut plan = TermPlan::new(false);
    plan.load(&store, "B2025").expect("load");
    plan.insert_row(row(1, 18)).expect("row 1");
    plan.insert_row(row(2, 20)).expect("row 2");
    assert_eq!(plan.totals().credits, 38);

    plan.save(&store).expect("save");
    store.set_program_owner("B2025", "u-owner").expect("owner");
    let outcome = plan.submit(&store, &identity).expect("submit");
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    let stored = store.get_by_curriculum("B2025").expect("stored");
    assert_eq!(stored.info.submitted_by.as_deref(), Some("u-77"));
    assert!(
        stored
            .rows
            .iter()
            .all(|detail| detail.approval_status == ApprovalStatus::Submitted)
    );

    let again = plan.submit(&store, &identity).expect("resubmit");
    assert_eq!(
        again,
        SubmitOutcome::AlreadySubmitted {
            status: ApprovalStatus::Submitted
        }
    );

    store
        .record_review("B2025", "u-owner", ReviewDecision::Approve)
        .expect("approve");
    assert_eq!(
        plan.refresh_status(&store).expect("refresh"),
        ApprovalStatus::Approved
    );
    assert_eq!(plan.state(), PlanState::Approved);
    assert!(plan.info().approved_at.is_some());
    assert_eq!(plan.rows().len(), 2);
}
