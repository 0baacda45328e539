//! Property-based tests for lanecheck.
//!
//! Uses proptest to check query, interceptor, and drag invariants over
//! generated boards.

#![allow(clippy::unwrap_used)]

use lanecheck::pipeline::{Candidate, InterviewStep, PositionFixture, API_BASE};
use lanecheck::prelude::*;
use proptest::prelude::*;

fn fixture(steps: usize, placements: &[usize]) -> BoardFixture {
    BoardFixture {
        positions: vec![PositionFixture {
            id: 1,
            title: "Generated".to_string(),
            steps: (0..steps)
                .map(|i| InterviewStep {
                    id: i as u32 + 1,
                    name: format!("Stage {i}"),
                })
                .collect(),
            candidates: placements
                .iter()
                .enumerate()
                .map(|(i, step)| Candidate {
                    id: i as u32 + 1,
                    application_id: i as u32 + 100,
                    full_name: format!("Candidate {i}"),
                    current_interview_step: *step as u32 + 1,
                })
                .collect(),
        }],
    }
}

fn board(fixture: BoardFixture) -> Session {
    let mut session = pipeline_session(
        fixture,
        DragProtocol::NativeDrag,
        SessionConfig::new().with_timeout(200).with_poll_interval(1),
    );
    session
        .goto_ready("/positions/1", Selector::test_id("stage-column"))
        .unwrap();
    session
}

fn cards_in(column: usize) -> Locator {
    Locator::new(Selector::test_id("stage-column"))
        .nth(column)
        .find(Selector::test_id("candidate-card"))
}

/// Boards with 1..5 stages and up to 8 candidates placed on them
fn generated_board() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..5).prop_flat_map(|steps| (Just(steps), prop::collection::vec(0..steps, 0..8)))
}

// === Query Property Tests ===

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Column counts always mirror the fixture placement.
    #[test]
    fn prop_column_counts_match_fixture((steps, placements) in generated_board()) {
        let session = board(fixture(steps, &placements));
        for column in 0..steps {
            let expected = placements.iter().filter(|p| **p == column).count();
            prop_assert_eq!(cards_in(column).count(session.document()).unwrap(), expected);
        }
    }

    /// `nth` succeeds exactly for indices below the match count.
    #[test]
    fn prop_nth_in_range_iff_below_count(
        (steps, placements) in generated_board(),
        index in 0usize..8
    ) {
        let session = board(fixture(steps, &placements));
        let query = session.find(Selector::test_id("stage-column"));
        match query.nth(index) {
            Ok(_) => prop_assert!(index < steps),
            Err(LanecheckError::OutOfRange { index: i, len, .. }) => {
                prop_assert_eq!(i, index);
                prop_assert_eq!(len, steps);
                prop_assert!(index >= steps);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// A selector that matches nothing yields zero, not an error.
    #[test]
    fn prop_unmatched_selector_counts_zero(class in "zz-[a-z]{3,8}") {
        let session = board(BoardFixture::default());
        prop_assert_eq!(session.find(format!(".{class}")).count().unwrap(), 0);
    }
}

// === Interceptor Property Tests ===

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every drag across columns records one call, and snapshots are stable.
    #[test]
    fn prop_each_drag_records_one_call(drags in 1usize..4) {
        let placements = vec![0; drags];
        let mut session = board(fixture(2, &placements));
        let update = session.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();

        for done in 0..drags {
            let card = cards_in(0).first().one(session.document()).unwrap();
            let column = Locator::new(Selector::test_id("stage-column"))
                .nth(1)
                .one(session.document())
                .unwrap();
            let report = session.simulate_drag(card, column, DragProtocol::NativeDrag).unwrap();
            prop_assert!(report.handled());
            session.expect_call_count(update, done + 1, 200).unwrap();
        }

        let first = session.all_calls(update).unwrap();
        let again = session.all_calls(update).unwrap();
        prop_assert_eq!(first.len(), drags);
        prop_assert_eq!(&first, &again);
        for call in &first {
            prop_assert_eq!(
                call.body_keys(),
                vec!["applicationId".to_string(), "currentInterviewStep".to_string()]
            );
        }
    }

    /// Rules never see requests issued before they were registered.
    #[test]
    fn prop_registration_is_not_retroactive(reloads in 0usize..3) {
        let mut session = board(BoardFixture::default());
        for _ in 0..reloads {
            session.reload_ready(Selector::test_id("stage-column")).unwrap();
        }
        let loads = session.intercept(HttpMethod::Get, "**", None).unwrap();
        prop_assert_eq!(session.rule_state(loads).unwrap(), RuleState::Registered);
        prop_assert!(session.all_calls(loads).unwrap().is_empty());
        prop_assert_eq!(session.calls_observed().len(), 2 * (reloads + 1));
    }
}

// === URL Pattern Property Tests ===

proptest! {
    /// Candidate update globs match any candidate id and nothing deeper.
    #[test]
    fn prop_candidate_glob(id in 1u32..100_000) {
        let pattern = UrlPattern::from("**/candidates/*");
        let url = format!("{API_BASE}/candidates/{id}");
        prop_assert!(pattern.matches(&url));
        prop_assert!(UrlPattern::from("/candidates/*").matches(&url));
        let deeper = format!("{url}/notes");
        prop_assert!(!UrlPattern::from("/candidates/*").matches(&deeper));
    }
}
