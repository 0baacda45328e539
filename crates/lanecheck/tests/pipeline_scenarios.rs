//! End-to-end scenarios against the reference hiring-pipeline board.

#![allow(clippy::unwrap_used)]

use lanecheck::prelude::*;
use lanecheck::pipeline::{Candidate, InterviewStep, PositionFixture};
use serde_json::json;

const TIMEOUT_MS: u64 = 500;

fn session() -> Session {
    session_with(BoardFixture::default(), DragProtocol::NativeDrag)
}

/// Route library logs to the test harness output; `RUST_LOG=debug` to see them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session_with(fixture: BoardFixture, protocol: DragProtocol) -> Session {
    init_tracing();
    pipeline_session(
        fixture,
        protocol,
        SessionConfig::new().with_timeout(TIMEOUT_MS).with_poll_interval(1),
    )
}

fn columns() -> Locator {
    Locator::new(Selector::test_id("stage-column"))
}

fn cards_in(column: usize) -> Locator {
    columns().nth(column).find(Selector::test_id("candidate-card"))
}

fn open_board(session: &mut Session) {
    session
        .goto_ready("/positions/1", Selector::test_id("stage-column"))
        .unwrap();
}

fn drag_first_card(session: &mut Session, from: usize, to: usize) -> DragReport {
    let card = cards_in(from).first().one(session.document()).unwrap();
    let column = columns().nth(to).one(session.document()).unwrap();
    session
        .simulate_drag(card, column, DragProtocol::NativeDrag)
        .unwrap()
}

mod page_load {
    use super::*;

    #[test]
    fn test_position_title_displayed() {
        let mut s = session();
        open_board(&mut s);
        let title = Locator::new("h2");
        s.expect_eventually(&title, &Predicate::Visible, TIMEOUT_MS).unwrap();
        s.expect_now(&title, &Predicate::NotEmpty).unwrap();
        let h2 = s.find("h2").first().unwrap();
        assert_eq!(s.text(h2).unwrap(), "Senior Backend Engineer");
    }

    #[test]
    fn test_every_stage_column_has_a_header() {
        let mut s = session();
        open_board(&mut s);
        s.expect_eventually(&columns(), &Predicate::CountGreaterThan(0), TIMEOUT_MS)
            .unwrap();

        let count = s.find(Selector::test_id("stage-column")).count().unwrap();
        assert_eq!(count, 3);
        for i in 0..count {
            let header = columns().nth(i).find(".card-header");
            s.expect_now(&header, &Predicate::Visible).unwrap();
            s.expect_now(&header, &Predicate::NotEmpty).unwrap();
        }
        let headers: Vec<String> = s
            .find(".card-header")
            .all()
            .unwrap()
            .into_iter()
            .map(|h| s.text(h).unwrap())
            .collect();
        assert_eq!(
            headers,
            ["Initial Screening", "Technical Interview", "Manager Interview"]
        );
    }

    #[test]
    fn test_candidate_cards_sit_in_their_stage() {
        let mut s = session();
        open_board(&mut s);
        for (column, expected) in [(0, 2), (1, 1), (2, 0)] {
            s.expect_now(&cards_in(column), &Predicate::CountEquals(expected))
                .unwrap();
        }
        for card in s.find(Selector::test_id("candidate-card")).all().unwrap() {
            let state = s.inspect(card).unwrap();
            expect(state)
                .to_be_visible()
                .unwrap()
                .to_have_attribute("draggable", "false")
                .unwrap();
            let title = s.within(card, ".card-title").first().unwrap();
            assert!(!s.text(title).unwrap().trim().is_empty());
        }
    }

    #[test]
    fn test_loads_without_console_errors_and_navigates_back() {
        let mut s = session();
        open_board(&mut s);
        assert!(s.console_errors().is_empty());

        let back = s
            .find(Selector::css("button").with_text("Volver a Posiciones"))
            .first()
            .unwrap();
        assert!(s.is_visible(back).unwrap());
        s.click(back).unwrap();
        assert!(s.current_path().unwrap().contains("/positions"));
        s.expect_eventually(
            &Locator::new(Selector::data_cy("position-card")),
            &Predicate::CountEquals(2),
            TIMEOUT_MS,
        )
        .unwrap();
    }

    #[test]
    fn test_view_process_button_opens_board() {
        let mut s = session();
        s.goto_ready("/positions", Selector::data_cy("position-card"))
            .unwrap();
        let button = s.find(Selector::data_cy("view-process-btn")).nth(1).unwrap();
        s.click(button).unwrap();
        assert_eq!(s.current_path(), Some("/positions/2"));
        s.expect_eventually(&columns(), &Predicate::CountEquals(2), TIMEOUT_MS)
            .unwrap();
    }

    #[test]
    fn test_unknown_position_logs_error() {
        let mut s = session();
        s.goto_ready("/positions/42", "h2").unwrap();
        let h2 = s.find("h2").first().unwrap();
        assert_eq!(s.text(h2).unwrap(), "Posición no encontrada");
        assert_eq!(s.console_errors().len(), 1);
    }

    #[test]
    fn test_navigation_timeout() {
        let mut s = session();
        let err = s.goto_ready("/positions/1", ".never-rendered").unwrap_err();
        assert!(matches!(
            err,
            LanecheckError::NavigationTimeout { ref selector, .. } if selector == ".never-rendered"
        ));
    }
}

mod stage_change {
    use super::*;

    #[test]
    fn test_card_moves_to_target_column() {
        let mut s = session();
        open_board(&mut s);
        let initial = s.locate(cards_in(0)).count().unwrap();
        let card = cards_in(0).first().one(s.document()).unwrap();
        let name = s.text(card).unwrap();

        let report = drag_first_card(&mut s, 0, 1);
        assert!(report.handled());

        s.expect_eventually(&cards_in(0), &Predicate::CountEquals(initial - 1), TIMEOUT_MS)
            .unwrap();
        let moved = columns().nth(1).find(Selector::text(name.trim()));
        s.expect_eventually(&moved, &Predicate::Visible, TIMEOUT_MS)
            .unwrap();
    }

    #[test]
    fn test_update_request_sent() {
        let mut s = session();
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);
        drag_first_card(&mut s, 0, 1);

        let call = s.await_call(update).unwrap();
        expect(call.clone())
            .to_have_method(HttpMethod::Put)
            .unwrap()
            .to_have_url_containing("/candidates/1")
            .unwrap()
            .to_have_body_keys(&["applicationId", "currentInterviewStep"])
            .unwrap()
            .to_have_body_field("applicationId", json!(101))
            .unwrap()
            .to_have_body_field("currentInterviewStep", json!(2))
            .unwrap()
            .to_have_status(200)
            .unwrap();
        assert!(!call.stubbed);
    }

    #[test]
    fn test_server_error_is_handled_gracefully() {
        let mut s = session();
        s.intercept_rule(InterceptRule::new(HttpMethod::Put, "**/candidates/*").with_alias("updateCandidate")).unwrap();
        let failing = s.intercept_rule(
            InterceptRule::new(HttpMethod::Put, "/candidates/*")
                .with_stub(StubResponse::json(json!({ "error": "Server Error" })).with_status(500))
                .with_alias("updateCandidateError"),
        ).unwrap();
        open_board(&mut s);
        let report = drag_first_card(&mut s, 0, 1);
        assert!(report.handled());

        let call = s.await_call(s.rule("@updateCandidateError").unwrap()).unwrap();
        assert_eq!(call.status, 500);
        assert!(call.stubbed);
        assert_eq!(s.rule("updateCandidateError").unwrap(), failing);

        // The board puts the card back and reports the failure.
        s.expect_eventually(&cards_in(0), &Predicate::CountEquals(2), TIMEOUT_MS)
            .unwrap();
        assert_eq!(s.console_errors().len(), 1);

        // The recording-only rule saw the same request.
        let all = s.all_calls(s.rule("updateCandidate").unwrap()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_reload_after_failed_update_starts_with_clean_console() {
        let mut s = session();
        let failing = s.intercept_rule(
            InterceptRule::new(HttpMethod::Put, "/candidates/*")
                .with_stub(StubResponse::json(json!({ "error": "Server Error" })).with_status(500)),
        ).unwrap();
        open_board(&mut s);
        drag_first_card(&mut s, 0, 1);

        // The update is still in flight when the page goes away.
        s.reload_ready(Selector::test_id("stage-column")).unwrap();
        assert!(s.console_errors().is_empty());

        let call = s.await_call(failing).unwrap();
        assert_eq!(call.status, 500);
        assert_eq!(cards_in(0).count(s.document()).unwrap(), 2);
    }

    #[test]
    fn test_multiple_drags_record_each_call() {
        let mut s = session();
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);

        drag_first_card(&mut s, 0, 1);
        s.expect_call_count(update, 1, TIMEOUT_MS).unwrap();
        drag_first_card(&mut s, 0, 2);
        s.expect_call_count(update, 2, TIMEOUT_MS).unwrap();

        let calls = s.all_calls(update).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body_field("currentInterviewStep"), Some(&json!(2)));
        assert_eq!(calls[1].body_field("currentInterviewStep"), Some(&json!(3)));
        assert!(calls[0].seq < calls[1].seq);
    }

    #[test]
    fn test_pointer_drag_on_native_board_is_flagged() {
        let mut s = session();
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);
        let card = cards_in(0).first().one(s.document()).unwrap();
        let column = columns().nth(1).one(s.document()).unwrap();

        let report = s.simulate_drag(card, column, DragProtocol::Pointer).unwrap();
        assert!(!report.handled());
        s.pump().unwrap();
        assert_eq!(s.rule_state(update).unwrap(), RuleState::Registered);
        s.expect_now(&cards_in(0), &Predicate::CountEquals(2)).unwrap();

        let err = s
            .simulate_drag_with(card, column, DragProtocol::Pointer, DragOptions::strict())
            .unwrap_err();
        assert_eq!(err.kind(), "InteractionIgnored");
    }

    #[test]
    fn test_pointer_board_accepts_pointer_drag() {
        let mut s = session_with(BoardFixture::default(), DragProtocol::Pointer);
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);
        let card = cards_in(0).first().one(s.document()).unwrap();
        let column = columns().nth(1).one(s.document()).unwrap();
        let report = s.simulate_drag(card, column, DragProtocol::Pointer).unwrap();
        assert!(report.handled());
        s.await_call(update).unwrap();
    }

    #[test]
    fn test_await_without_call_times_out() {
        let mut s = session();
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);
        let err = s.await_call_within(update, 20).unwrap_err();
        assert!(matches!(
            err,
            LanecheckError::InterceptTimeout { timeout_ms: 20, .. }
        ));
    }
}

mod integration {
    use super::*;

    #[test]
    fn test_stage_change_persists_across_reload() {
        let mut s = session();
        let update = s.intercept(HttpMethod::Put, "**/candidates/*", None).unwrap();
        open_board(&mut s);
        let before_target = s.locate(cards_in(1)).count().unwrap();
        let before_source = s.locate(cards_in(0)).count().unwrap();

        drag_first_card(&mut s, 0, 1);
        s.await_call(update).unwrap();
        s.reload_ready(Selector::test_id("stage-column")).unwrap();

        s.expect_eventually(&cards_in(1), &Predicate::CountEquals(before_target + 1), TIMEOUT_MS)
            .unwrap();
        s.expect_now(&cards_in(0), &Predicate::CountEquals(before_source - 1))
            .unwrap();
    }

    #[test]
    fn test_handles_go_stale_on_reload() {
        let mut s = session();
        open_board(&mut s);
        let card = s.find(Selector::test_id("candidate-card")).first().unwrap();
        let column = columns().nth(1).one(s.document()).unwrap();
        s.reload_ready(Selector::test_id("stage-column")).unwrap();

        assert_eq!(s.text(card).unwrap_err().kind(), "StaleHandleError");
        let err = s
            .simulate_drag(card, column, DragProtocol::NativeDrag)
            .unwrap_err();
        assert!(matches!(err, LanecheckError::StaleHandle { .. }));
    }

    #[test]
    fn test_single_column_board_bounds() {
        let fixture = BoardFixture {
            positions: vec![PositionFixture {
                id: 1,
                title: "Solo".to_string(),
                steps: vec![InterviewStep {
                    id: 1,
                    name: "Only".to_string(),
                }],
                candidates: vec![Candidate {
                    id: 1,
                    application_id: 10,
                    full_name: "Eve Adams".to_string(),
                    current_interview_step: 1,
                }],
            }],
        };
        let mut s = session_with(fixture, DragProtocol::NativeDrag);
        open_board(&mut s);
        let query = s.find(Selector::test_id("stage-column"));
        assert_eq!(query.count().unwrap(), 1);
        let err = query.nth(1).unwrap_err();
        assert!(matches!(err, LanecheckError::OutOfRange { index: 1, len: 1, .. }));
    }

    #[test]
    fn test_zero_matches_is_a_count_not_an_error() {
        let mut s = session();
        open_board(&mut s);
        assert_eq!(s.find(".does-not-exist").count().unwrap(), 0);
        s.expect_now(&Locator::new(".does-not-exist"), &Predicate::CountEquals(0))
            .unwrap();
        assert!(s.find(".does-not-exist").first().is_err());
    }

    #[test]
    fn test_calls_before_registration_are_not_recorded() {
        let mut s = session();
        open_board(&mut s);
        let loads = s.intercept(HttpMethod::Get, "**/positions/1/**", None).unwrap();
        assert_eq!(s.rule_state(loads).unwrap(), RuleState::Registered);
        assert!(s.all_calls(loads).unwrap().is_empty());

        s.reload_ready(Selector::test_id("stage-column")).unwrap();
        assert_eq!(s.rule_state(loads).unwrap(), RuleState::HasPendingCalls(2));
        let first = s.all_calls(loads).unwrap();
        let second = s.all_calls(loads).unwrap();
        assert_eq!(first, second);
        assert_eq!(s.rule_state(loads).unwrap(), RuleState::Registered);
        assert!(s.calls_observed().len() > first.len());
    }
}

mod declarative {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_bundled_suite_passes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../suites/position_details.yaml");
        let file = lanecheck::script::SuiteFile::load(&path).unwrap();
        let suite = file.to_suite();
        let results = TestHarness::new()
            .with_jobs(4)
            .run(&suite, &|| session());
        assert!(results.all_passed(), "{:#?}", results.failures());
        assert_eq!(results.total(), file.test_count());
    }
}
