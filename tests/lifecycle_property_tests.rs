//! Property-based tests for the achievement lifecycle
//!
//! Random event sequences, first against the pure transition table and then
//! against the engine with in-memory stores.

use proptest::prelude::*;

use achievement_workflow::achievements::AchievementStatus;
use achievement_workflow::workflows::{transition, TransitionOutcome, WorkflowError, WorkflowEvent};

mod fixtures;
use fixtures::*;

fn event_strategy() -> impl Strategy<Value = WorkflowEvent> {
    prop::sample::select(WorkflowEvent::ALL.to_vec())
}

fn status_strategy() -> impl Strategy<Value = AchievementStatus> {
    prop::sample::select(AchievementStatus::ALL.to_vec())
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Update,
    Submit,
    Verify,
    Reject,
    Delete,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Update),
        Just(Step::Submit),
        Just(Step::Verify),
        Just(Step::Reject),
        Just(Step::Delete),
    ]
}

#[cfg(test)]
mod property_tests {
    use super::*;

    #[test]
    fn prop_invalid_events_never_change_status() {
        let mut runner = proptest::test_runner::TestRunner::default();

        runner
            .run(
                &(status_strategy(), prop::collection::vec(event_strategy(), 0..30)),
                |(start, events)| {
                    let mut status = start;
                    for event in events {
                        match transition(status, event) {
                            Ok(TransitionOutcome::Status(next)) => status = next,
                            Ok(TransitionOutcome::Removed) => {
                                prop_assert_eq!(status, AchievementStatus::Draft);
                                break;
                            }
                            Err(WorkflowError::InvalidTransition { from, event: rejected }) => {
                                prop_assert_eq!(from, status);
                                prop_assert_eq!(rejected, event);
                            }
                            Err(other) => {
                                return Err(proptest::test_runner::TestCaseError::Fail(
                                    format!("unexpected error: {other}").into(),
                                ))
                            }
                        }
                    }
                    Ok(())
                },
            )
            .unwrap();
    }

    #[test]
    fn prop_verified_is_absorbing() {
        let mut runner = proptest::test_runner::TestRunner::default();

        runner
            .run(&prop::collection::vec(event_strategy(), 1..20), |events| {
                for event in events {
                    match transition(AchievementStatus::Verified, event) {
                        Ok(TransitionOutcome::Status(next)) => {
                            prop_assert_eq!(next, AchievementStatus::Verified)
                        }
                        Ok(TransitionOutcome::Removed) => {
                            return Err(proptest::test_runner::TestCaseError::Fail(
                                "verified achievement was removable".into(),
                            ))
                        }
                        Err(_) => {}
                    }
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn prop_engine_keeps_stores_consistent() {
        let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
            cases: 32,
            ..proptest::test_runner::Config::default()
        });

        runner
            .run(&prop::collection::vec(step_strategy(), 0..15), |steps| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let harness = Harness::new();
                    let s1 = student("s1");
                    let a1 = advisor("a1");
                    let created = harness
                        .engine
                        .create(&s1, sports_content("Futsal"))
                        .await
                        .unwrap();
                    let id = created.record.id.clone();
                    let mut expected = Some(AchievementStatus::Draft);

                    for step in steps {
                        let before = harness.stored_record(&id).await;
                        let result = match step {
                            Step::Update => harness
                                .engine
                                .update(&s1, &id, sports_content("Edited"))
                                .await
                                .map(|a| Some(a.status())),
                            Step::Submit => harness.engine.submit(&s1, &id).await.map(|r| Some(r.status)),
                            Step::Verify => harness.engine.verify(&a1, &id).await.map(|r| Some(r.status)),
                            Step::Reject => harness
                                .engine
                                .reject(&a1, &id, "again")
                                .await
                                .map(|r| Some(r.status)),
                            Step::Delete => harness.engine.delete(&s1, &id).await.map(|_| None),
                        };

                        match result {
                            Ok(status) => expected = status,
                            Err(_) => {
                                // failed operations leave the record untouched
                                prop_assert_eq!(harness.stored_record(&id).await, before);
                            }
                        }

                        let stored = harness.stored_record(&id).await.map(|r| r.status);
                        prop_assert_eq!(stored, expected);
                        harness.assert_live_records_have_documents().await;
                    }
                    Ok(())
                })
            })
            .unwrap();
    }
}
