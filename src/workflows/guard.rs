// Authorization guard
//
// The one place role semantics live. Consulted before every mutating
// operation and before handing a record to a caller.

use std::sync::Arc;

use super::state_machine::WorkflowEvent;
use crate::achievements::{Caller, Role, WorkflowRecord};
use crate::external::{AdvisorDirectory, DirectoryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub struct AuthorizationGuard {
    directory: Arc<dyn AdvisorDirectory>,
}

impl std::fmt::Debug for AuthorizationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGuard").finish_non_exhaustive()
    }
}

impl AuthorizationGuard {
    pub fn new(directory: Arc<dyn AdvisorDirectory>) -> Self {
        Self { directory }
    }

    /// Decide whether `caller` may apply `event` to `record`.
    ///
    /// Rules, in order:
    /// - admins are always allowed;
    /// - students may create, and may read/update/delete/submit/attach only
    ///   their own records;
    /// - advisors may verify/reject/read only records of students currently
    ///   assigned to them. The assignment is looked up on every call.
    ///
    /// `record` is `None` only for `Create`.
    pub async fn can_transition(
        &self,
        caller: &Caller,
        record: Option<&WorkflowRecord>,
        event: WorkflowEvent,
    ) -> Result<Decision, DirectoryError> {
        if caller.role == Role::Admin {
            return Ok(Decision::Allow);
        }

        if event == WorkflowEvent::Create {
            return Ok(match caller.role {
                Role::Student => Decision::Allow,
                _ => Decision::Deny(format!("{} callers cannot create achievements", caller.role)),
            });
        }

        let Some(record) = record else {
            return Ok(Decision::Deny(format!("no achievement to {event}")));
        };

        let decision = match caller.role {
            Role::Admin => Decision::Allow,
            Role::Student => match event {
                WorkflowEvent::Read
                | WorkflowEvent::Update
                | WorkflowEvent::Delete
                | WorkflowEvent::Submit
                | WorkflowEvent::AddAttachment => {
                    if record.student_id == caller.identity {
                        Decision::Allow
                    } else {
                        Decision::Deny(format!("students can only {event} their own achievements"))
                    }
                }
                _ => Decision::Deny(format!("students cannot {event} achievements")),
            },
            Role::Advisor => match event {
                WorkflowEvent::Verify | WorkflowEvent::Reject | WorkflowEvent::Read => {
                    match self.directory.assigned_advisor(&record.student_id).await? {
                        Some(advisor) if advisor == caller.identity => Decision::Allow,
                        Some(_) => Decision::Deny(format!(
                            "advisors can only {event} achievements of their own advisees"
                        )),
                        None => Decision::Deny(format!(
                            "student {} has no assigned advisor",
                            record.student_id
                        )),
                    }
                }
                _ => Decision::Deny(format!("advisors cannot {event} achievements")),
            },
        };

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::{DocumentId, UserId};
    use crate::external::{MockAdvisorDirectory, StaticDirectory};
    use chrono::Utc;

    fn record_of(student: &str) -> WorkflowRecord {
        WorkflowRecord::new_draft(UserId::from(student), DocumentId::from("doc"), Utc::now())
    }

    fn guard() -> AuthorizationGuard {
        AuthorizationGuard::new(Arc::new(
            StaticDirectory::new().with_advisor("s1", "a1"),
        ))
    }

    #[tokio::test]
    async fn test_admin_is_always_allowed() {
        let guard = guard();
        let admin = Caller::admin("root");
        let record = record_of("s1");

        for event in WorkflowEvent::ALL {
            let decision = guard
                .can_transition(&admin, Some(&record), event)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "admin denied {event}");
        }
    }

    #[tokio::test]
    async fn test_student_owner_rules() {
        let guard = guard();
        let record = record_of("s1");
        let owner = Caller::student("s1");
        let other = Caller::student("s2");

        for event in [
            WorkflowEvent::Update,
            WorkflowEvent::Delete,
            WorkflowEvent::Submit,
            WorkflowEvent::Read,
        ] {
            assert!(guard
                .can_transition(&owner, Some(&record), event)
                .await
                .unwrap()
                .is_allowed());
            assert!(!guard
                .can_transition(&other, Some(&record), event)
                .await
                .unwrap()
                .is_allowed());
        }

        assert!(guard
            .can_transition(&owner, None, WorkflowEvent::Create)
            .await
            .unwrap()
            .is_allowed());
        assert!(!guard
            .can_transition(&owner, Some(&record), WorkflowEvent::Verify)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_advisor_must_be_assigned() {
        let guard = guard();
        let record = record_of("s1");

        let assigned = Caller::advisor("a1");
        let stranger = Caller::advisor("a2");

        for event in [WorkflowEvent::Verify, WorkflowEvent::Reject] {
            assert!(guard
                .can_transition(&assigned, Some(&record), event)
                .await
                .unwrap()
                .is_allowed());
            assert!(matches!(
                guard
                    .can_transition(&stranger, Some(&record), event)
                    .await
                    .unwrap(),
                Decision::Deny(_)
            ));
        }

        assert!(!guard
            .can_transition(&assigned, Some(&record), WorkflowEvent::Update)
            .await
            .unwrap()
            .is_allowed());
        assert!(!guard
            .can_transition(&assigned, None, WorkflowEvent::Create)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_unassigned_student_denies_every_advisor() {
        let guard = guard();
        let record = record_of("s9");

        let decision = guard
            .can_transition(&Caller::advisor("a1"), Some(&record), WorkflowEvent::Verify)
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::Deny("student s9 has no assigned advisor".to_string())
        );
    }

    #[tokio::test]
    async fn test_assignment_is_resolved_on_every_check() {
        let mut directory = MockAdvisorDirectory::new();
        directory
            .expect_assigned_advisor()
            .times(2)
            .returning(|_| Ok(Some(UserId::from("a1"))));
        let guard = AuthorizationGuard::new(Arc::new(directory));
        let record = record_of("s1");
        let advisor = Caller::advisor("a1");

        for _ in 0..2 {
            guard
                .can_transition(&advisor, Some(&record), WorkflowEvent::Verify)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_directory_failure_is_an_error_not_a_denial() {
        let mut directory = MockAdvisorDirectory::new();
        directory
            .expect_assigned_advisor()
            .returning(|_| Err(DirectoryError::Unavailable("ldap down".to_string())));
        let guard = AuthorizationGuard::new(Arc::new(directory));

        let result = guard
            .can_transition(
                &Caller::advisor("a1"),
                Some(&record_of("s1")),
                WorkflowEvent::Reject,
            )
            .await;
        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }
}
