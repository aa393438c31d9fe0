//! Mock construction helpers

use mockall::mock;
use vistrace::analysis::{AdvisoryClassifier, AdvisoryRequest};
use vistrace::VisTraceError;

mock! {
    pub Advisor {}

    impl AdvisoryClassifier for Advisor {
        fn name(&self) -> String;
        fn consult(&self, request: &AdvisoryRequest) -> vistrace::Result<String>;
    }
}

/// Advisor that answers every request with `reply`
pub fn replying(reply: &'static str) -> MockAdvisor {
    let mut advisor = MockAdvisor::new();
    advisor.expect_name().return_const("mock".to_string());
    advisor
        .expect_consult()
        .returning(move |_| Ok(reply.to_string()));
    advisor
}

/// Advisor that echoes the expected decision back
pub fn agreeing() -> MockAdvisor {
    let mut advisor = MockAdvisor::new();
    advisor.expect_name().return_const("mock".to_string());
    advisor.expect_consult().returning(|request| {
        Ok(format!(
            r#"{{"selection": "{}", "visualization_type": "{}", "rationale": "looks right"}}"#,
            request.expected.selection_id(),
            request.expected.as_str()
        ))
    });
    advisor
}

/// Advisor whose transport always fails
pub fn failing() -> MockAdvisor {
    let mut advisor = MockAdvisor::new();
    advisor.expect_name().return_const("mock".to_string());
    advisor
        .expect_consult()
        .returning(|_| Err(VisTraceError::Advisory("connection refused".to_string())));
    advisor
}
