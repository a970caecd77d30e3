//! Everything the content layer hands over for one learner submission

use crate::graph::GraphSpec;
use crate::requirements::RequiredTopology;
use crate::test_case::TestCase;
use serde::{Deserialize, Serialize};

/// Graph, structural requirements and test cases of one submission
///
/// The graph stays in wire form so that a structurally invalid architecture
/// can still be reported per test case instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Learner's architecture
    pub graph: GraphSpec,
    /// Problem requirements checked before simulation
    #[serde(default)]
    pub requirements: RequiredTopology,
    /// Scenarios to grade
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;

    #[test]
    fn parses_full_submission() {
        let submission: Submission = serde_json::from_value(serde_json::json!({
            "graph": {
                "components": [
                    { "id": "client", "kind": "client" },
                    { "id": "app", "kind": "app_server", "config": { "instances": 2 } }
                ],
                "connections": [ { "from": "client", "to": "app", "trafficType": "read_write" } ]
            },
            "requirements": {
                "mustHave": ["app_server"],
                "mustConnect": [ { "from": "client", "to": "app_server" } ]
            },
            "testCases": [
                { "name": "NFR-P1", "traffic": { "type": "read", "rps": 100 }, "durationSeconds": 10 }
            ]
        }))
        .unwrap();

        assert_eq!(submission.requirements.must_have, vec![ComponentKind::AppServer]);
        assert_eq!(submission.test_cases.len(), 1);
        assert!(submission.graph.validate().is_ok());
    }
}
