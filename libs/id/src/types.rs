//! Typed ID definitions.

use crate::define_id;

// =============================================================================
// Cluster resources
// =============================================================================

define_id!(NodeId, "node");
define_id!(PodId, "pod");

// =============================================================================
// Requests
// =============================================================================

define_id!(RequestId, "req");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_node_id_roundtrip() {
        let id = NodeId::new();
        let s = id.to_string();
        assert!(s.starts_with("node_"));
        let parsed: NodeId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_pod_id_rejected_as_node_id() {
        let pod = PodId::new().to_string();
        let err = pod.parse::<NodeId>().unwrap_err();
        assert!(err.is_prefix_error());
        assert!(matches!(
            err,
            crate::IdError::InvalidPrefix {
                expected: "node",
                ..
            }
        ));
    }

    #[test]
    fn test_node_id_missing_separator() {
        let result: Result<NodeId, _> = "node01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_node_id_empty() {
        let result: Result<NodeId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_node_id_invalid_ulid() {
        let result: Result<NodeId, _> = "node_invalid".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidUlid(_)
        ));
    }

    #[test]
    fn test_pod_id_json_is_plain_string() {
        let id = PodId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: PodId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_json_rejects_wrong_prefix() {
        let json = format!("\"{}\"", NodeId::new());
        assert!(serde_json::from_str::<PodId>(&json).is_err());
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = [NodeId::PREFIX, PodId::PREFIX, RequestId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn parse_never_panics(s in "\\PC{0,40}") {
            let _ = NodeId::parse(&s);
        }

        #[test]
        fn parse_accepts_only_own_prefix(raw in any::<u128>()) {
            let ulid = crate::Ulid::from(raw);
            let node = NodeId::from_ulid(ulid).to_string();
            prop_assert_eq!(NodeId::parse(&node).map(|id| id.ulid()), Ok(ulid));
            prop_assert!(PodId::parse(&node).is_err());
        }
    }
}
