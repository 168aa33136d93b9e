//! Checks on the DorisCluster compute groups that run before any resource is touched

use crate::crd::ComputeGroup;
use crate::events::EventReason;
use crate::labels::{compute_group_statefulset_name, metadata_statefulset_name};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Letters and digits, single underscores between them, starting with a letter
pub const UNIQUE_ID_PATTERN: &str = r"^[a-zA-Z](_?[0-9a-zA-Z])*$";

static UNIQUE_ID_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(UNIQUE_ID_PATTERN).ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub reason: EventReason,
    pub message: String,
}

pub fn is_valid_unique_id(unique_id: &str) -> bool {
    UNIQUE_ID_REGEX
        .as_ref()
        .is_some_and(|re| re.is_match(unique_id))
}

/// First duplicate or malformed unique id, if any.
///
/// Ids are compared by the resource name they map to, so `cg1` and `CG1`
/// collide, and so does any id that lands on the metadata tier's name.
pub fn validate_compute_groups(cluster: &str, groups: &[ComputeGroup]) -> Result<(), ValidationFailure> {
    let metadata = metadata_statefulset_name(cluster);
    let mut seen: HashMap<String, &str> = HashMap::new();
    for group in groups {
        let name = compute_group_statefulset_name(cluster, &group.unique_id);
        if name == metadata {
            return Err(ValidationFailure {
                reason: EventReason::UniqueIdDuplicate,
                message: format!(
                    "compute group uniqueId '{}' maps to '{}', which the metadata tier already uses",
                    group.unique_id, name
                ),
            });
        }
        if let Some(first) = seen.insert(name.clone(), group.unique_id.as_str()) {
            let message = if first == group.unique_id {
                format!("compute group uniqueId '{}' is duplicated", group.unique_id)
            } else {
                format!(
                    "compute group uniqueIds '{}' and '{}' both map to '{}'",
                    first, group.unique_id, name
                )
            };
            return Err(ValidationFailure {
                reason: EventReason::UniqueIdDuplicate,
                message,
            });
        }
    }
    for group in groups {
        if !is_valid_unique_id(&group.unique_id) {
            return Err(ValidationFailure {
                reason: EventReason::UniqueIdNotMatchRegex,
                message: format!(
                    "compute group uniqueId '{}' does not match {}",
                    group.unique_id, UNIQUE_ID_PATTERN
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn group(id: &str) -> ComputeGroup {
        ComputeGroup {
            unique_id: id.into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("cg1", true)]
    #[case("Cg_read_1", true)]
    #[case("a", true)]
    #[case("1cg", false)]
    #[case("cg__1", false)]
    #[case("cg_", false)]
    #[case("cg-1", false)]
    #[case("", false)]
    fn test_unique_id_pattern(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(is_valid_unique_id(id), valid);
    }

    #[test]
    fn test_duplicate_detected() {
        let failure = validate_compute_groups("prod", &[group("cg1"), group("cg2"), group("cg1")]).unwrap_err();
        assert_eq!(failure.reason, EventReason::UniqueIdDuplicate);
        assert!(failure.message.contains("cg1"));
    }

    #[rstest]
    #[case(&["cg1", "CG1"], "CG1")]
    #[case(&["cg_1", "cg1", "Cg_1"], "Cg_1")]
    #[case(&["cg1", "fe"], "fe")]
    #[case(&["FE"], "FE")]
    fn test_resource_name_collision_detected(#[case] ids: &[&str], #[case] offender: &str) {
        let groups: Vec<ComputeGroup> = ids.iter().map(|id| group(id)).collect();
        let failure = validate_compute_groups("prod", &groups).unwrap_err();
        assert_eq!(failure.reason, EventReason::UniqueIdDuplicate);
        assert!(failure.message.contains(&format!("'{}'", offender)));
    }

    #[test]
    fn test_ids_near_metadata_name_are_accepted() {
        // "fe1" and "fe_x" never reach the metadata tier's name
        assert!(validate_compute_groups("prod", &[group("fe1"), group("fe_x")]).is_ok());
    }

    #[test]
    fn test_malformed_detected() {
        let failure = validate_compute_groups("prod", &[group("cg1"), group("bad-id")]).unwrap_err();
        assert_eq!(failure.reason, EventReason::UniqueIdNotMatchRegex);
    }

    #[test]
    fn test_valid_groups() {
        assert!(validate_compute_groups("prod", &[group("cg1"), group("cg_2")]).is_ok());
        assert!(validate_compute_groups("prod", &[]).is_ok());
    }
}
