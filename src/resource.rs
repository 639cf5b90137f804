//! Remote resource model shared by the pruner and the Cloud Functions client.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// IAM role that allows invoking a Cloud Function over HTTP.
pub const INVOKER_ROLE: &str = "roles/cloudfunctions.invoker";

/// IAM principal matching every caller, authenticated or not.
pub const ALL_USERS: &str = "allUsers";

/// A deployed function as reported by the listing API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    /// `projects/{project}/locations/{region}/functions/{id}`.
    pub name: String,
    /// Time of the last modification, when the API reports one.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub update_time: Option<OffsetDateTime>,
}

impl RemoteResource {
    /// Creates a resource record.
    #[must_use]
    pub fn new(name: impl Into<String>, update_time: Option<OffsetDateTime>) -> Self {
        Self {
            name: name.into(),
            update_time,
        }
    }

    /// Whole seconds elapsed since the last update.
    ///
    /// A missing timestamp, or one later than `now`, counts as zero so that
    /// ambiguous resources never look stale.
    #[must_use]
    pub fn age_seconds(&self, now: OffsetDateTime) -> u64 {
        u64::try_from(self.age(now).whole_seconds()).unwrap_or(0)
    }

    /// Whole minutes elapsed since the last update; see
    /// [`RemoteResource::age_seconds`].
    #[must_use]
    pub fn age_minutes(&self, now: OffsetDateTime) -> u64 {
        u64::try_from(self.age(now).whole_minutes()).unwrap_or(0)
    }

    fn age(&self, now: OffsetDateTime) -> time::Duration {
        self.update_time
            .map_or(time::Duration::ZERO, |updated| now - updated)
    }

    /// Returns `true` when the resource name contains `tag`.
    #[must_use]
    pub fn name_contains(&self, tag: &str) -> bool {
        !tag.is_empty() && self.name.contains(tag)
    }
}

/// Fully qualified Cloud Functions resource name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionName {
    /// Project identifier.
    pub project: String,
    /// Region the function is deployed to.
    pub region: String,
    /// Function identifier within the region.
    pub id: String,
}

impl FunctionName {
    /// Creates a function name.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            id: id.into(),
        }
    }

    /// Listing parent that spans every region of `project`.
    #[must_use]
    pub fn all_locations_parent(project: &str) -> String {
        format!("projects/{project}/locations/-")
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/functions/{}",
            self.project, self.region, self.id
        )
    }
}

/// One role granted to a set of principals.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IamBinding {
    /// Role being granted.
    pub role: String,
    /// Principals receiving the role.
    pub members: Vec<String>,
}

/// IAM policy document attached to a function.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IamPolicy {
    /// Role bindings.
    pub bindings: Vec<IamBinding>,
}

impl IamPolicy {
    /// Policy that lets anyone invoke the function. Only ever applied to the
    /// harness's own short-lived function.
    #[must_use]
    pub fn public_invoker() -> Self {
        Self {
            bindings: vec![IamBinding {
                role: INVOKER_ROLE.to_owned(),
                members: vec![ALL_USERS.to_owned()],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    #[rstest]
    #[case(Some(NOW - Duration::minutes(120)), 120)]
    #[case(Some(NOW - Duration::seconds(59)), 0)]
    #[case(Some(NOW - Duration::seconds(3599)), 59)]
    #[case(Some(NOW + Duration::minutes(5)), 0)]
    #[case(None, 0)]
    fn age_minutes_is_whole_and_never_negative(
        #[case] update_time: Option<OffsetDateTime>,
        #[case] expected: u64,
    ) {
        let resource = RemoteResource::new("projects/p/locations/r/functions/f", update_time);
        assert_eq!(resource.age_minutes(NOW), expected);
    }

    #[rstest]
    fn deserialises_listing_entry_with_fractional_timestamp() {
        let resource: RemoteResource = serde_json::from_str(
            r#"{"name":"projects/p/locations/us-central1/functions/f","updateTime":"2024-05-01T10:00:00.123Z","status":"ACTIVE"}"#,
        )
        .expect("listing entry should parse");
        assert_eq!(resource.age_minutes(NOW), 119);
    }

    #[rstest]
    fn deserialises_listing_entry_without_timestamp() {
        let resource: RemoteResource =
            serde_json::from_str(r#"{"name":"projects/p/locations/r/functions/f"}"#)
                .expect("listing entry should parse");
        assert_eq!(resource.update_time, None);
    }

    #[rstest]
    fn function_name_renders_resource_path() {
        let name = FunctionName::new("proj", "us-central1", "gcloud-tests-abcd");
        assert_eq!(
            name.to_string(),
            "projects/proj/locations/us-central1/functions/gcloud-tests-abcd"
        );
        assert_eq!(
            FunctionName::all_locations_parent("proj"),
            "projects/proj/locations/-"
        );
    }

    #[rstest]
    fn empty_tag_never_matches() {
        let resource = RemoteResource::new("projects/p/locations/r/functions/f", None);
        assert!(!resource.name_contains(""));
    }

    #[rstest]
    fn public_invoker_policy_serialises_single_binding() {
        let json = serde_json::to_value(IamPolicy::public_invoker()).expect("serialise");
        assert_eq!(
            json,
            serde_json::json!({
                "bindings": [
                    {"role": "roles/cloudfunctions.invoker", "members": ["allUsers"]}
                ]
            })
        );
    }
}
