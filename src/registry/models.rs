use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one image pushed to an ECR repository
///
/// Field names follow the ECR API shape (`ImageDigest`, `ImagePushedAt`, ...)
/// because the results file is read by consumers that expect that layout.
/// Only `image_pushed_at` and `image_digest` are interpreted by the poller;
/// everything else is passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDetail {
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub repository_name: Option<String>,
    #[serde(default)]
    pub image_digest: Option<String>,
    /// `None` for untagged images, written as `null`
    #[serde(default)]
    pub image_tags: Option<Vec<String>>,
    #[serde(default)]
    pub image_size_in_bytes: Option<i64>,
    #[serde(default)]
    pub image_pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image_scan_status: Option<ImageScanStatus>,
    #[serde(default)]
    pub image_scan_findings_summary: Option<ImageScanFindingsSummary>,
    #[serde(default)]
    pub image_manifest_media_type: Option<String>,
    #[serde(default)]
    pub artifact_media_type: Option<String>,
    #[serde(default)]
    pub last_recorded_pull_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageScanStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageScanFindingsSummary {
    #[serde(default)]
    pub image_scan_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vulnerability_source_updated_at: Option<DateTime<Utc>>,
    /// Severity name (`CRITICAL`, `HIGH`, ...) to finding count
    #[serde(default)]
    pub finding_severity_counts: BTreeMap<String, i32>,
}

fn to_chrono(value: &aws_sdk_ecr::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

impl From<&aws_sdk_ecr::types::ImageScanStatus> for ImageScanStatus {
    fn from(status: &aws_sdk_ecr::types::ImageScanStatus) -> Self {
        Self {
            status: status.status().map(|s| s.as_str().to_string()),
            description: status.description().map(String::from),
        }
    }
}

impl From<&aws_sdk_ecr::types::ImageScanFindingsSummary> for ImageScanFindingsSummary {
    fn from(summary: &aws_sdk_ecr::types::ImageScanFindingsSummary) -> Self {
        let finding_severity_counts = summary
            .finding_severity_counts()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(severity, count)| (severity.as_str().to_string(), *count))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            image_scan_completed_at: summary.image_scan_completed_at().and_then(to_chrono),
            vulnerability_source_updated_at: summary
                .vulnerability_source_updated_at()
                .and_then(to_chrono),
            finding_severity_counts,
        }
    }
}

impl From<&aws_sdk_ecr::types::ImageDetail> for ImageDetail {
    fn from(detail: &aws_sdk_ecr::types::ImageDetail) -> Self {
        Self {
            registry_id: detail.registry_id().map(String::from),
            repository_name: detail.repository_name().map(String::from),
            image_digest: detail.image_digest().map(String::from),
            image_tags: Some(detail.image_tags())
                .filter(|tags| !tags.is_empty())
                .map(<[String]>::to_vec),
            image_size_in_bytes: detail.image_size_in_bytes(),
            image_pushed_at: detail.image_pushed_at().and_then(to_chrono),
            image_scan_status: detail.image_scan_status().map(ImageScanStatus::from),
            image_scan_findings_summary: detail
                .image_scan_findings_summary()
                .map(ImageScanFindingsSummary::from),
            image_manifest_media_type: detail.image_manifest_media_type().map(String::from),
            artifact_media_type: detail.artifact_media_type().map(String::from),
            last_recorded_pull_time: detail.last_recorded_pull_time().and_then(to_chrono),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecr::primitives::DateTime as SdkDateTime;
    use aws_sdk_ecr::types::{FindingSeverity, ScanStatus};

    #[test]
    fn test_from_sdk_image_detail() {
        let sdk = aws_sdk_ecr::types::ImageDetail::builder()
            .registry_id("123456789")
            .repository_name("devtron/web")
            .image_digest("sha256:abc")
            .image_tags("v1")
            .image_tags("latest")
            .image_size_in_bytes(1024)
            .image_pushed_at(SdkDateTime::from_secs(1_700_000_000))
            .image_scan_status(
                aws_sdk_ecr::types::ImageScanStatus::builder()
                    .status(ScanStatus::Complete)
                    .description("The scan was completed successfully.")
                    .build(),
            )
            .image_scan_findings_summary(
                aws_sdk_ecr::types::ImageScanFindingsSummary::builder()
                    .finding_severity_counts(FindingSeverity::High, 2)
                    .build(),
            )
            .build();

        let detail = ImageDetail::from(&sdk);
        assert_eq!(detail.registry_id.as_deref(), Some("123456789"));
        assert_eq!(detail.repository_name.as_deref(), Some("devtron/web"));
        assert_eq!(detail.image_digest.as_deref(), Some("sha256:abc"));
        assert_eq!(
            detail.image_tags,
            Some(vec!["v1".to_string(), "latest".to_string()])
        );
        assert_eq!(detail.image_size_in_bytes, Some(1024));
        assert_eq!(
            detail.image_pushed_at,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
        let scan = detail.image_scan_status.unwrap();
        assert_eq!(scan.status.as_deref(), Some("COMPLETE"));
        let summary = detail.image_scan_findings_summary.unwrap();
        assert_eq!(summary.finding_severity_counts.get("HIGH"), Some(&2));
        assert!(detail.last_recorded_pull_time.is_none());
    }

    #[test]
    fn test_serializes_with_ecr_field_names() {
        let detail = ImageDetail {
            image_digest: Some("sha256:abc".to_string()),
            image_tags: Some(vec!["v1".to_string()]),
            image_pushed_at: DateTime::from_timestamp(1_700_000_000, 0),
            ..Default::default()
        };

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["ImageDigest"], "sha256:abc");
        assert_eq!(value["ImageTags"][0], "v1");
        assert_eq!(value["ImagePushedAt"], "2023-11-14T22:13:20Z");
        assert!(value["ImageSizeInBytes"].is_null());
    }

    #[test]
    fn test_untagged_image_writes_null_tags() {
        let sdk = aws_sdk_ecr::types::ImageDetail::builder()
            .image_digest("sha256:untagged")
            .build();

        let detail = ImageDetail::from(&sdk);
        assert_eq!(detail.image_tags, None);

        let value = serde_json::to_value(&detail).unwrap();
        assert!(value["ImageTags"].is_null());
        assert!(value.as_object().unwrap().contains_key("ImageTags"));
    }
}
