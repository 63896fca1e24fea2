use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::registry::ImageDetail;

/// Select the images that should be appended to the results file
///
/// Without a previous fetch time the poller starts cold and keeps the
/// `cold_start_limit` most recently pushed images. Otherwise only images pushed
/// strictly after `last_fetched` are kept.
pub fn filter_images(
    images: Vec<ImageDetail>,
    last_fetched: Option<DateTime<Utc>>,
    cold_start_limit: usize,
) -> Vec<ImageDetail> {
    match last_fetched {
        None => latest_images(images, cold_start_limit),
        Some(since) => pushed_after(images, since),
    }
}

/// The `limit` most recently pushed images, newest first
///
/// Equal push times are ordered by digest so repeated runs pick the same
/// images. Images without a push time sort last.
pub fn latest_images(mut images: Vec<ImageDetail>, limit: usize) -> Vec<ImageDetail> {
    images.sort_by(newest_first);
    images.truncate(limit);
    images
}

/// Images pushed strictly after `since`, in their original order
pub fn pushed_after(images: Vec<ImageDetail>, since: DateTime<Utc>) -> Vec<ImageDetail> {
    images
        .into_iter()
        .filter(|image| image.image_pushed_at.is_some_and(|pushed| pushed > since))
        .collect()
}

fn newest_first(a: &ImageDetail, b: &ImageDetail) -> Ordering {
    // None < Some(_), so reversing puts undated images at the end
    b.image_pushed_at
        .cmp(&a.image_pushed_at)
        .then_with(|| a.image_digest.cmp(&b.image_digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::image;

    fn digests(images: &[ImageDetail]) -> Vec<&str> {
        images
            .iter()
            .map(|i| i.image_digest.as_deref().unwrap_or_default())
            .collect()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_cold_start_keeps_five_newest() {
        let images = vec![
            image("a", Some(10)),
            image("b", Some(70)),
            image("c", Some(30)),
            image("d", Some(60)),
            image("e", Some(20)),
            image("f", Some(50)),
            image("g", Some(40)),
        ];

        let selected = filter_images(images, None, 5);
        assert_eq!(digests(&selected), vec!["b", "d", "f", "g", "c"]);
    }

    #[test]
    fn test_cold_start_with_few_images_returns_all_sorted() {
        let images = vec![image("a", Some(10)), image("b", Some(30)), image("c", Some(20))];

        let selected = filter_images(images, None, 5);
        assert_eq!(digests(&selected), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_cold_start_exactly_five() {
        let images: Vec<_> = (0..5).map(|i| image(&format!("d{}", i), Some(i))).collect();
        let selected = filter_images(images, None, 5);
        assert_eq!(digests(&selected), vec!["d4", "d3", "d2", "d1", "d0"]);
    }

    #[test]
    fn test_cold_start_ties_break_on_digest() {
        let images = vec![
            image("sha256:c", Some(10)),
            image("sha256:a", Some(10)),
            image("sha256:b", Some(10)),
        ];
        let selected = latest_images(images, 2);
        assert_eq!(digests(&selected), vec!["sha256:a", "sha256:b"]);
    }

    #[test]
    fn test_cold_start_undated_images_sort_last() {
        let images = vec![image("undated", None), image("old", Some(1)), image("new", Some(2))];
        let selected = latest_images(images, 5);
        assert_eq!(digests(&selected), vec!["new", "old", "undated"]);
    }

    #[test]
    fn test_cold_start_respects_custom_limit() {
        let images: Vec<_> = (0..8).map(|i| image(&format!("d{}", i), Some(i))).collect();
        assert_eq!(filter_images(images, None, 3).len(), 3);
    }

    #[test]
    fn test_warm_start_is_strictly_after_and_keeps_order() {
        let images = vec![
            image("a", Some(50)),
            image("b", Some(10)),
            image("c", Some(30)),
            image("d", Some(20)),
            image("e", None),
            image("f", Some(40)),
        ];

        let selected = filter_images(images, Some(at(20)), 5);
        assert_eq!(digests(&selected), vec!["a", "c", "f"]);
    }

    #[test]
    fn test_warm_start_ignores_cold_start_limit() {
        let images: Vec<_> = (1..=8).map(|i| image(&format!("d{}", i), Some(i))).collect();
        let selected = filter_images(images, Some(at(0)), 5);
        assert_eq!(selected.len(), 8);
    }

    #[test]
    fn test_warm_start_nothing_new() {
        let images = vec![image("a", Some(10)), image("b", Some(20))];
        assert!(pushed_after(images, at(20)).is_empty());
    }
}
