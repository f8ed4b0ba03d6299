use crate::domain::model::AgeBucket;

/// 依年齡範圍產生五歲一組的年齡層
///
/// 下界為 `age_min` 以及 `(age_min, age_max]` 之間所有 5 的倍數；
/// 每組延伸到下一組下界減一，最後一組為開放式（"65+"）。
/// 範圍不到五歲（`age_max - age_min < 5`）時只回傳一個封閉組
/// （例如 13..17 -> "13-17"）。`age_min > age_max` 回傳空陣列。
pub fn age_groups(age_min: u32, age_max: u32) -> Vec<AgeBucket> {
    if age_min > age_max {
        return Vec::new();
    }
    if age_max - age_min < 5 {
        return vec![AgeBucket::closed(age_min, age_max)];
    }

    // 至少五個連續年齡，(age_min, age_max] 內必有一個 5 的倍數
    let mut lower_bounds = vec![age_min];
    lower_bounds.extend((age_min + 1..=age_max).filter(|age| age % 5 == 0));

    let last = lower_bounds.len() - 1;
    lower_bounds
        .iter()
        .enumerate()
        .map(|(i, &lower)| {
            if i == last {
                AgeBucket::open(lower)
            } else {
                AgeBucket::closed(lower, lower_bounds[i + 1] - 1)
            }
        })
        .collect()
}

pub fn labels(buckets: &[AgeBucket]) -> Vec<String> {
    buckets.iter().map(AgeBucket::label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        let buckets = age_groups(13, 65);
        let names = labels(&buckets);

        assert_eq!(names.first().unwrap(), "13-14");
        assert_eq!(names[1], "15-19");
        assert_eq!(names[names.len() - 2], "60-64");
        assert_eq!(names.last().unwrap(), "65+");
        assert_eq!(buckets.len(), 12);
    }

    #[test]
    fn test_single_clipped_bucket() {
        assert_eq!(labels(&age_groups(13, 17)), vec!["13-17"]);
        assert_eq!(labels(&age_groups(61, 65)), vec!["61-65"]);
        assert_eq!(labels(&age_groups(60, 64)), vec!["60-64"]);
    }

    #[test]
    fn test_five_year_span_splits() {
        assert_eq!(labels(&age_groups(13, 18)), vec!["13-14", "15+"]);
        assert_eq!(labels(&age_groups(61, 66)), vec!["61-64", "65+"]);
    }

    #[test]
    fn test_two_buckets() {
        assert_eq!(labels(&age_groups(18, 24)), vec!["18-19", "20+"]);
    }

    #[test]
    fn test_aligned_min() {
        assert_eq!(labels(&age_groups(20, 30)), vec!["20-24", "25-29", "30+"]);
        assert_eq!(labels(&age_groups(20, 24)), vec!["20-24"]);
    }

    #[test]
    fn test_single_age() {
        assert_eq!(labels(&age_groups(40, 40)), vec!["40-40"]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(age_groups(30, 20).is_empty());
    }

    #[test]
    fn test_buckets_partition_every_range() {
        for age_min in 13..=40 {
            for age_max in age_min..=70 {
                let buckets = age_groups(age_min, age_max);
                assert!(!buckets.is_empty());
                assert_eq!(buckets[0].min, age_min);

                for age in age_min..=age_max {
                    let hits = buckets.iter().filter(|b| b.contains(age)).count();
                    assert_eq!(hits, 1, "age {} in {}..{}", age, age_min, age_max);
                }

                for pair in buckets.windows(2) {
                    assert_eq!(pair[0].max.unwrap() + 1, pair[1].min);
                    assert_eq!(pair[1].min % 5, 0);
                }

                let last = buckets.last().unwrap();
                if age_max - age_min < 5 {
                    assert_eq!(buckets.len(), 1, "{}..{}", age_min, age_max);
                    assert_eq!(last.max, Some(age_max));
                } else {
                    assert!(buckets.len() > 1, "{}..{}", age_min, age_max);
                    assert!(last.is_open_ended());
                    assert!(last.min <= age_max);
                }
            }
        }
    }
}
