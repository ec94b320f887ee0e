//! Series descriptors and the choice of the series to evaluate.

use tracing::debug;

/// Reference to one instance of a series,
/// resolved to an image by an [`ImageProvider`](crate::ImageProvider).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    /// Provider-specific identifier of the instance
    pub id: String,
    /// _Instance Number_, if known
    pub instance_number: Option<i32>,
}

impl InstanceRef {
    pub fn new(id: impl Into<String>) -> Self {
        InstanceRef {
            id: id.into(),
            instance_number: None,
        }
    }
}

/// A series of one study, with its instances in instance order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// _Series Instance UID_
    pub uid: String,
    /// _Modality_
    pub modality: String,
    /// _Series Description_
    pub description: String,
    /// _Series Number_, if known
    pub number: Option<i32>,
    /// The instances, first to last
    pub instances: Vec<InstanceRef>,
}

impl Series {
    /// The number of instances in the series.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Whether the series is a non-empty PET (`PT`) series.
    pub fn is_pet_candidate(&self) -> bool {
        self.modality.trim().eq_ignore_ascii_case("PT") && !self.instances.is_empty()
    }
}

/// Reconstruction protocols in order of preference.
const PROTOCOL_PRIORITY: [&str; 4] = ["PET-EANM1", "PET-AC-IA", "PET-AC-SF_IA", "PET-AC"];

/// Rank of series descriptions outside of the protocol table.
const UNKNOWN_PROTOCOL_RANK: usize = PROTOCOL_PRIORITY.len();

/// Priority rank of a series description, lower is preferred.
///
/// Matching is exact after trimming, ignoring ASCII case.
pub fn protocol_rank(description: &str) -> usize {
    let description = description.trim();
    PROTOCOL_PRIORITY
        .iter()
        .position(|p| p.eq_ignore_ascii_case(description))
        .unwrap_or(UNKNOWN_PROTOCOL_RANK)
}

/// Keep only the series eligible for PET evaluation,
/// preserving their order.
pub fn pet_candidates(series: impl IntoIterator<Item = Series>) -> Vec<Series> {
    series.into_iter().filter(Series::is_pet_candidate).collect()
}

/// Choose the series to evaluate among the candidates of one study.
///
/// The series with the most preferred reconstruction protocol wins,
/// then the one with more instances.
/// Remaining ties resolve to the earliest candidate.
/// Returns `None` if there are no candidates.
pub fn select_series(candidates: &[Series]) -> Option<&Series> {
    let mut best: Option<(&Series, (usize, usize))> = None;
    for series in candidates {
        let rank = protocol_rank(&series.description);
        let key = (rank, usize::MAX - series.instance_count());
        match best {
            Some((_, best_key)) if best_key <= key => {}
            _ => best = Some((series, key)),
        }
    }

    let (series, (rank, _)) = best?;
    debug!(
        "Selected series {} ({:?}, rank {}, {} instances) out of {} candidates",
        series.uid,
        series.description,
        rank,
        series.instance_count(),
        candidates.len()
    );
    Some(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn series(uid: &str, description: &str, count: usize) -> Series {
        Series {
            uid: uid.to_string(),
            modality: "PT".to_string(),
            description: description.to_string(),
            number: None,
            instances: (0..count).map(|i| InstanceRef::new(i.to_string())).collect(),
        }
    }

    #[rstest]
    #[case("PET-EANM1", 0)]
    #[case("pet-ac-ia", 1)]
    #[case("  PET-AC-SF_IA ", 2)]
    #[case("PET-AC", 3)]
    #[case("PET-AC-XYZ", 4)]
    #[case("", 4)]
    fn ranks(#[case] description: &str, #[case] rank: usize) {
        assert_eq!(protocol_rank(description), rank);
    }

    #[test]
    fn prefers_protocol_over_instance_count() {
        let candidates = [series("a", "PET-AC", 300), series("b", "PET-EANM1", 10)];
        assert_eq!(select_series(&candidates).unwrap().uid, "b");
    }

    #[test]
    fn unknown_protocols_prefer_more_instances() {
        let candidates = [series("a", "WB MAC", 5), series("b", "WB NAC", 12)];
        assert_eq!(select_series(&candidates).unwrap().uid, "b");
    }

    #[test]
    fn ties_keep_input_order() {
        let candidates = [
            series("a", "PET-AC", 12),
            series("b", "pet-ac", 12),
            series("c", "PET-AC", 11),
        ];
        assert_eq!(select_series(&candidates).unwrap().uid, "a");
    }

    #[test]
    fn no_candidates() {
        assert_eq!(select_series(&[]), None);
    }

    #[test]
    fn filters_candidates() {
        let mut ct = series("ct", "CT WB", 200);
        ct.modality = "CT".to_string();
        let empty = series("empty", "PET-EANM1", 0);
        let mut lower = series("lower", "PET-AC", 3);
        lower.modality = " pt".to_string();

        let candidates = pet_candidates(vec![ct, empty, series("pt", "PET-AC", 1), lower]);
        let uids: Vec<_> = candidates.iter().map(|s| s.uid.as_str()).collect();
        assert_eq!(uids, ["pt", "lower"]);
    }
}
