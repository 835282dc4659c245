use crate::types::SurvivalDataset;
use rand::Rng;

/// Draw `n` row indices uniformly with replacement from `0..n`.
pub fn bootstrap_indices<R: Rng>(n: usize, rng: &mut R) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Nonparametric bootstrap replicate: whole rows (covariates, time and status)
/// drawn with replacement, same size as the input, ids renumbered from 1.
pub fn resample<R: Rng>(data: &SurvivalDataset, rng: &mut R) -> SurvivalDataset {
    if data.is_empty() {
        return data.clone();
    }
    let rows = bootstrap_indices(data.len(), rng);
    data.select(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeding::RngStreams;
    use crate::test_fixtures::SurvivalDatasetBuilder;
    use std::collections::HashSet;

    fn row_key(data: &SurvivalDataset, i: usize) -> [u64; 6] {
        let c = &data.covariates;
        [
            c.exposure[i].to_bits(),
            c.confounder1[i].to_bits(),
            c.confounder2[i].to_bits(),
            c.mediator[i].to_bits(),
            data.event_time[i].to_bits(),
            u64::from(data.status[i]),
        ]
    }

    #[test]
    fn replicate_rows_are_copies_of_input_rows() {
        let data = SurvivalDatasetBuilder::new(2_000).seed(8).build();
        let originals: HashSet<[u64; 6]> = (0..data.len()).map(|i| row_key(&data, i)).collect();

        let replicate = resample(&data, &mut RngStreams::new(8).replicate(0));
        assert_eq!(replicate.len(), data.len());
        assert_eq!(
            replicate.covariates.id.to_vec(),
            (1..=data.len()).collect::<Vec<_>>()
        );
        for i in 0..replicate.len() {
            assert!(
                originals.contains(&row_key(&replicate, i)),
                "row {i} of the replicate does not exist in the input"
            );
        }
    }

    #[test]
    fn inclusion_fraction_is_near_one_minus_inverse_e() {
        let n = 10_000;
        let mut rng = RngStreams::new(21).replicate(3);
        let indices = bootstrap_indices(n, &mut rng);
        let mut seen = vec![false; n];
        for &i in &indices {
            seen[i] = true;
        }
        let fraction = seen.iter().filter(|&&s| s).count() as f64 / n as f64;
        let expected = 1.0 - (1.0 - 1.0 / n as f64).powi(n as i32);
        assert!((fraction - expected).abs() < 0.015, "fraction {fraction}");
        assert!((expected - 0.632).abs() < 0.001);
    }

    #[test]
    fn same_replicate_stream_gives_same_resample() {
        let data = SurvivalDatasetBuilder::new(300).build();
        let streams = RngStreams::new(4);
        let a = resample(&data, &mut streams.replicate(5));
        let b = resample(&data, &mut streams.replicate(5));
        assert_eq!(a, b);
        let c = resample(&data, &mut streams.replicate(6));
        assert_ne!(a, c);
    }
}
