use crate::brief::Descriptor;
use crate::keypoint::ExtractionResult;
use log::*;

/// A correspondence between a reference descriptor and a query descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index into the reference extraction result.
    pub reference: usize,
    /// Index into the query extraction result.
    pub query: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Pairs further apart than this are discarded.
    pub max_distance: u32,
    /// Only keep mutual nearest neighbors.
    pub cross_check: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_distance: 50,
            cross_check: true,
        }
    }
}

/// The nearest descriptor in `candidates` and its distance.
///
/// Ties go to the lowest index. Returns `None` only if `candidates` is empty.
fn nearest(descriptor: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .map(|candidate| descriptor.distance(candidate) as u32)
        .enumerate()
        .min_by_key(|&(_, d)| d)
}

/// Brute force Hamming matching of every query descriptor against the reference set.
///
/// Each query descriptor is paired with its nearest reference descriptor, and
/// the pair is dropped if the distance exceeds `config.max_distance`. With
/// `config.cross_check`, the pair is also dropped unless the query descriptor is
/// in turn the nearest one to that reference descriptor. The output is ordered
/// by query index.
pub fn match_descriptors(
    reference: &[Descriptor],
    query: &[Descriptor],
    config: MatchConfig,
) -> Vec<Match> {
    // Reverse nearest neighbors, only computed for reference descriptors that get chosen.
    let mut reverse: Vec<Option<usize>> = vec![None; reference.len()];
    let matches: Vec<Match> = query
        .iter()
        .enumerate()
        .filter_map(|(query_ix, descriptor)| {
            let (reference_ix, distance) = nearest(descriptor, reference)?;
            if distance > config.max_distance {
                return None;
            }
            if config.cross_check {
                let back = *reverse[reference_ix].get_or_insert_with(|| {
                    nearest(&reference[reference_ix], query)
                        .map(|(ix, _)| ix)
                        .unwrap_or(query_ix)
                });
                if back != query_ix {
                    return None;
                }
            }
            Some(Match {
                reference: reference_ix,
                query: query_ix,
                distance,
            })
        })
        .collect();
    debug!(
        "{} matches between {} reference and {} query descriptors.",
        matches.len(),
        reference.len(),
        query.len()
    );
    matches
}

/// Match two extraction results, see [`match_descriptors`].
pub fn match_features(
    reference: &ExtractionResult,
    query: &ExtractionResult,
    config: MatchConfig,
) -> Vec<Match> {
    match_descriptors(reference.descriptors(), query.descriptors(), config)
}
