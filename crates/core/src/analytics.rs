use crate::types::Yield;
use serde::{Deserialize, Serialize};

/// Min, max and median APY over a set of yields
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ApyStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

/// Peer statistics for a yield relative to the rest of its network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStats {
    pub median: Option<f64>,
    pub peers: Vec<f64>,
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Finite APYs of the given yields, in input order.
pub fn finite_apys(yields: &[Yield]) -> Vec<f64> {
    yields.iter().filter_map(Yield::apy).collect()
}

/// Median of a list of values; `None` when the list is empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile rank of `value` among `peers`, 0..=100.
///
/// The rank is the 1-based position of the first sorted peer greater than or
/// equal to `value`, or the peer count when every peer is smaller.
pub fn percentile(value: Option<f64>, peers: &[f64]) -> Option<u32> {
    let value = value?;
    if peers.is_empty() {
        return None;
    }
    let sorted = sorted(peers);
    let rank = sorted
        .iter()
        .position(|score| *score >= value)
        .map(|i| i + 1)
        .unwrap_or(sorted.len());
    Some((rank as f64 / sorted.len() as f64 * 100.0).round() as u32)
}

pub fn apy_stats(yields: &[Yield]) -> ApyStats {
    let apys = sorted(&finite_apys(yields));
    ApyStats {
        min: apys.first().copied(),
        max: apys.last().copied(),
        median: median(&apys),
    }
}

pub fn peer_stats(yields: &[Yield]) -> PeerStats {
    let peers = finite_apys(yields);
    PeerStats {
        median: median(&peers),
        peers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_apy(id: &str, apy: Option<f64>) -> Yield {
        Yield {
            id: id.to_string(),
            apy,
            ..Default::default()
        }
    }

    #[test]
    fn test_median_and_percentile() {
        let peers = [0.05, 0.02, 0.04];
        assert_eq!(median(&peers), Some(0.04));
        assert_eq!(percentile(Some(0.04), &peers), Some(67));
        assert_eq!(percentile(Some(0.01), &peers), Some(33));
        assert_eq!(percentile(Some(0.09), &peers), Some(100));
    }

    #[test]
    fn test_even_median_and_empty_inputs() {
        assert_eq!(median(&[0.1, 0.3]), Some(0.2));
        assert_eq!(median(&[]), None);
        assert_eq!(percentile(Some(0.1), &[]), None);
        assert_eq!(percentile(None, &[0.1]), None);
    }

    #[test]
    fn test_apy_stats_skips_missing() {
        let yields = vec![
            with_apy("a", Some(0.02)),
            with_apy("b", None),
            with_apy("c", Some(0.05)),
            with_apy("d", Some(0.04)),
            with_apy("e", Some(f64::NAN)),
        ];
        let stats = apy_stats(&yields);

        assert_eq!(stats.min, Some(0.02));
        assert_eq!(stats.max, Some(0.05));
        assert_eq!(stats.median, Some(0.04));

        let peers = peer_stats(&yields);
        assert_eq!(peers.peers, vec![0.02, 0.05, 0.04]);
        assert_eq!(peers.median, Some(0.04));
    }

    #[test]
    fn test_apy_stats_empty() {
        assert_eq!(apy_stats(&[]), ApyStats::default());
    }
}
