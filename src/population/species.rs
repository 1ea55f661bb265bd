use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::graph::Network;
use crate::schema::SpeciationConfig;

fn score_of(net: &Network) -> f64 {
    net.score.unwrap_or(f64::NEG_INFINITY)
}

/// A cluster of compatible genomes.
///
/// Members are indexes into the population's genome vector for the current
/// generation; the representative and best genome are kept as clones so they
/// survive generation turnover.
#[derive(Debug)]
pub struct Species {
    pub representative: Network,
    pub members: Vec<usize>,
    pub best: Network,
    pub high_score: f64,
    pub stagnation: usize,
    pub adjusted_sum: f64,
}

impl Species {
    pub fn new(representative: Network, founder: usize) -> Self {
        let best = representative.clone();
        Species {
            representative,
            members: vec![founder],
            best,
            high_score: f64::NEG_INFINITY,
            stagnation: 0,
            adjusted_sum: 0.0,
        }
    }

    pub fn matches(&self, net: &Network, speciation: &SpeciationConfig) -> bool {
        self.representative
            .distance(net, speciation.c1, speciation.c2, speciation.c3)
            < speciation.distance_threshold
    }

    /// Sort members best-first and advance the stagnation counter.
    pub fn update(&mut self, networks: &[Network]) {
        self.members
            .sort_by(|&a, &b| score_of(&networks[b]).total_cmp(&score_of(&networks[a])));
        let top = score_of(&networks[self.members[0]]);
        if top > self.high_score {
            self.high_score = top;
            self.stagnation = 0;
            self.best = networks[self.members[0]].clone();
        } else {
            self.stagnation += 1;
        }
    }

    /// Drop the worst members, keeping at least one.
    pub fn cull(&mut self, survivor_rate: f64) {
        let drop = (self.members.len() as f64 * (1.0 - survivor_rate)).floor() as usize;
        let keep = (self.members.len() - drop).max(1);
        self.members.truncate(keep);
    }

    /// Fitness sharing: each member's score divided by the species size.
    /// Writes the adjusted values into the genomes and records their sum.
    pub fn share_fitness(&mut self, networks: &mut [Network]) {
        let size = self.members.len() as f64;
        let mut sum = 0.0;
        for &idx in &self.members {
            let adjusted = networks[idx].score.unwrap_or(0.0) / size;
            networks[idx].adjusted_fitness = Some(adjusted);
            sum += adjusted;
        }
        self.adjusted_sum = sum;
    }

    pub fn is_stale(&self, speciation: &SpeciationConfig) -> bool {
        self.stagnation >= speciation.species_stagnation_limit
    }

    /// Pick a random surviving member as next generation's representative
    /// and clear membership for re-speciation.
    pub fn turn_over(&mut self, networks: &[Network], rng: &mut StdRng) {
        if let Some(&idx) = self.members.choose(rng) {
            self.representative = networks[idx].clone();
        }
        self.members.clear();
        self.adjusted_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::IdAllocator;
    use rand::SeedableRng;

    fn nets(scores: &[f64]) -> Vec<Network> {
        let mut ids = IdAllocator::new();
        let mut rng = StdRng::seed_from_u64(1);
        let template = Network::new(2, 1, &mut ids, &mut rng);
        scores
            .iter()
            .map(|&s| {
                let mut n = template.clone();
                n.score = Some(s);
                n
            })
            .collect()
    }

    #[test]
    fn update_sorts_members_and_tracks_high_score() {
        let networks = nets(&[0.2, 0.9, 0.5]);
        let mut sp = Species::new(networks[0].clone(), 0);
        sp.members = vec![0, 1, 2];
        sp.update(&networks);
        assert_eq!(sp.members, vec![1, 2, 0]);
        assert_eq!(sp.high_score, 0.9);
        assert_eq!(sp.stagnation, 0);
        // same scores again: no improvement
        sp.update(&networks);
        assert_eq!(sp.stagnation, 1);
    }

    #[test]
    fn cull_keeps_survivor_fraction() {
        let networks = nets(&[4.0, 3.0, 2.0, 1.0]);
        let mut sp = Species::new(networks[0].clone(), 0);
        sp.members = vec![0, 1, 2, 3];
        sp.cull(0.5);
        assert_eq!(sp.members, vec![0, 1]);
    }

    #[test]
    fn cull_never_empties_a_species() {
        let networks = nets(&[1.0]);
        let mut sp = Species::new(networks[0].clone(), 0);
        sp.cull(0.5);
        assert_eq!(sp.members.len(), 1);
    }

    #[test]
    fn fitness_sharing_divides_by_size() {
        let mut networks = nets(&[2.0, 4.0]);
        let mut sp = Species::new(networks[0].clone(), 0);
        sp.members = vec![0, 1];
        sp.share_fitness(&mut networks);
        assert_eq!(networks[0].adjusted_fitness, Some(1.0));
        assert_eq!(networks[1].adjusted_fitness, Some(2.0));
        assert_eq!(sp.adjusted_sum, 3.0);
    }

    #[test]
    fn identical_genome_matches_its_species() {
        let networks = nets(&[1.0]);
        let sp = Species::new(networks[0].clone(), 0);
        assert!(sp.matches(&networks[0], &SpeciationConfig::default()));
    }
}
