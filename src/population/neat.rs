use rand::Rng;
use rand::rngs::StdRng;

use crate::graph::{IdAllocator, Network};
use crate::methods::{Loss, MutationContext, Selection};
use crate::schema::{NeatConfig, Sample};

use super::species::Species;
use super::{EvolveError, FitnessSource, PendingScores, compute_scores, seed_rng};

/// Speciated evolutionary loop.
///
/// Each generation the scored population is clustered into species by
/// compatibility distance against per-species representatives. Species share
/// fitness among their members, lose their worst members, die when stale or
/// unproductive, and reproduce in proportion to their adjusted fitness.
/// Champions of large species carry over unmutated.
pub struct NeatPopulation {
    config: NeatConfig,
    ids: IdAllocator,
    rng: StdRng,
    template: Network,
    pub networks: Vec<Network>,
    species: Vec<Species>,
    generation: usize,
    best: Option<Network>,
    /// Highest fitness any generation has reached, tracked by `epoch`.
    high_score: f64,
    /// Generations without a new population-wide high score.
    stagnation: usize,
    source: Option<FitnessSource>,
}

impl NeatPopulation {
    pub fn new(config: NeatConfig) -> Result<Self, EvolveError> {
        config.validate()?;
        let mut rng = seed_rng(config.base.random_seed);
        let mut ids = IdAllocator::new();
        let template = Network::new(config.base.input_size, config.base.output_size, &mut ids, &mut rng);
        let networks = (0..config.base.population_size)
            .map(|_| template.clone())
            .collect();
        Ok(NeatPopulation {
            config,
            ids,
            rng,
            template,
            networks,
            species: Vec::new(),
            generation: 0,
            best: None,
            high_score: f64::NEG_INFINITY,
            stagnation: 0,
            source: None,
        })
    }

    pub fn set_fitness<F>(&mut self, fitness: F)
    where
        F: Fn(&mut Network) -> f64 + Send + Sync + 'static,
    {
        self.source = Some(FitnessSource::Function(Box::new(fitness)));
    }

    pub fn set_dataset(&mut self, samples: Vec<Sample>, loss: Loss) {
        self.source = Some(FitnessSource::Dataset { samples, loss });
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    pub fn best(&self) -> Option<&Network> {
        self.best.as_ref()
    }

    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    pub fn begin_scoring(&mut self) -> Result<PendingScores, EvolveError> {
        let source = self.source.as_ref().ok_or(EvolveError::MissingFitnessSource)?;
        let scores = compute_scores(
            &mut self.networks,
            source,
            self.config.base.clear_on_evaluate,
            &mut self.rng,
        )?;
        Ok(PendingScores { scores })
    }

    pub fn apply_scores(&mut self, pending: PendingScores) {
        for (net, score) in self.networks.iter_mut().zip(pending.scores) {
            net.score = Some(score);
        }
    }

    fn note_best(&mut self) -> f64 {
        let mut top_idx = 0;
        let mut top = f64::NEG_INFINITY;
        for (idx, net) in self.networks.iter().enumerate() {
            let score = net.score.unwrap_or(f64::NEG_INFINITY);
            if score > top {
                top = score;
                top_idx = idx;
            }
        }
        let improved = self
            .best
            .as_ref()
            .map_or(true, |b| top > b.score.unwrap_or(f64::NEG_INFINITY));
        if improved {
            self.best = Some(self.networks[top_idx].clone());
        }
        top
    }

    /// Assign every genome to the first species whose representative is
    /// within the distance threshold, founding new species as needed.
    fn speciate(&mut self) {
        for species in &mut self.species {
            species.members.clear();
        }
        let speciation = &self.config.speciation;
        for idx in 0..self.networks.len() {
            let net = &self.networks[idx];
            match self.species.iter().position(|s| s.matches(net, speciation)) {
                Some(pos) => self.species[pos].members.push(idx),
                None => self.species.push(Species::new(net.clone(), idx)),
            }
        }
        self.species.retain(|s| !s.members.is_empty());
    }

    fn offspring(
        networks: &[Network],
        members: &[usize],
        selection: &Selection,
        equal: bool,
        ids: &mut IdAllocator,
        rng: &mut StdRng,
    ) -> Result<Network, EvolveError> {
        let scores: Vec<f64> = members
            .iter()
            .map(|&i| networks[i].score.unwrap_or(0.0))
            .collect();
        let p1 = members[selection.select(&scores, rng)?];
        let p2 = members[selection.select(&scores, rng)?];
        Ok(Network::crossover(&networks[p1], &networks[p2], equal, ids, rng)?)
    }

    /// One full generation turnover over a scored population.
    pub fn epoch(&mut self) -> Result<(), EvolveError> {
        let unscored = self.networks.iter().filter(|n| n.score.is_none()).count();
        if unscored > 0 {
            return Err(EvolveError::UnscoredGenomes(unscored));
        }
        let top = self.note_best();
        if top > self.high_score {
            self.high_score = top;
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }

        self.speciate();
        for species in &mut self.species {
            species.update(&self.networks);
        }
        self.species
            .sort_by(|a, b| b.high_score.total_cmp(&a.high_score));

        if self.stagnation >= self.config.speciation.population_stagnation_limit {
            // population-wide stall: keep only the two best species
            log::info!(
                "population stagnant for {} generations, culling to top two species",
                self.stagnation
            );
            self.species.truncate(2);
            self.stagnation = 0;
        }

        for species in &mut self.species {
            species.cull(self.config.speciation.survivor_rate);
            species.share_fitness(&mut self.networks);
        }

        let speciation = &self.config.speciation;
        self.species.retain(|s| !s.is_stale(speciation));
        let total_adjusted: f64 = self.species.iter().map(|s| s.adjusted_sum).sum();
        let population_size = self.config.base.population_size;
        if total_adjusted > 0.0 {
            // species too weak to earn a single child die out
            self.species.retain(|s| {
                s.adjusted_sum / total_adjusted * population_size as f64 >= 1.0
            });
        }
        if self.species.is_empty() {
            return Err(EvolveError::NoSpecies);
        }

        let total_adjusted: f64 = self.species.iter().map(|s| s.adjusted_sum).sum();
        let mut next: Vec<Network> = Vec::with_capacity(population_size);
        let mut champions: Vec<usize> = Vec::new();
        for species in &self.species {
            let share = if total_adjusted > 0.0 {
                species.adjusted_sum / total_adjusted
            } else {
                1.0 / self.species.len() as f64
            };
            let mut children = (share * population_size as f64).floor() as usize;
            if children == 0 {
                continue;
            }
            if species.members.len() >= 5 {
                champions.push(next.len());
                next.push(self.networks[species.members[0]].clone());
                children -= 1;
            }
            for _ in 0..children {
                next.push(Self::offspring(
                    &self.networks,
                    &species.members,
                    &self.config.base.selection,
                    self.config.base.equal_crossover,
                    &mut self.ids,
                    &mut self.rng,
                )?);
            }
        }
        // rounding remainder comes from the best species
        while next.len() < population_size {
            next.push(Self::offspring(
                &self.networks,
                &self.species[0].members,
                &self.config.base.selection,
                self.config.base.equal_crossover,
                &mut self.ids,
                &mut self.rng,
            )?);
        }
        next.truncate(population_size);

        for species in &mut self.species {
            species.turn_over(&self.networks, &mut self.rng);
        }

        let config = &self.config.base;
        if !config.mutations.is_empty() {
            for (idx, genome) in next.iter_mut().enumerate() {
                if champions.contains(&idx) || !self.rng.gen_bool(config.mutation_rate) {
                    continue;
                }
                for _ in 0..config.mutation_amount {
                    let op = config.mutations[self.rng.gen_range(0..config.mutations.len())];
                    let mut ctx = MutationContext {
                        rng: &mut self.rng,
                        ids: &mut self.ids,
                        max_nodes: config.max_nodes.unwrap_or(usize::MAX),
                        max_connections: config.max_connections.unwrap_or(usize::MAX),
                        max_gates: config.max_gates.unwrap_or(usize::MAX),
                        activations: &config.activations,
                    };
                    op.mutate(genome, &mut ctx)?;
                }
            }
        }

        for net in &mut next {
            net.score = None;
            net.adjusted_fitness = None;
        }
        self.networks = next;
        self.generation += 1;
        Ok(())
    }

    /// Run the loop until the configured iteration count or target fitness;
    /// returns a clone of the best genome observed.
    pub fn evolve(&mut self) -> Result<Network, EvolveError> {
        if self.config.base.iterations == 0 && self.config.base.target_fitness.is_none() {
            return Err(EvolveError::NoStoppingCondition);
        }
        let mut ran = 0;
        loop {
            ran += 1;
            let pending = self.begin_scoring()?;
            self.apply_scores(pending);
            let top = self.note_best();
            log::info!(
                "generation {}: best fitness {top:.6}, {} species",
                self.generation,
                self.species.len()
            );
            if self.config.base.target_fitness.is_some_and(|t| top >= t) {
                break;
            }
            if self.config.base.iterations > 0 && ran >= self.config.base.iterations {
                break;
            }
            self.epoch()?;
        }
        Ok(self.best.clone().expect("at least one generation was scored"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> NeatConfig {
        let mut config = NeatConfig::new(2, 1);
        config.base.population_size = 20;
        config.base.random_seed = Some(23);
        config
    }

    #[test]
    fn template_population_forms_one_species() {
        let mut pop = NeatPopulation::new(base_config()).unwrap();
        for net in &mut pop.networks {
            net.score = Some(1.0);
        }
        pop.speciate();
        // identical clones all fall within the distance threshold
        assert_eq!(pop.species_count(), 1);
        assert_eq!(pop.species[0].members.len(), 20);
    }

    #[test]
    fn every_genome_lands_in_a_species() {
        let mut pop = NeatPopulation::new(base_config()).unwrap();
        for (i, net) in pop.networks.iter_mut().enumerate() {
            net.score = Some(i as f64);
        }
        // diversify, then speciate
        pop.epoch().unwrap();
        for net in &mut pop.networks {
            net.score = Some(1.0);
        }
        pop.speciate();
        let assigned: usize = pop.species.iter().map(|s| s.members.len()).sum();
        assert_eq!(assigned, 20);
    }

    #[test]
    fn epoch_keeps_population_size() {
        let mut pop = NeatPopulation::new(base_config()).unwrap();
        for (i, net) in pop.networks.iter_mut().enumerate() {
            net.score = Some(i as f64);
        }
        pop.epoch().unwrap();
        assert_eq!(pop.networks.len(), 20);
        assert_eq!(pop.generation(), 1);
        assert!(pop.networks.iter().all(|n| n.score.is_none()));
    }

    #[test]
    fn champion_of_a_large_species_survives_unmutated() {
        let mut config = base_config();
        config.base.mutation_rate = 1.0;
        config.base.mutation_amount = 3;
        let mut pop = NeatPopulation::new(config).unwrap();
        for (i, net) in pop.networks.iter_mut().enumerate() {
            net.score = Some(i as f64);
        }
        let champion_nodes = pop.networks[19].node_count();
        pop.epoch().unwrap();
        // one species of 20 members: its champion is carried over untouched
        assert!(pop.networks.iter().any(|n| n.node_count() == champion_nodes));
    }

    #[test]
    fn evolve_reaches_target_on_dataset() {
        let mut config = base_config();
        config.base.population_size = 30;
        config.base.iterations = 10;
        let mut pop = NeatPopulation::new(config).unwrap();
        let data = vec![
            Sample { input: vec![0.0, 0.0], output: vec![0.0] },
            Sample { input: vec![1.0, 1.0], output: vec![1.0] },
        ];
        pop.set_dataset(data, Loss::Mse);
        let best = pop.evolve().unwrap();
        assert!(best.score.is_some());
        assert!(pop.generation() > 0);
    }

    #[test]
    fn stagnation_counts_one_per_unimproved_generation() {
        let mut pop = NeatPopulation::new(base_config()).unwrap();
        // constant fitness: the first generation sets the high score, every
        // later one is stagnant
        for round in 0..4 {
            for net in &mut pop.networks {
                net.score = Some(1.0);
            }
            pop.epoch().unwrap();
            assert_eq!(pop.stagnation, round);
        }
        // an improvement resets the counter
        for net in &mut pop.networks {
            net.score = Some(2.0);
        }
        pop.epoch().unwrap();
        assert_eq!(pop.stagnation, 0);
    }

    #[test]
    fn stagnation_is_untouched_by_evolve_bookkeeping() {
        let mut config = base_config();
        config.base.iterations = 4;
        let mut pop = NeatPopulation::new(config).unwrap();
        pop.set_fitness(|_| 1.0);
        pop.evolve().unwrap();
        // 3 epochs ran; only generations 2 and 3 failed to improve
        assert_eq!(pop.stagnation, 2);
    }

    #[test]
    fn scoring_requires_a_source() {
        let mut pop = NeatPopulation::new(base_config()).unwrap();
        assert!(matches!(pop.begin_scoring(), Err(EvolveError::MissingFitnessSource)));
    }
}
