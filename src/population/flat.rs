use rand::Rng;
use rand::rngs::StdRng;

use crate::graph::{IdAllocator, Network};
use crate::methods::{Loss, MutationContext};
use crate::schema::{EvolveConfig, Sample};

use super::{EvolveError, FitnessSource, PendingScores, compute_scores, seed_rng};

/// Flat generational loop: elites survive unchanged, provenance slots are
/// refilled from the seed template, the rest are bred by selection and
/// crossover, and all non-elites mutate.
pub struct Population {
    config: EvolveConfig,
    ids: IdAllocator,
    rng: StdRng,
    template: Network,
    pub networks: Vec<Network>,
    generation: usize,
    best: Option<Network>,
    source: Option<FitnessSource>,
}

impl Population {
    pub fn new(config: EvolveConfig) -> Result<Self, EvolveError> {
        config.validate()?;
        let mut rng = seed_rng(config.random_seed);
        let mut ids = IdAllocator::new();
        let template = Network::new(config.input_size, config.output_size, &mut ids, &mut rng);
        Ok(Self::from_parts(config, template, ids, rng))
    }

    /// Seed the population from an existing genome, e.g. a deserialized or
    /// pre-trained network.
    pub fn from_template(config: EvolveConfig, template: Network) -> Result<Self, EvolveError> {
        config.validate()?;
        let rng = seed_rng(config.random_seed);
        let next = template.nodes().iter().map(|n| n.id).max().map_or(0, |m| m + 1);
        let ids = IdAllocator::starting_at(next);
        Ok(Self::from_parts(config, template, ids, rng))
    }

    fn from_parts(config: EvolveConfig, template: Network, ids: IdAllocator, rng: StdRng) -> Self {
        let networks = (0..config.population_size).map(|_| template.clone()).collect();
        Population {
            config,
            ids,
            rng,
            template,
            networks,
            generation: 0,
            best: None,
            source: None,
        }
    }

    pub fn set_fitness<F>(&mut self, fitness: F)
    where
        F: Fn(&mut Network) -> f64 + Send + Sync + 'static,
    {
        self.source = Some(FitnessSource::Function(Box::new(fitness)));
    }

    /// Score genomes by negated mean loss over `samples`.
    pub fn set_dataset(&mut self, samples: Vec<Sample>, loss: Loss) {
        self.source = Some(FitnessSource::Dataset { samples, loss });
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn best(&self) -> Option<&Network> {
        self.best.as_ref()
    }

    pub fn config(&self) -> &EvolveConfig {
        &self.config
    }

    /// Evaluate all genomes without committing the scores.
    pub fn begin_scoring(&mut self) -> Result<PendingScores, EvolveError> {
        let source = self.source.as_ref().ok_or(EvolveError::MissingFitnessSource)?;
        let scores = compute_scores(
            &mut self.networks,
            source,
            self.config.clear_on_evaluate,
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

    /// Breed the next generation from a fully scored population.
    pub fn epoch(&mut self) -> Result<(), EvolveError> {
        let unscored = self.networks.iter().filter(|n| n.score.is_none()).count();
        if unscored > 0 {
            return Err(EvolveError::UnscoredGenomes(unscored));
        }
        self.note_best();
        self.networks.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.score.unwrap_or(f64::NEG_INFINITY))
        });

        let scores: Vec<f64> = self
            .networks
            .iter()
            .map(|n| n.score.unwrap_or(0.0))
            .collect();
        let elitism = self.config.elitism;
        let breed = self.config.population_size - elitism - self.config.provenance;

        let mut next: Vec<Network> = Vec::with_capacity(self.config.population_size);
        next.extend(self.networks[..elitism].iter().cloned());
        next.extend((0..self.config.provenance).map(|_| self.template.clone()));
        for _ in 0..breed {
            let p1 = self.config.selection.select(&scores, &mut self.rng)?;
            let p2 = self.config.selection.select(&scores, &mut self.rng)?;
            let child = Network::crossover(
                &self.networks[p1],
                &self.networks[p2],
                self.config.equal_crossover,
                &mut self.ids,
                &mut self.rng,
            )?;
            next.push(child);
        }

        let config = &self.config;
        if !config.mutations.is_empty() {
            for genome in next.iter_mut().skip(elitism) {
                if !self.rng.gen_bool(config.mutation_rate) {
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

    /// Run the scoring/breeding loop until the configured iteration count or
    /// target fitness; returns a clone of the best genome observed.
    pub fn evolve(&mut self) -> Result<Network, EvolveError> {
        if self.config.iterations == 0 && self.config.target_fitness.is_none() {
            return Err(EvolveError::NoStoppingCondition);
        }
        let mut ran = 0;
        loop {
            ran += 1;
            let pending = self.begin_scoring()?;
            self.apply_scores(pending);
            let top = self.note_best();
            log::info!("generation {}: best fitness {top:.6}", self.generation);
            if self.config.target_fitness.is_some_and(|t| top >= t) {
                break;
            }
            if self.config.iterations > 0 && ran >= self.config.iterations {
                break;
            }
            self.epoch()?;
        }
        Ok(self.best.clone().expect("at least one generation was scored"))
    }
}
