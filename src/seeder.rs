//! Seed Scheduler
//!
//! Keeps an otherwise-idle map visually alive by synthesizing plausible
//! bubbles from a static corpus and injecting them through the same submit
//! path real viewers use (cooldown bypassed, broadcast normally). Batches
//! get jittered positions and staggered TTLs so repeated seeding neither
//! stacks bubbles nor expires them all at once.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::bubble::{BubbleInput, BubbleKind, CoordMode};
use crate::config::SeedConfig;
use crate::fanout::Hub;
use crate::metrics;

/// name, text, x, y, kind
type Template = (&'static str, &'static str, f64, f64, &'static str);

pub const CORPUS: &[Template] = &[
    ("Mira", "anyone else watching the sunset from here?", 48.8566, 2.3522, "speech"),
    ("Jonas", "best coffee of my life, no contest", 52.5200, 13.4050, "speech"),
    ("Aiko", "the trains really do run on time", 35.6762, 139.6503, "thought"),
    ("Tom", "got completely lost and found a tiny bookshop", 51.5074, -0.1278, "speech"),
    ("Lena", "it is SO cold but so worth it", 59.9139, 10.7522, "speech"),
    ("Marco", "grandma's pasta still wins", 41.9028, 12.4964, "speech"),
    ("Sofia", "street musicians on every corner tonight", 40.4168, -3.7038, "speech"),
    ("Noah", "wondering if I should just move here", 40.7128, -74.0060, "thought"),
    ("Zara", "the spice market smells incredible", 41.0082, 28.9784, "speech"),
    ("Felix", "saw a whale from the ferry!!", -33.8688, 151.2093, "speech"),
    ("Ines", "pastéis de nata count as breakfast, right?", 38.7223, -9.1393, "thought"),
    ("Ravi", "monsoon rain on a tin roof, nothing better", 19.0760, 72.8777, "speech"),
    ("Elsa", "northern lights forecast says tonight!", 64.1466, -21.9426, "speech"),
    ("Omar", "rooftop view of the whole old city", 30.0444, 31.2357, "speech"),
    ("Hana", "cherry blossoms two weeks early this year", 37.5665, 126.9780, "speech"),
    ("Diego", "tango in the square until 2am", -34.6037, -58.3816, "speech"),
    ("Maya", "is it weird to plan a trip around food?", 13.7563, 100.5018, "thought"),
    ("Erik", "biked the whole harbor loop today", 55.6761, 12.5683, "speech"),
    ("Ana", "carnival drums you can feel in your chest", -22.9068, -43.1729, "speech"),
    ("Kofi", "sunset over the gulf is unreal", 5.6037, -0.1870, "speech"),
    ("June", "rain again. still the prettiest city", 47.6062, -122.3321, "thought"),
    ("Pavel", "the metro stations here are palaces", 55.7558, 37.6173, "speech"),
];

pub struct SeedScheduler {
    hub: Arc<Hub>,
    config: SeedConfig,
}

impl SeedScheduler {
    pub fn new(hub: Arc<Hub>, config: SeedConfig) -> Self {
        Self { hub, config }
    }

    /// Long-running task: an initial fill when the map starts sparse, then
    /// periodic top-ups whenever the live count dips below the low-water
    /// mark.
    pub async fn run(self) {
        if !self.config.enabled {
            tracing::info!("seed scheduler disabled");
            return;
        }

        match self.hub.service().live_count().await {
            Ok(live) if live < self.config.low_water => {
                tracing::info!(live, batch = self.config.initial_batch, "initial seed fill");
                self.inject_batch(self.config.initial_batch).await;
            }
            Ok(live) => {
                tracing::info!(live, "map already populated, skipping initial seed");
            }
            Err(e) => tracing::warn!(error = %e, "initial live count failed"),
        }

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            interval.tick().await;
            self.topup_if_sparse().await;
        }
    }

    /// One timer round: inject a top-up batch only when the live count sits
    /// below the low-water mark, sized to land back above it. Returns the
    /// number of bubbles injected (0 when the map was populated enough).
    pub async fn topup_if_sparse(&self) -> usize {
        let live = match self.hub.service().live_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "live count failed, skipping seed round");
                return 0;
            }
        };
        if live >= self.config.low_water {
            return 0;
        }
        let count = {
            let mut rng = rand::rng();
            rng.random_range(self.config.topup_min..=self.config.topup_max)
        }
        .max(self.config.low_water - live);
        tracing::info!(live, count, "seed top-up");
        self.inject_batch(count).await
    }

    /// Inject up to `count` bubbles sampled without replacement from the
    /// corpus. Returns the number accepted.
    pub async fn inject_batch(&self, count: usize) -> usize {
        let coord_mode = self.hub.service().config().coord_mode;
        let plan = plan_batch(count, coord_mode, &self.config);

        let mut injected = 0usize;
        for (input, ttl) in plan {
            match self.hub.submit_seed(&input, ttl).await {
                Ok(_) => injected += 1,
                Err(e) => tracing::warn!(error = %e, "seed submission rejected"),
            }
        }
        if injected > 0 {
            metrics::SEED_BATCHES.inc();
        }
        tracing::debug!(injected, "seed batch done");
        injected
    }
}

/// Build the randomized batch up front so no RNG state lives across await
/// points.
pub fn plan_batch(
    count: usize,
    coord_mode: CoordMode,
    config: &SeedConfig,
) -> Vec<(BubbleInput, Duration)> {
    let mut rng = rand::rng();
    let jitter_span = match coord_mode {
        CoordMode::Geographic => 0.35,
        CoordMode::Canvas { .. } => 20.0,
    };
    let ttl_min = config.ttl_min.as_secs();
    let ttl_max = config.ttl_max.as_secs().max(ttl_min);

    CORPUS
        .choose_multiple(&mut rng, count)
        .map(|&(name, text, x, y, kind)| {
            let (x, y) = coord_mode.clamp(
                x + rng.random_range(-jitter_span..=jitter_span),
                y + rng.random_range(-jitter_span..=jitter_span),
            );
            let input = BubbleInput {
                name: Some(name.to_string()),
                text: Some(text.to_string()),
                x: Some(x),
                y: Some(y),
                kind: Some(BubbleKind::coerce(kind)),
            };
            let ttl = Duration::from_secs(rng.random_range(ttl_min..=ttl_max));
            (input, ttl)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedConfig;

    #[test]
    fn test_plan_batch_samples_without_replacement() {
        let config = SeedConfig::default();
        let plan = plan_batch(10, CoordMode::Geographic, &config);
        assert_eq!(plan.len(), 10);

        let names: std::collections::HashSet<_> =
            plan.iter().map(|(i, _)| i.name.clone().unwrap()).collect();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_plan_batch_caps_at_corpus_size() {
        let config = SeedConfig::default();
        let plan = plan_batch(500, CoordMode::Geographic, &config);
        assert_eq!(plan.len(), CORPUS.len());
    }

    #[test]
    fn test_planned_seeds_stay_in_bounds_with_staggered_ttls() {
        let config = SeedConfig::default();
        let mode = CoordMode::Geographic;
        for (input, ttl) in plan_batch(CORPUS.len(), mode, &config) {
            assert!(mode.contains(input.x.unwrap(), input.y.unwrap()));
            assert!(ttl >= config.ttl_min);
            assert!(ttl <= config.ttl_max);
        }
    }
}
