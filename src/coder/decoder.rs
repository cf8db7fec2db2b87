//! Reed-Solomon decoder.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::buffers::{bind_targets, plan_decode, ScratchArena};
use crate::coder::{CoderContext, CoderStatistics, DecodeMatrixCache};
use crate::config::CoderConfig;
use crate::error::{Error, Result};
use crate::hardware::{ComputeKind, HardwareAccelerator, HardwareStatistics};
use crate::matrix::{default_generator, GeneratorMatrix, MatrixGenerator};

#[derive(Debug)]
struct DecoderState {
    cache: DecodeMatrixCache,
    arena: ScratchArena,
}

/// Reconstructs erased blocks of a stripe from any k survivors.
///
/// A decoder caches the decode matrix of the last erasure pattern it saw and
/// a scratch area for erased blocks the caller did not ask for, so repeated
/// calls with the same pattern skip matrix inversion and allocation.
#[derive(Debug)]
pub struct ReedSolomonDecoder {
    ctx: CoderContext,
    state: Option<DecoderState>,
}

impl ReedSolomonDecoder {
    /// Creates a decoder using the process-wide matrix generator and the
    /// backend selected by `config`.
    pub fn new(config: CoderConfig) -> Result<Self> {
        Self::with_parts(config, default_generator(), None)
    }

    /// Creates a decoder driving `accelerator` instead of the configured backend.
    pub fn with_accelerator(
        config: CoderConfig,
        accelerator: Arc<dyn HardwareAccelerator>,
    ) -> Result<Self> {
        Self::with_parts(config, default_generator(), Some(accelerator))
    }

    /// Creates a decoder whose generator matrix is built by `generator`.
    pub fn with_generator(config: CoderConfig, generator: &MatrixGenerator) -> Result<Self> {
        Self::with_parts(config, generator, None)
    }

    /// Creates a decoder from explicit parts.
    pub fn with_parts(
        config: CoderConfig,
        generator: &MatrixGenerator,
        accelerator: Option<Arc<dyn HardwareAccelerator>>,
    ) -> Result<Self> {
        let ctx = CoderContext::new(config, generator, accelerator)?;
        let cache = DecodeMatrixCache::new(Arc::clone(ctx.generator()?));

        Ok(Self {
            ctx,
            state: Some(DecoderState {
                cache,
                arena: ScratchArena::new(),
            }),
        })
    }

    /// Reconstructs erased blocks.
    ///
    /// * `inputs` - k + m slots, `None` where a block is missing
    /// * `outputs` - one buffer per entry of `erasures`, in the same order
    /// * `erasures` - block ids the caller wants reconstructed
    ///
    /// Every missing input is reconstructed; those not listed in `erasures`
    /// go to internal scratch. A listed block whose input is present is left
    /// alone. All buffers must be exactly `block_size` bytes.
    pub fn decode(
        &mut self,
        inputs: &[Option<&[u8]>],
        outputs: &mut [Option<&mut [u8]>],
        erasures: &[usize],
        block_size: usize,
    ) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::Released)?;
        let result = Self::decode_stripe(&mut self.ctx, state, inputs, outputs, erasures, block_size);

        let rebuilds = state.cache.rebuild_count();
        let allocations = state.arena.allocations();
        let stats = self.ctx.stats_mut();
        stats.matrix_rebuilds = rebuilds;
        stats.scratch_allocations = allocations;
        if result.is_err() {
            stats.failed_calls += 1;
        }

        result
    }

    fn decode_stripe(
        ctx: &mut CoderContext,
        state: &mut DecoderState,
        inputs: &[Option<&[u8]>],
        outputs: &mut [Option<&mut [u8]>],
        erasures: &[usize],
        block_size: usize,
    ) -> Result<()> {
        let total = ctx.config().total_blocks();
        let correctable = ctx.config().parity_blocks();
        if erasures.len() > correctable {
            warn!(
                id = ctx.id(),
                requested = erasures.len(),
                correctable,
                "decode request exceeds parity count"
            );
            return Err(Error::UnrecoverableErasures {
                erased: erasures.len(),
                correctable,
            });
        }

        let layout = plan_decode(total, inputs, outputs, erasures, block_size)?;

        if layout.decode_erasures().is_empty() {
            trace!(id = ctx.id(), "nothing to reconstruct");
            ctx.stats_mut().skipped_calls += 1;
            return Ok(());
        }

        let DecoderState { cache, arena } = state;
        cache.prepare(layout.decode_erasures())?;

        let survivors = cache
            .survivors()
            .iter()
            .map(|&slot| inputs[slot].ok_or(Error::MissingBuffer { slot }))
            .collect::<Result<Vec<&[u8]>>>()?;

        let scratch = arena.reserve(block_size, layout.dont_care())?;
        let mut targets = bind_targets(&layout, outputs, scratch, block_size)?;

        trace!(
            id = ctx.id(),
            block_size,
            erasures = ?layout.decode_erasures(),
            dont_care = layout.dont_care(),
            "decoding stripe"
        );
        ctx.compute(
            ComputeKind::Decode,
            cache.decode_matrix(),
            &survivors,
            &mut targets,
            block_size,
        )
    }

    /// Builds and caches the decode matrix for `erasures` without decoding.
    ///
    /// Matrix columns follow the order of `erasures`.
    pub fn generate_decode_matrix(&mut self, erasures: &[usize]) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::Released)?;
        let result = state.cache.prepare(erasures);
        self.ctx.stats_mut().matrix_rebuilds = state.cache.rebuild_count();
        result
    }

    /// The cached decode matrix, k rows by one column per erasure.
    pub fn decode_matrix(&self) -> Option<&[u8]> {
        self.state
            .as_ref()
            .filter(|state| state.cache.is_current())
            .map(|state| state.cache.decode_matrix())
    }

    /// Block ids the cached decode matrix reads, in row order.
    pub fn survivors(&self) -> Option<&[usize]> {
        self.state
            .as_ref()
            .filter(|state| state.cache.is_current())
            .map(|state| state.cache.survivors())
    }

    /// Renders the cached decode matrix as text.
    pub fn dump_decode_matrix(&self) -> Option<String> {
        self.state
            .as_ref()
            .filter(|state| state.cache.is_current())
            .map(|state| state.cache.dump())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoderConfig {
        self.ctx.config()
    }

    /// Returns the context id used in logs and completion tags.
    pub fn id(&self) -> u64 {
        self.ctx.id()
    }

    /// Returns the generator matrix, unless released.
    pub fn generator_matrix(&self) -> Result<&GeneratorMatrix> {
        Ok(self.ctx.generator()?.as_ref())
    }

    /// Returns the decoder's counters.
    pub fn get_statistics(&self) -> CoderStatistics {
        self.ctx.statistics()
    }

    /// Returns the backend's counters, unless released.
    pub fn hardware_statistics(&self) -> Option<HardwareStatistics> {
        self.ctx.hardware_statistics()
    }

    /// Frees the decoder's matrices, scratch and backend. Calling it again has no effect.
    pub fn release(&mut self) {
        if let Some(mut state) = self.state.take() {
            state.cache.invalidate();
            state.arena.release();
        }
        self.ctx.release();
    }

    /// Returns true once [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.ctx.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::ReedSolomonEncoder;
    use crate::config::MatrixType;
    use crate::erasure::ErasureSet;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    struct Stripe {
        blocks: Vec<Vec<u8>>,
        k: usize,
    }

    impl Stripe {
        fn encode(config: &CoderConfig, block_size: usize, seed: u64) -> Self {
            let (k, m) = (config.data_blocks(), config.parity_blocks());
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut blocks: Vec<Vec<u8>> = (0..k)
                .map(|_| (0..block_size).map(|_| rng.random()).collect())
                .collect();
            blocks.extend(std::iter::repeat(vec![0u8; block_size]).take(m));

            let (data, coding) = blocks.split_at_mut(k);
            let inputs: Vec<Option<&[u8]>> = data.iter().map(|d| Some(d.as_slice())).collect();
            let mut outputs: Vec<Option<&mut [u8]>> =
                coding.iter_mut().map(|p| Some(p.as_mut_slice())).collect();
            ReedSolomonEncoder::new(config.clone())
                .unwrap()
                .encode(&inputs, &mut outputs, block_size)
                .unwrap();

            Self { blocks, k }
        }

        /// Decodes with `erased` missing, asking for `requested` in that order.
        fn recover(
            &self,
            decoder: &mut ReedSolomonDecoder,
            erased: &[usize],
            requested: &[usize],
        ) -> Result<Vec<Vec<u8>>> {
            let block_size = self.blocks[0].len();
            let inputs: Vec<Option<&[u8]>> = self
                .blocks
                .iter()
                .enumerate()
                .map(|(i, b)| (!erased.contains(&i)).then_some(b.as_slice()))
                .collect();
            let mut recovered = vec![vec![0u8; block_size]; requested.len()];
            let mut outputs: Vec<Option<&mut [u8]>> =
                recovered.iter_mut().map(|r| Some(r.as_mut_slice())).collect();
            decoder.decode(&inputs, &mut outputs, requested, block_size)?;
            Ok(recovered)
        }

        fn check(&self, decoder: &mut ReedSolomonDecoder, erased: &[usize]) {
            let recovered = self.recover(decoder, erased, erased).unwrap();
            for (block, &index) in recovered.iter().zip(erased) {
                assert_eq!(block, &self.blocks[index], "block {} of {:?}, k={}", index, erased, self.k);
            }
        }
    }

    #[test]
    fn test_six_three_scenario() {
        init_tracing();
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 128, 1);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        let recovered = stripe.recover(&mut decoder, &[1, 4, 7], &[1, 7, 4]).unwrap();
        assert_eq!(recovered[0], stripe.blocks[1]);
        assert_eq!(recovered[1], stripe.blocks[7]);
        assert_eq!(recovered[2], stripe.blocks[4]);
    }

    #[test]
    fn test_every_pattern_small_codes() {
        for (k, m) in [(2, 1), (3, 2), (4, 3), (5, 2)] {
            for matrix_type in [MatrixType::Vandermonde, MatrixType::Cauchy] {
                let config = CoderConfig::new(k, m).with_matrix_type(matrix_type);
                let stripe = Stripe::encode(&config, 100, (k * 10 + m) as u64);
                let mut decoder = ReedSolomonDecoder::new(config).unwrap();

                for mask in 1u32..(1 << (k + m)) {
                    if mask.count_ones() as usize > m {
                        continue;
                    }
                    let erased: Vec<usize> = (0..k + m).filter(|i| mask & (1 << i) != 0).collect();
                    stripe.check(&mut decoder, &erased);
                }
            }
        }
    }

    #[test]
    fn test_sampled_patterns_large_codes() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for (k, m) in [(10, 4), (12, 4), (8, 8), (13, 3)] {
            for matrix_type in [MatrixType::Vandermonde, MatrixType::Cauchy] {
                let config = CoderConfig::new(k, m).with_matrix_type(matrix_type);
                let stripe = Stripe::encode(&config, 200, rng.random());
                let mut decoder = ReedSolomonDecoder::new(config).unwrap();

                let mut ids: Vec<usize> = (0..k + m).collect();
                for _ in 0..40 {
                    ids.shuffle(&mut rng);
                    let count = rng.random_range(1..=m);
                    stripe.check(&mut decoder, &ids[..count]);
                }
            }
        }
    }

    #[test]
    fn test_unaligned_sizes() {
        for block_size in [1, 30, 63, 64, 65, 100, 200, 1000] {
            let config = CoderConfig::new(6, 3);
            let stripe = Stripe::encode(&config, block_size, block_size as u64);
            let mut decoder = ReedSolomonDecoder::new(config).unwrap();
            stripe.check(&mut decoder, &[0, 5, 8]);
        }
    }

    #[test]
    fn test_too_many_erasures() {
        init_tracing();
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 64, 2);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();
        assert!(matches!(
            stripe.recover(&mut decoder, &[0, 1, 2, 3], &[0, 1, 2, 3]),
            Err(Error::UnrecoverableErasures { erased: 4, correctable: 3 })
        ));
        assert_eq!(decoder.get_statistics().failed_calls, 1);

        // the decoder stays usable
        stripe.check(&mut decoder, &[0, 1, 2]);
    }

    #[test]
    fn test_too_many_requested_with_inputs_present() {
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 64, 6);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        for erased in [&[][..], &[1, 2, 3][..]] {
            let result = stripe.recover(&mut decoder, erased, &[0, 1, 2, 3]);
            assert!(matches!(
                result,
                Err(Error::UnrecoverableErasures { erased: 4, correctable: 3 })
            ));
        }

        let stats = decoder.get_statistics();
        assert_eq!(stats.failed_calls, 2);
        assert_eq!(stats.skipped_calls, 0);
        assert_eq!(stats.matrix_rebuilds, 0);
    }

    #[test]
    fn test_dont_care_slots() {
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 100, 3);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        // 2 and 6 missing but only 2 requested
        let recovered = stripe.recover(&mut decoder, &[2, 6], &[2]).unwrap();
        assert_eq!(recovered[0], stripe.blocks[2]);
        assert_eq!(decoder.get_statistics().scratch_allocations, 1);

        // same shape again reuses scratch
        stripe.recover(&mut decoder, &[2, 6], &[2]).unwrap();
        assert_eq!(decoder.get_statistics().scratch_allocations, 1);
        assert_eq!(decoder.get_statistics().matrix_rebuilds, 1);
    }

    #[test]
    fn test_requested_but_present_is_untouched() {
        let config = CoderConfig::new(4, 2);
        let stripe = Stripe::encode(&config, 64, 4);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        let recovered = stripe.recover(&mut decoder, &[1], &[1, 3]).unwrap();
        assert_eq!(recovered[0], stripe.blocks[1]);
        assert!(recovered[1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_nothing_missing_skips_compute() {
        let config = CoderConfig::new(4, 2);
        let stripe = Stripe::encode(&config, 64, 5);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        let recovered = stripe.recover(&mut decoder, &[], &[2]).unwrap();
        assert!(recovered[0].iter().all(|&b| b == 0));
        let stats = decoder.get_statistics();
        assert_eq!(stats.skipped_calls, 1);
        assert_eq!(stats.compute_calls, 0);
        assert!(decoder.decode_matrix().is_none());
    }

    #[test]
    fn test_reorder_reuses_matrix() {
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 128, 6);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        stripe.recover(&mut decoder, &[1, 4, 7], &[1, 4, 7]).unwrap();
        stripe.recover(&mut decoder, &[1, 4, 7], &[7, 4, 1]).unwrap();
        assert_eq!(decoder.get_statistics().matrix_rebuilds, 1);

        stripe.check(&mut decoder, &[1, 4, 8]);
        assert_eq!(decoder.get_statistics().matrix_rebuilds, 2);
    }

    #[test]
    fn test_generate_decode_matrix_follows_order() {
        let mut decoder = ReedSolomonDecoder::new(CoderConfig::new(6, 3)).unwrap();
        decoder.generate_decode_matrix(&[1, 4, 7]).unwrap();
        let ascending = decoder.decode_matrix().unwrap().to_vec();
        assert_eq!(decoder.survivors().unwrap(), &[0, 2, 3, 5, 6, 8]);

        decoder.generate_decode_matrix(&[7, 1, 4]).unwrap();
        let reordered = decoder.decode_matrix().unwrap();
        for j in 0..6 {
            assert_eq!(reordered[j * 3], ascending[j * 3 + 2]);
            assert_eq!(reordered[j * 3 + 1], ascending[j * 3]);
        }
        assert_eq!(decoder.get_statistics().matrix_rebuilds, 1);
        assert!(decoder.dump_decode_matrix().unwrap().lines().count() == 6);
    }

    #[test]
    fn test_failure_map_drives_decode() {
        let config = CoderConfig::new(6, 3);
        let stripe = Stripe::encode(&config, 96, 7);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();
        let set = ErasureSet::from_failed_blocks("0,0,1,0,0,0,1,0,1", 6, 3).unwrap();
        let erased: Vec<usize> = set.iter().collect();
        stripe.check(&mut decoder, &erased);
    }

    #[test]
    fn test_bad_requests() {
        let config = CoderConfig::new(4, 2);
        let stripe = Stripe::encode(&config, 64, 8);
        let mut decoder = ReedSolomonDecoder::new(config).unwrap();

        assert!(matches!(
            stripe.recover(&mut decoder, &[1], &[6]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            stripe.recover(&mut decoder, &[1, 2], &[1, 1]),
            Err(Error::InvalidInput(_))
        ));

        let inputs: Vec<Option<&[u8]>> = vec![None; 6];
        let mut out = vec![0u8; 64];
        let mut outputs = vec![Some(out.as_mut_slice())];
        assert!(decoder.decode(&inputs, &mut outputs, &[0], 64).is_err());
    }

    #[test]
    fn test_release() {
        let mut decoder = ReedSolomonDecoder::new(CoderConfig::new(4, 2)).unwrap();
        decoder.generate_decode_matrix(&[0]).unwrap();
        decoder.release();
        decoder.release();

        assert!(decoder.is_released());
        assert!(decoder.decode_matrix().is_none());
        assert!(matches!(decoder.generate_decode_matrix(&[0]), Err(Error::Released)));
        let inputs: Vec<Option<&[u8]>> = vec![None; 6];
        assert!(matches!(
            decoder.decode(&inputs, &mut [], &[], 64),
            Err(Error::Released)
        ));
    }

    #[test]
    fn test_decoders_run_concurrently() {
        let config = CoderConfig::new(10, 4);
        let stripe = Stripe::encode(&config, 300, 9);
        std::thread::scope(|s| {
            for t in 0..4usize {
                let stripe = &stripe;
                let config = config.clone();
                s.spawn(move || {
                    let mut decoder = ReedSolomonDecoder::new(config).unwrap();
                    stripe.check(&mut decoder, &[t, 10 + t]);
                });
            }
        });
    }
}
