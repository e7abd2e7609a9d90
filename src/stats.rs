use std::{fs::File, path::Path};

use nanorand::{Rng, WyRand};

/// Width of the digest, in bits.  Every chart's output axis has this size.
pub const DIGEST_BITS: usize = 64;

pub struct Stats {
    pub input_bit_len: usize,
    pub output_bit_len: usize,

    // The number of samples accumulated.  Or put another way, the number of
    // rounds used to generate the chart.
    pub sample_count: usize,

    // `input_bit_len * output_bit_len` long.  Each element is a count of the
    // number of bit flips for a given in/out bit pairing.
    pub avalanche_chart: Vec<u32>,

    // For every input bit, the BIC quadrants for each pair of output bits.
    pub bic_chart: Vec<[u32; 4]>,
}

impl Stats {
    pub fn new(input_bit_len: usize, do_avalanche: bool, do_bic: bool) -> Self {
        let output_bit_len = DIGEST_BITS;
        Self {
            input_bit_len,
            output_bit_len,
            sample_count: 0,
            avalanche_chart: if do_avalanche {
                vec![0; input_bit_len * output_bit_len]
            } else {
                Vec::new()
            },
            bic_chart: if do_bic {
                vec![[0; 4]; input_bit_len * output_bit_len * (output_bit_len - 1)]
            } else {
                Vec::new()
            },
        }
    }

    pub fn accumulate(&mut self, in_bit: usize, out_bit: usize, flipped: bool) {
        self.avalanche_chart[in_bit * self.output_bit_len + out_bit] += flipped as u32;
    }

    pub fn get(&self, in_bit: usize, out_bit: usize) -> u32 {
        self.avalanche_chart[in_bit * self.output_bit_len + out_bit]
    }

    pub fn get_row(&self, in_bit: usize) -> &[u32] {
        let start = in_bit * self.output_bit_len;
        let end = start + self.output_bit_len;
        &self.avalanche_chart[start..end]
    }

    pub fn row_diffusion(&self, in_bit: usize) -> f64 {
        let norm = 1.0 / self.sample_count as f64;
        self.get_row(in_bit)
            .iter()
            .map(|&flips| 1.0 - p_to_bias(flips as f64 * norm))
            .sum()
    }

    pub fn row_entropy(&self, in_bit: usize) -> f64 {
        let norm = 1.0 / self.sample_count as f64;
        self.get_row(in_bit)
            .iter()
            .map(|&flips| p_to_entropy(flips as f64 * norm))
            .sum()
    }

    /// Average number of digest bits that flip when one input bit flips.
    /// Ideal is half the digest width.
    pub fn mean_flipped_bits(&self) -> f64 {
        let total: u64 = self.avalanche_chart.iter().map(|&n| n as u64).sum();
        total as f64 / (self.sample_count * self.input_bit_len) as f64
    }

    pub fn average_bias(&self) -> f64 {
        let norm = 1.0 / self.sample_count as f64;

        let bias_sum: f64 = self
            .avalanche_chart
            .iter()
            .map(|&flips| p_to_bias(flips as f64 * norm))
            .sum();
        bias_sum / self.avalanche_chart.len() as f64
    }

    pub fn min_bias(&self) -> f64 {
        let norm = 1.0 / self.sample_count as f64;

        let mut min_bias = f64::INFINITY;
        for &flips in &self.avalanche_chart {
            let bias = p_to_bias(flips as f64 * norm);
            min_bias = min_bias.min(bias);
        }
        min_bias
    }

    pub fn max_bias(&self) -> f64 {
        let norm = 1.0 / self.sample_count as f64;

        let mut max_bias = 0.0f64;
        for &flips in &self.avalanche_chart {
            let bias = p_to_bias(flips as f64 * norm);
            max_bias = max_bias.max(bias);
        }
        max_bias
    }

    pub fn min_input_bit_diffusion(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_diffusion(i))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn avg_input_bit_diffusion(&self) -> f64 {
        let sum: f64 = (0..self.input_bit_len).map(|i| self.row_diffusion(i)).sum();
        sum / self.input_bit_len as f64
    }

    pub fn max_input_bit_diffusion(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_diffusion(i))
            .fold(0.0, f64::max)
    }

    pub fn min_input_bit_entropy(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_entropy(i))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn avg_input_bit_entropy(&self) -> f64 {
        let sum: f64 = (0..self.input_bit_len).map(|i| self.row_entropy(i)).sum();
        sum / self.input_bit_len as f64
    }

    pub fn max_input_bit_entropy(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_entropy(i))
            .fold(0.0, f64::max)
    }

    fn bic_row(&self, in_bit_idx: usize) -> &[[u32; 4]] {
        let stride = self.output_bit_len * (self.output_bit_len - 1);
        let start = in_bit_idx * stride;
        &self.bic_chart[start..(start + stride)]
    }

    pub fn row_bic_avg_deviation(&self, in_bit_idx: usize) -> f64 {
        let bic = self.bic_row(in_bit_idx);

        let mut sum = 0.0;
        for [a, b, c, d] in bic.iter() {
            let min = *a.min(b).min(c).min(d);
            let max = *a.max(b).max(c).max(d);
            if max > 0 {
                sum += (max - min) as f64 / max as f64;
            }
        }
        sum / (bic.len() * self.sample_count) as f64
    }

    pub fn min_bic_deviation(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_bic_avg_deviation(i))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn avg_bic_deviation(&self) -> f64 {
        let sum: f64 = (0..self.input_bit_len)
            .map(|i| self.row_bic_avg_deviation(i))
            .sum();
        sum / self.input_bit_len as f64
    }

    pub fn max_bic_deviation(&self) -> f64 {
        (0..self.input_bit_len)
            .map(|i| self.row_bic_avg_deviation(i))
            .fold(0.0, f64::max)
    }

    /// Per-pair quadrant counts sorted ascending, averaged over the row.  A
    /// perfectly independent pair of output bits gives `[0.25; 4]`.
    pub fn row_bic_avg_sorted_quadrants(&self, in_bit_idx: usize) -> [f64; 4] {
        let bic = self.bic_row(in_bit_idx);

        let mut sum = [0u64; 4];
        for mut quadrants in bic.iter().copied() {
            quadrants.sort_unstable();
            for (total, n) in sum.iter_mut().zip(quadrants) {
                *total += n as u64;
            }
        }

        let norm = 1.0 / (bic.len() * self.sample_count) as f64;
        sum.map(|n| n as f64 * norm)
    }

    pub fn avg_bic_sorted_quadrants(&self) -> [f64; 4] {
        let mut sum = [0.0; 4];
        for i in 0..self.input_bit_len {
            let n = self.row_bic_avg_sorted_quadrants(i);
            for (total, q) in sum.iter_mut().zip(n) {
                *total += q;
            }
        }
        sum.map(|total| total / self.input_bit_len as f64)
    }

    pub fn worst_bic_sorted_quadrants(&self) -> [f64; 4] {
        let mut worst = [999.0f64, 999.0, 999.0, 0.0];
        for i in 0..self.input_bit_len {
            let n = self.row_bic_avg_sorted_quadrants(i);
            worst[0] = worst[0].min(n[0]);
            worst[1] = worst[1].min(n[1]);
            worst[2] = worst[2].min(n[2]);
            worst[3] = worst[3].max(n[3]);
        }
        worst
    }

    pub fn best_bic_sorted_quadrants(&self) -> [f64; 4] {
        let mut best = [0.0; 4];
        for i in 0..self.input_bit_len {
            let n = self.row_bic_avg_sorted_quadrants(i);
            if n[0] > best[0] {
                best = n;
            }
        }
        best
    }

    pub fn print_report(&self) {
        if !self.avalanche_chart.is_empty() {
            println!(
                "    Bias:
        Min: {:0.2}
        Avg: {:0.2}
        Max: {:0.2}
    Mean flipped digest bits: {:0.2} of {}
    Input Bit Diffusion:
        Min: {:0.1} bits
        Avg: {:0.1} bits
        Max: {:0.1} bits
    Input Bit Diffusion Entropy:
        Min: {:0.1} bits
        Avg: {:0.1} bits
        Max: {:0.1} bits",
                self.min_bias(),
                self.average_bias(),
                self.max_bias(),
                self.mean_flipped_bits(),
                self.output_bit_len,
                self.min_input_bit_diffusion(),
                self.avg_input_bit_diffusion(),
                self.max_input_bit_diffusion(),
                self.min_input_bit_entropy(),
                self.avg_input_bit_entropy(),
                self.max_input_bit_entropy(),
            );
        }

        if !self.bic_chart.is_empty() {
            let worst = self.worst_bic_sorted_quadrants();
            let avg = self.avg_bic_sorted_quadrants();
            let best = self.best_bic_sorted_quadrants();

            println!(
                "    BIC deviation:
        Min: {:0.4}
        Avg: {:0.4}
        Max: {:0.4}
    BIC quadrants (sorted):
        Wrst: [{:0.4}, {:0.4}, {:0.4}, {:0.4}]
         Avg: [{:0.4}, {:0.4}, {:0.4}, {:0.4}]
        Best: [{:0.4}, {:0.4}, {:0.4}, {:0.4}]",
                self.min_bic_deviation(),
                self.avg_bic_deviation(),
                self.max_bic_deviation(),
                worst[0],
                worst[1],
                worst[2],
                worst[3],
                avg[0],
                avg[1],
                avg[2],
                avg[3],
                best[0],
                best[1],
                best[2],
                best[3],
            );
        }
    }

    /// Writes the avalanche chart as a greyscale image: one row per input
    /// bit, one column per digest bit, brightness is flip probability.
    pub fn write_avalanche_png<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut pixels = Vec::with_capacity(self.avalanche_chart.len() * 4);

        for flips in self.avalanche_chart.iter().copied() {
            let v = (flips as u64 * 255 / self.sample_count.max(1) as u64).min(255) as u8;
            pixels.extend_from_slice(&[v, v, v, 255]);
        }

        png_encode_mini::write_rgba_from_u8(
            &mut File::create(path.as_ref())?,
            &pixels,
            self.output_bit_len as u32,
            self.input_bit_len as u32,
        )?;

        Ok(())
    }
}

/// Computes avalanche statistics for a 64-bit hash over fixed-size inputs,
/// using a provided input generator.
///
/// - `generate_input`: function that takes a seed and generates an input block.
///   The result should be deterministic based on the seed.  Note that the seed
///   starts from zero, and simply increments each round.
/// - `hash`: the function under test.
/// - `input_size`: size of the hashed input, in bytes.
/// - `rounds`: how many test rounds to perform to produce the estimated chart.
pub fn compute_stats<F1, F2>(
    generate_input: F1,
    hash: F2,
    input_size: usize,
    rounds: usize,
    do_avalanche: bool,
    do_bic: bool,
) -> Stats
where
    F1: Fn(usize, &mut [u8]),
    F2: Fn(&[u8]) -> u64,
{
    let mut stats = Stats::new(input_size * 8, do_avalanche, do_bic);
    let out_bits = stats.output_bit_len;

    let mut input = vec![0u8; input_size];
    let mut input_tweaked = vec![0u8; input_size];

    for round in 0..rounds {
        if round % 4096 == 0 {
            tracing::debug!(round, rounds, input_size, "avalanche progress");
        }

        generate_input(round, &mut input[..]);

        let digest = hash(&input[..]);
        for in_bit_idx in 0..(input_size * 8) {
            input_tweaked.copy_from_slice(&input[..]);
            input_tweaked[in_bit_idx / 8] ^= 1 << (in_bit_idx % 8);
            let flips = digest ^ hash(&input_tweaked[..]);

            // Avalanche.
            if do_avalanche {
                for out_bit_idx in 0..out_bits {
                    let flipped = (flips >> out_bit_idx) & 1 == 1;
                    stats.accumulate(in_bit_idx, out_bit_idx, flipped);
                }
            }

            // Bit independence criterion.
            if do_bic {
                let stride = out_bits * (out_bits - 1);
                for i in 0..out_bits {
                    for j in 0..(out_bits - 1) {
                        let i_b = (i + j + 1) % out_bits;

                        let flipped_a = (flips >> i) & 1 == 1;
                        let flipped_b = (flips >> i_b) & 1 == 1;

                        let k = (in_bit_idx * stride) + (i * (out_bits - 1)) + j;
                        let quadrant = match (flipped_a, flipped_b) {
                            (true, true) => 0,
                            (false, false) => 1,
                            (true, false) => 2,
                            (false, true) => 3,
                        };
                        stats.bic_chart[k][quadrant] += 1;
                    }
                }
            }
        }

        stats.sample_count += 1;
    }

    stats
}

pub fn p_to_bias(p: f64) -> f64 {
    (p * 2.0 - 1.0).abs()
}

pub fn p_to_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        0.0
    } else {
        let q = 1.0 - p;
        -(p * p.log2()) - (q * q.log2())
    }
}

//-------------------------------------------------------------

/// Generates a random byte stream.
pub fn generate_random(seed: usize, bytes: &mut [u8]) {
    let mut rng = WyRand::new_seed(mix64(seed as u64));
    rng.fill_bytes(bytes);
}

/// Generates a byte stream with all zero bits except one.
pub fn generate_single_1_bit(index: usize, bytes: &mut [u8]) {
    let bit_idx = index % (bytes.len() * 8);
    let i = bit_idx / 8;
    let byte = 1 << (bit_idx % 8);
    bytes.fill(0);
    bytes[i] = byte;
}

/// Generates a byte stream with roughly `n` random bits set to one.
pub fn generate_n_random_bits(seed: usize, bytes: &mut [u8], n: usize) {
    let mut rng = WyRand::new_seed(mix64(seed as u64 ^ mix64(n as u64)));

    bytes.fill(0);
    for _ in 0..n {
        let n = rng.generate_range(0..(bytes.len() * 8));
        let byte_idx = n / 8;
        let byte_mask = 1 << (n % 8);
        bytes[byte_idx] |= byte_mask;
    }
}

/// Generates a byte stream with the lowest bits simply counting up as an
/// incrementing integer.  Inputs shorter than 8 bytes get the low bytes only.
pub fn generate_counting(index: usize, bytes: &mut [u8]) {
    write_low_word(index as u64, bytes);
}

/// Generates a byte stream with the lowest bits simply iterating through gray
/// codes in order.
pub fn generate_gray_code(index: usize, bytes: &mut [u8]) {
    let gray_code = index ^ (index >> 1);
    write_low_word(gray_code as u64, bytes);
}

fn write_low_word(word: u64, bytes: &mut [u8]) {
    let n = bytes.len().min(8);
    bytes[..n].copy_from_slice(&word.to_le_bytes()[..n]);
    bytes[n..].fill(0);
}

/// Generates all combinations of setting zero bits, then one bit, then two
/// bits, and so on, in that order.
pub fn generate_bit_combinations(index: usize, bytes: &mut [u8]) {
    let bit_len = bytes.len() * 8;

    // Compute the number of bits and the sub-index into that subsequence, for the
    // given index.
    let mut n = if bit_len < usize::BITS as usize {
        // Wrap to the total number of combinations if that's less than usize.
        index % (1 << bit_len)
    } else {
        index
    };
    let mut bits = 0;
    let mut combos = binomial(bit_len, bits);
    while n >= combos {
        n -= combos;
        bits += 1;
        combos = binomial(bit_len, bits);
    }

    // Generate the bits for the computed subsequence and sub-index.
    bytes.fill(0);
    let mut t = bit_len;
    while t > 0 && bits > 0 {
        let y = if t > bits { binomial(t - 1, bits) } else { 0 };

        if n >= y {
            let byte_idx = (t - 1) / 8;
            let byte_mask = 1 << ((t - 1) % 8);
            bytes[byte_idx] |= byte_mask;

            n -= y;
            bits -= 1;
        }

        t -= 1;
    }
}

/// Saturates at `usize::MAX` instead of overflowing, which is plenty for
/// indexing into the combination sequence.
const fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }

    if k == 0 {
        1
    } else if k > (n / 2) {
        binomial(n, n - k)
    } else {
        let sub = binomial(n - 1, k - 1);
        match sub.checked_mul(n) {
            Some(product) => product / k,
            None => usize::MAX,
        }
    }
}

/// 64-bit bijective bit mixer.
fn mix64(mut n: u64) -> u64 {
    // Break zero sensitivity.
    n ^= 0x7be355f7c2e736d2;

    // http://zimbry.blogspot.ch/2011/09/better-bit-mixing-improving-on.html
    // (variant "Mix13")
    n ^= n >> 30;
    n = n.wrapping_mul(0xbf58476d1ce4e5b9);
    n ^= n >> 27;
    n = n.wrapping_mul(0x94d049bb133111eb);
    n ^= n >> 31;

    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::hash64;

    #[test]
    fn bias_and_entropy() {
        assert_eq!(p_to_bias(0.5), 0.0);
        assert_eq!(p_to_bias(0.0), 1.0);
        assert_eq!(p_to_bias(1.0), 1.0);
        assert_eq!(p_to_entropy(0.0), 0.0);
        assert_eq!(p_to_entropy(1.0), 0.0);
        assert!((p_to_entropy(0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn binomial_values() {
        assert_eq!(binomial(5, 0), 1);
        assert_eq!(binomial(5, 2), 10);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(20, 10), 184756);
    }

    #[test]
    fn bit_combinations_in_popcount_order() {
        let mut bytes = [0u8; 1];
        let mut last_popcount = 0;
        let mut seen = std::collections::HashSet::new();
        for i in 0..256 {
            generate_bit_combinations(i, &mut bytes);
            let popcount = bytes[0].count_ones();
            assert!(popcount >= last_popcount);
            last_popcount = popcount;
            assert!(seen.insert(bytes[0]));
        }
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn simple_generators() {
        let mut bytes = [0xffu8; 4];
        generate_single_1_bit(9, &mut bytes);
        assert_eq!(bytes, [0, 2, 0, 0]);

        generate_counting(0x0302, &mut bytes);
        assert_eq!(bytes, [2, 3, 0, 0]);

        let mut long = [0xffu8; 12];
        generate_gray_code(3, &mut long);
        assert_eq!(long, [2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        generate_random(7, &mut a);
        generate_random(7, &mut b);
        assert_eq!(a, b);

        generate_n_random_bits(1, &mut a, 3);
        let ones: u32 = a.iter().map(|b| b.count_ones()).sum();
        assert!((1..=3).contains(&ones));
    }

    #[test]
    fn identity_has_full_bias() {
        // Copying the input straight through flips exactly one digest bit per
        // input bit.
        let identity = |bytes: &[u8]| {
            let mut word = [0u8; 8];
            word.copy_from_slice(bytes);
            u64::from_le_bytes(word)
        };
        let stats = compute_stats(generate_random, identity, 8, 16, true, false);
        assert_eq!(stats.sample_count, 16);
        assert_eq!(stats.mean_flipped_bits(), 1.0);
        assert_eq!(stats.average_bias(), 1.0);
        assert_eq!(stats.get(5, 5), 16);
        assert_eq!(stats.get(5, 6), 0);
    }

    #[test]
    fn hash64_avalanche_is_balanced() {
        for input_size in [3, 16, 40, 96] {
            let stats = compute_stats(generate_random, hash64, input_size, 64, true, false);
            let mean = stats.mean_flipped_bits();
            assert!((31.0..33.0).contains(&mean), "size {} mean {}", input_size, mean);
            assert!(stats.average_bias() < 0.2, "size {}", input_size);
        }
    }

    #[test]
    fn bic_quadrants_near_quarter() {
        let stats = compute_stats(generate_random, hash64, 8, 128, false, true);
        assert!(stats.avalanche_chart.is_empty());
        let avg = stats.avg_bic_sorted_quadrants();
        let total: f64 = avg.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(avg[0] > 0.15 && avg[3] < 0.35, "{:?}", avg);
    }

    #[test]
    fn writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let stats = compute_stats(generate_counting, hash64, 4, 8, true, false);
        stats.write_avalanche_png(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }
}
