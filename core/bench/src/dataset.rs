use algo_platform_schemas::DatasetShape;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic integer dataset of `size` elements in `[0, size * 10]`.
///
/// The same (size, shape, seed) always yields the same data.
pub fn generate_dataset(size: u64, shape: DatasetShape, seed: u64) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(seed ^ size);
    let upper = (size as i64).saturating_mul(10);
    let mut data: Vec<i64> = (0..size).map(|_| rng.gen_range(0..=upper)).collect();

    match shape {
        DatasetShape::Random => {}
        DatasetShape::Sorted => data.sort_unstable(),
        DatasetShape::NearlySorted => {
            data.sort_unstable();
            // Swap 10% of positions
            let len = data.len();
            if len > 1 {
                for _ in 0..len / 10 {
                    let i = rng.gen_range(0..len);
                    let j = rng.gen_range(0..len);
                    data.swap(i, j);
                }
            }
        }
    }

    data
}
