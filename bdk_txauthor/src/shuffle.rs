//! Output position randomization.
//!
//! The change output is appended last by [`TxAuthor`](crate::TxAuthor), which would make it easy
//! to tell apart from the payments. Moving it must happen before signing since the signatures
//! commit to the output order.
use bitcoin::TxOut;
use rand::{Rng, RngCore};

/// Swaps the output at `index` with an output picked uniformly at random (`index` itself
/// included) and returns the new position of the output that was at `index`.
///
/// # Panics
///
/// If `index` is out of bounds.
pub fn randomize_output_position(
    outputs: &mut [TxOut],
    index: usize,
    rng: &mut impl RngCore,
) -> usize {
    assert!(index < outputs.len(), "output index out of bounds");
    let new_index = rng.gen_range(0..outputs.len());
    outputs.swap(index, new_index);
    new_index
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec::Vec;
    use bitcoin::Script;
    use rand::{rngs::StdRng, SeedableRng};

    fn outputs(n: u64) -> Vec<TxOut> {
        (0..n)
            .map(|value| TxOut {
                value,
                script_pubkey: Script::from(vec![value as u8]),
            })
            .collect()
    }

    #[test]
    fn single_output_stays() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut outs = outputs(1);
        assert_eq!(randomize_output_position(&mut outs, 0, &mut rng), 0);
        assert_eq!(outs, outputs(1));
    }

    #[test]
    fn swap_is_tracked() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let mut outs = outputs(5);
            let new_index = randomize_output_position(&mut outs, 4, &mut rng);
            assert_eq!(outs[new_index].value, 4);
            if new_index != 4 {
                assert_eq!(outs[4].value, new_index as u64);
            }
            let mut values = outs.iter().map(|txout| txout.value).collect::<Vec<_>>();
            values.sort();
            assert_eq!(values, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn every_position_is_reachable() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let mut outs = outputs(4);
            seen[randomize_output_position(&mut outs, 3, &mut rng)] = true;
        }
        assert_eq!(seen, [true; 4]);
    }
}
