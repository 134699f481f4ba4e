//! Poseidon hash over the BN254 scalar field.
//!
//! Sponge construction with state width 3 (rate 2, capacity 1), an x^5
//! S-box, 8 full and 57 partial rounds. Round constants are derived from a
//! SHA-256 counter stream under a fixed domain separator; the MDS matrix is
//! a Cauchy matrix over small distinct points. The capacity element is
//! initialized with the input length, so hashes of different arities never
//! collide.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{Field, PrimeField, Zero};
use sha2::{Digest, Sha256};

use super::field::FieldElement;

const STATE_WIDTH: usize = 3;
const RATE: usize = 2;
const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;
const TOTAL_ROUNDS: usize = FULL_ROUNDS + PARTIAL_ROUNDS;

const CONSTANTS_DOMAIN: &[u8] = b"poseidon-bn254-t3-v1";

struct Parameters {
    round_constants: Vec<Fr>,
    mds: [[Fr; STATE_WIDTH]; STATE_WIDTH],
}

fn parameters() -> &'static Parameters {
    static PARAMS: OnceLock<Parameters> = OnceLock::new();
    PARAMS.get_or_init(|| Parameters {
        round_constants: generate_round_constants(),
        mds: generate_mds(),
    })
}

/// Round constants from a SHA-256 counter stream, reduced into the field.
fn generate_round_constants() -> Vec<Fr> {
    (0..TOTAL_ROUNDS * STATE_WIDTH)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(CONSTANTS_DOMAIN);
            hasher.update((i as u64).to_le_bytes());
            Fr::from_le_bytes_mod_order(&hasher.finalize())
        })
        .collect()
}

/// Cauchy matrix mds[i][j] = 1 / (x_i + y_j) with x_i = i, y_j = t + j.
/// The denominators are distinct nonzero small integers, so every entry is
/// defined and the matrix is MDS over a prime field.
fn generate_mds() -> [[Fr; STATE_WIDTH]; STATE_WIDTH] {
    let mut mds = [[Fr::zero(); STATE_WIDTH]; STATE_WIDTH];
    for (i, row) in mds.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            let denominator = Fr::from((i + STATE_WIDTH + j) as u64);
            *entry = denominator.inverse().expect("nonzero Cauchy denominator");
        }
    }
    mds
}

fn sbox(x: Fr) -> Fr {
    x.square().square() * x
}

fn apply_mds(state: &mut [Fr; STATE_WIDTH], mds: &[[Fr; STATE_WIDTH]; STATE_WIDTH]) {
    let mut next = [Fr::zero(); STATE_WIDTH];
    for (i, row) in mds.iter().enumerate() {
        for (j, entry) in row.iter().enumerate() {
            next[i] += *entry * state[j];
        }
    }
    *state = next;
}

fn permute(state: &mut [Fr; STATE_WIDTH]) {
    let params = parameters();
    let half_full = FULL_ROUNDS / 2;

    for round in 0..TOTAL_ROUNDS {
        for (i, s) in state.iter_mut().enumerate() {
            *s += params.round_constants[round * STATE_WIDTH + i];
        }

        let full = round < half_full || round >= half_full + PARTIAL_ROUNDS;
        if full {
            for s in state.iter_mut() {
                *s = sbox(*s);
            }
        } else {
            state[0] = sbox(state[0]);
        }

        apply_mds(state, &params.mds);
    }
}

/// Hash a sequence of field elements into one.
pub fn hash(inputs: &[FieldElement]) -> FieldElement {
    let mut state = [Fr::zero(); STATE_WIDTH];
    // Arity domain separation in the capacity element.
    state[STATE_WIDTH - 1] = Fr::from(inputs.len() as u64);

    if inputs.is_empty() {
        permute(&mut state);
        return FieldElement(state[0]);
    }

    for chunk in inputs.chunks(RATE) {
        for (i, element) in chunk.iter().enumerate() {
            state[i] += element.0;
        }
        permute(&mut state);
    }

    FieldElement(state[0])
}

/// Hash a pair, the common case for binding two commitments.
pub fn hash_two(a: FieldElement, b: FieldElement) -> FieldElement {
    hash(&[a, b])
}
