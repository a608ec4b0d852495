//! Random short-code generation for the Portal URL shortener.
//!
//! Codes are drawn from the OS entropy source, so two calls are
//! statistically independent and never round-trip deterministic.

use rand::rngs::OsRng;
use rand::RngCore;

const ALPHABET: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Largest multiple of the alphabet size that fits in a byte. Bytes at or
// above this value are rejected so every letter is equally likely.
const REJECT_ABOVE: u8 = (u8::MAX / 52) * 52;

/// Generates a short code of `size` letters, uniformly distributed over
/// the 52-letter English alphabet.
///
/// Never fails: short or failed entropy reads are retried until the code
/// is complete. Callers are responsible for choosing a sensible `size`
/// (the service requires at least 4).
pub fn gen_uid(size: usize) -> String {
    let mut code = String::with_capacity(size);
    let mut buf = [0u8; 64];

    while code.len() < size {
        fill_random(&mut buf);

        for &byte in &buf {
            if byte >= REJECT_ABOVE {
                continue;
            }

            code.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);

            if code.len() == size {
                break;
            }
        }
    }

    code
}

fn fill_random(buf: &mut [u8]) {
    // Transient entropy-source failures are retried, never surfaced.
    while OsRng.try_fill_bytes(buf).is_err() {}
}
