//! Human-readable Drone names
//!
//! Names look like `brave-lovelace`: lowercase, hyphen-separated, valid as
//! record names. Names already taken in the namespace are skipped.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

const ADJECTIVES: &[&str] = &[
    "agile", "amber", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "daring",
    "eager", "fierce", "gentle", "golden", "happy", "hardy", "humble", "jolly", "keen", "lively",
    "lucid", "merry", "nimble", "noble", "polar", "proud", "quick", "quiet", "rapid", "serene",
    "sharp", "silent", "sleek", "solar", "steady", "swift", "tidy", "vivid", "wise", "zealous",
];

const SURNAMES: &[&str] = &[
    "babbage", "bohr", "curie", "darwin", "dijkstra", "einstein", "euler", "faraday", "fermi",
    "feynman", "galileo", "gauss", "goodall", "hamilton", "hawking", "hopper", "hypatia",
    "johnson", "kepler", "knuth", "lamarr", "lovelace", "maxwell", "meitner", "mendel", "newton",
    "noether", "pascal", "pasteur", "planck", "raman", "ritchie", "sagan", "shannon", "tesla",
    "thompson", "torvalds", "turing", "volta", "wozniak",
];

/// Random draws tried before falling back to a numeric suffix
const MAX_ATTEMPTS: usize = 16;

/// Draw one `adjective-surname` pair
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("eager");
    let surname = SURNAMES.choose(rng).copied().unwrap_or("turing");
    format!("{}-{}", adjective, surname)
}

/// Generate a name not present in `taken`
pub fn unique_name<R: Rng + ?Sized>(rng: &mut R, taken: &BTreeSet<String>) -> String {
    let mut candidate = random_name(rng);
    for _ in 1..MAX_ATTEMPTS {
        if !taken.contains(&candidate) {
            return candidate;
        }
        candidate = random_name(rng);
    }
    if !taken.contains(&candidate) {
        return candidate;
    }

    (2u32..)
        .map(|n| format!("{}-{}", candidate, n))
        .find(|name| !taken.contains(name))
        .unwrap_or(candidate)
}
