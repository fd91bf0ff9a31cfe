//! Random names for fixtures, networks and databases.
//!
//! Names are lowercase ASCII with underscores so they are valid as container
//! names, network names and unquoted Postgres identifiers.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "admiring", "adoring", "agitated", "amazing", "angry", "awesome", "blissful", "bold",
    "brave", "busy", "charming", "clever", "cool", "compassionate", "competent", "confident",
    "cranky", "dazzling", "determined", "distracted", "dreamy", "eager", "ecstatic", "elastic",
    "elated", "elegant", "epic", "fervent", "festive", "focused", "friendly", "frosty",
    "gallant", "gifted", "goofy", "gracious", "happy", "hardcore", "hopeful", "hungry",
    "infallible", "inspiring", "jolly", "jovial", "keen", "kind", "laughing", "loving",
    "lucid", "magical", "modest", "musing", "mystifying", "nervous", "nice", "nifty",
    "nostalgic", "objective", "optimistic", "peaceful", "pedantic", "pensive", "practical",
    "priceless", "quirky", "quizzical", "relaxed", "reverent", "romantic", "serene", "sharp",
    "silly", "sleepy", "stoic", "strange", "stupefied", "suspicious", "sweet", "tender",
    "thirsty", "trusting", "upbeat", "vibrant", "vigilant", "vigorous", "wizardly",
    "wonderful", "xenodochial", "youthful", "zealous", "zen",
];

const NOUNS: &[&str] = &[
    "agnesi", "albattani", "archimedes", "babbage", "banach", "bardeen", "bartik", "bell",
    "blackwell", "bohr", "booth", "borg", "bose", "brahmagupta", "brattain", "brown",
    "carson", "cerf", "chandrasekhar", "chaplygin", "clarke", "colden", "cori", "curie",
    "darwin", "davinci", "dijkstra", "dubinsky", "easley", "einstein", "elion", "engelbart",
    "euclid", "euler", "fermat", "fermi", "feynman", "franklin", "galileo", "gates",
    "goldberg", "goodall", "hamilton", "hawking", "heisenberg", "hodgkin", "hopper",
    "hypatia", "jackson", "jennings", "johnson", "kalam", "kepler", "khorana", "knuth",
    "lamarr", "lamport", "leakey", "lovelace", "lumiere", "mayer", "mccarthy", "meitner",
    "mendel", "minsky", "mirzakhani", "morse", "newton", "nobel", "noether", "pascal",
    "pasteur", "perlman", "pike", "poincare", "ptolemy", "ritchie", "rosalind", "shannon",
    "shockley", "sinoussi", "stallman", "swanson", "swartz", "tesla", "thompson",
    "torvalds", "turing", "varahamihira", "wescoff", "wilbur", "wiles", "williams",
    "wozniak", "wright", "yalow", "yonath",
];

const STRING_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const HEX_CHARSET: &[u8] = b"0123456789abcdef";

fn random_from(charset: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// Ten random lowercase alphanumeric characters.
pub fn generate_string() -> String {
    random_from(STRING_CHARSET, 10)
}

/// `adjective_surname_xxxxxxxx`, unique enough to never collide within a
/// test run (the 8 hex characters carry 32 bits on top of the word pair).
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{}_{}_{}", adjective, noun, random_from(HEX_CHARSET, 8))
}

/// `random_name()` behind a prefix, or the plain random name if the prefix
/// is empty.
pub fn prefixed_name(prefix: &str) -> String {
    if prefix.is_empty() {
        random_name()
    } else {
        format!("{}_{}", prefix, random_name())
    }
}
