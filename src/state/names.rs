//! Random display names.

use rand::prelude::*;

/// Produces a display name for players who did not pick one.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADVERBS: [&str; 12] = [
    "Barely", "Boldly", "Calmly", "Eagerly", "Gently", "Happily", "Kindly", "Loudly", "Quickly",
    "Rarely", "Slowly", "Wildly",
];

const ADJECTIVES: [&str; 12] = [
    "Brave", "Clever", "Dizzy", "Fancy", "Fuzzy", "Grumpy", "Jolly", "Lazy", "Nimble", "Plucky",
    "Quiet", "Sleepy",
];

const ANIMALS: [&str; 12] = [
    "Badger", "Beaver", "Falcon", "Ferret", "Gecko", "Heron", "Koala", "Lemur", "Otter", "Panda",
    "Walrus", "Weasel",
];

/// Adverb + adjective + animal, e.g. `CalmlyFuzzyOtter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PetNameGenerator;

impl PetNameGenerator {
    pub fn generate_with_rng<R: Rng + ?Sized>(rng: &mut R) -> String {
        let pick = |words: &[&'static str], rng: &mut R| *words.choose(rng).unwrap_or(&"");
        let adverb = pick(&ADVERBS, rng);
        let adjective = pick(&ADJECTIVES, rng);
        let animal = pick(&ANIMALS, rng);
        format!("{}{}{}", adverb, adjective, animal)
    }
}

impl NameGenerator for PetNameGenerator {
    fn generate(&self) -> String {
        Self::generate_with_rng(&mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn test_generated_name_shape() {
        let mut rng = StdRng::seed_from_u64(5);
        let name = PetNameGenerator::generate_with_rng(&mut rng);
        assert!(ADVERBS.iter().any(|a| name.starts_with(a)));
        assert!(ANIMALS.iter().any(|a| name.ends_with(a)));
    }

    #[test]
    fn test_generator_trait() {
        let name = PetNameGenerator.generate();
        assert!(!name.is_empty());
        assert!(name.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
