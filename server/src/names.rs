use rand::seq::SliceRandom;
use rand::Rng;

pub const ADJECTIVES: &[&str] = &[
    "Happy", "Clever", "Brave", "Gentle", "Swift", "Curious", "Jolly", "Sleepy",
    "Mighty", "Witty", "Sunny", "Cosmic", "Fuzzy", "Quiet", "Bouncy", "Lucky",
    "Sparkly", "Daring", "Cheerful", "Nimble",
];

pub const ANIMALS: &[&str] = &[
    "Otter", "Panda", "Fox", "Koala", "Penguin", "Owl", "Dolphin", "Tiger",
    "Rabbit", "Hedgehog", "Falcon", "Turtle", "Llama", "Badger", "Squirrel",
    "Whale", "Lynx", "Raccoon", "Moose", "Gecko",
];

/// Random "{Adjective} {Animal}" name for anonymous feedback
pub fn generate_display_name() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Anonymous");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Visitor");
    format!("{} {}", adjective, animal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn names_come_from_the_word_lists() {
        for _ in 0..50 {
            let name = generate_display_name();
            let (adjective, animal) = name.split_once(' ').unwrap();
            assert!(ADJECTIVES.contains(&adjective));
            assert!(ANIMALS.contains(&animal));
        }
    }

    #[test]
    fn seeded_generation_is_repeatable() {
        let a = generate_with(&mut StdRng::seed_from_u64(7));
        let b = generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
