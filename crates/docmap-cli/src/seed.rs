//! Mock persons and stories

use bson::{doc, Document as BsonDocument};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "Amy", "Brian", "Carol", "Daniel", "Elizabeth", "Frank", "Grace", "Helen", "Jason", "Karen",
    "Linda", "Mark", "Nancy", "Paul", "Ruth", "Steven", "Thomas", "Sharon",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Clark", "Davis", "Garcia", "Harris", "Jackson", "Lewis", "Martin",
    "Moore", "Robinson", "Taylor", "Thompson", "Walker", "White", "Young",
];

const GENDERS: &[&str] = &["male", "female", "middle"];

pub struct Seeder {
    rng: StdRng,
}

impl Seeder {
    /// Seeded generator; a random seed is drawn when none is given
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        tracing::debug!(seed, "Mock data seed");
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, items: &[&'static str]) -> &'static str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    fn digits(&mut self, n: usize) -> String {
        (0..n)
            .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
            .collect()
    }

    pub fn person(&mut self) -> BsonDocument {
        let name = format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES));
        let tel = format!("{}-{}-{}", self.digits(3), self.digits(3), self.digits(4));
        doc! {
            "name": name,
            "age": self.rng.gen_range(60..=100i32),
            "gender": self.pick(GENDERS),
            "contacts": {
                "wx": self.digits(9),
                "tel": tel,
            },
        }
    }

    /// Story with a lowercase word as title
    pub fn story(&mut self) -> BsonDocument {
        let len = self.rng.gen_range(3..=10usize);
        let title: String = (0..len)
            .map(|_| char::from(b'a' + self.rng.gen_range(0..26u8)))
            .collect();
        doc! { "title": title }
    }

    pub fn persons(&mut self, count: usize) -> Vec<BsonDocument> {
        (0..count).map(|_| self.person()).collect()
    }

    pub fn stories(&mut self, count: usize) -> Vec<BsonDocument> {
        (0..count).map(|_| self.story()).collect()
    }
}
