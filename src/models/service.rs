use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry. Read-mostly; owned by seed data, never mutated by the
/// booking flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub description: String,
    pub icon: String,
    pub price_range: String,
}

pub fn default_catalog() -> Vec<Service> {
    let entry = |seed: u128, name: &str, category: &str, description: &str, icon: &str, price_range: &str| Service {
        id: Uuid::from_u128(seed),
        name: name.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        price_range: price_range.to_string(),
    };

    vec![
        entry(
            1,
            "Home Cleaning",
            "cleaning",
            "Full-house cleaning, kitchen and bathrooms included",
            "broom",
            "$40-$90",
        ),
        entry(
            2,
            "Plumbing",
            "repair",
            "Leaks, clogs, fixture installation",
            "wrench",
            "$60-$150",
        ),
        entry(
            3,
            "Electrical",
            "repair",
            "Wiring, outlets, light fixtures",
            "bolt",
            "$70-$180",
        ),
        entry(
            4,
            "Gardening",
            "outdoor",
            "Lawn mowing, hedge trimming, weeding",
            "leaf",
            "$35-$80",
        ),
        entry(
            5,
            "Appliance Repair",
            "repair",
            "Washers, dryers, refrigerators, ovens",
            "gear",
            "$50-$140",
        ),
    ]
}
