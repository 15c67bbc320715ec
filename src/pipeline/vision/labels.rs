//! Class names for the medicinal leaf classifier.
//!
//! The order matches the classifier's output indices. A JSON array of
//! strings can replace the built-in list for retrained models.

use std::path::Path;

use super::VisionError;

/// Classes of the EfficientNet-B0 model shipped with Swasth-AI, in output order.
pub const DEFAULT_CLASS_NAMES: [&str; 80] = [
    "Aloevera",
    "Amla",
    "Amruthaballi",
    "Arali",
    "Astma_weed",
    "Badipala",
    "Balloon_Vine",
    "Bamboo",
    "Beans",
    "Betel",
    "Bhrami",
    "Bringaraja",
    "Caricature",
    "Castor",
    "Catharanthus",
    "Chakte",
    "Chilly",
    "Citron lime (herelikai)",
    "Coffee",
    "Common rue(naagdalli)",
    "Coriender",
    "Curry",
    "Doddpathre",
    "Drumstick",
    "Ekka",
    "Eucalyptus",
    "Ganigale",
    "Ganike",
    "Gasagase",
    "Ginger",
    "Globe Amarnath",
    "Guava",
    "Henna",
    "Hibiscus",
    "Honge",
    "Insulin",
    "Jackfruit",
    "Jasmine",
    "Kambajala",
    "Kasambruga",
    "Kohlrabi",
    "Lantana",
    "Lemon",
    "Lemongrass",
    "Malabar_Nut",
    "Malabar_Spinach",
    "Mango",
    "Marigold",
    "Mint",
    "Neem",
    "Nelavembu",
    "Nerale",
    "Nooni",
    "Onion",
    "Padri",
    "Palak(Spinach)",
    "Papaya",
    "Parijatha",
    "Pea",
    "Pepper",
    "Pomoegranate",
    "Pumpkin",
    "Raddish",
    "Rose",
    "Sampige",
    "Sapota",
    "Seethaashoka",
    "Seethapala",
    "Spinach1",
    "Tamarind",
    "Taro",
    "Tecoma",
    "Thumbe",
    "Tomato",
    "Tulsi",
    "Turmeric",
    "ashoka",
    "camphor",
    "kamakasturi",
    "kepala",
];

/// Built-in class names as owned strings.
pub fn default_labels() -> Vec<String> {
    DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Load class names from `path`, or the built-in list when `None`.
pub fn load_labels(path: Option<&Path>) -> Result<Vec<String>, VisionError> {
    let Some(path) = path else {
        return Ok(default_labels());
    };

    let raw = std::fs::read_to_string(path)?;
    let labels: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| VisionError::Labels(format!("{}: {e}", path.display())))?;

    if labels.is_empty() {
        return Err(VisionError::Labels(format!("{}: no labels", path.display())));
    }
    if labels.iter().any(|l| l.trim().is_empty()) {
        return Err(VisionError::Labels(format!(
            "{}: blank label entry",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), count = labels.len(), "Loaded class labels");
    Ok(labels)
}
