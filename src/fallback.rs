//! Hand-written scripts and search terms used whenever a local model is
//! missing or produces nothing usable.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    CabinInWoods,
    Lake,
    Nature,
    Generic,
}

impl Topic {
    pub fn classify(subject: &str) -> Self {
        let s = subject.to_lowercase();
        let woodsy = s.contains("woods") || s.contains("forest");
        if s.contains("cabin") && woodsy {
            Topic::CabinInWoods
        } else if s.contains("lake") {
            Topic::Lake
        } else if s.contains("nature") || woodsy {
            Topic::Nature
        } else {
            Topic::Generic
        }
    }

    fn paragraphs(self, subject: &str) -> Vec<String> {
        match self {
            Topic::CabinInWoods => vec![
                "Nestled deep in the heart of the forest, a rustic cabin stands as a testament to simplicity and tranquility. The wooden structure, weathered by time and elements, tells stories of countless seasons and the peaceful solitude it has witnessed.".to_string(),
                "Surrounded by towering trees and the gentle sounds of nature, this cabin offers a perfect escape from the hustle and bustle of modern life. The crackling fireplace and cozy interior create an atmosphere of warmth and comfort.".to_string(),
                "Whether you're seeking a quiet retreat or an adventure in the wilderness, this cabin in the woods provides the perfect backdrop for unforgettable memories and moments of reflection.".to_string(),
            ],
            Topic::Lake => vec![
                "The serene waters of the lake reflect the beauty of the surrounding landscape, creating a mirror-like surface that captures the essence of tranquility. Gentle ripples dance across the surface as the wind whispers through the trees.".to_string(),
                "This peaceful body of water serves as a sanctuary for wildlife and a source of inspiration for those who visit its shores. The lake's crystal-clear waters invite exploration and offer a perfect setting for relaxation and contemplation.".to_string(),
                "Whether you're fishing, swimming, or simply enjoying the view, the lake provides endless opportunities for connection with nature and moments of peaceful reflection.".to_string(),
            ],
            Topic::Nature => vec![
                "Nature's beauty unfolds in every direction, from the majestic trees reaching toward the sky to the delicate wildflowers carpeting the forest floor. The symphony of birdsong and rustling leaves creates a peaceful soundtrack to this natural wonderland.".to_string(),
                "The forest ecosystem thrives with incredible biodiversity, where each plant and animal plays a vital role in maintaining the delicate balance of life. From the smallest insects to the largest trees, every element contributes to this thriving natural community.".to_string(),
                "Exploring these natural spaces offers not just physical exercise, but also mental rejuvenation and a deeper connection to the world around us. The forest provides a sanctuary for both wildlife and human visitors seeking solace in nature's embrace.".to_string(),
            ],
            Topic::Generic => vec![
                format!("Today we're exploring the fascinating world of {subject}. This topic offers incredible insights and opportunities for discovery that many people overlook in their daily lives."),
                format!("The key aspects of {subject} reveal a complex and interesting subject that deserves our attention and understanding. There's so much to learn and appreciate about this topic."),
                format!("Understanding {subject} better can open doors to new perspectives and opportunities. It's a subject that continues to evolve and surprise us with its depth and complexity."),
            ],
        }
    }

    fn specific_terms(self) -> &'static [&'static str] {
        match self {
            Topic::CabinInWoods => &[
                "rustic cabin", "forest cabin", "wooden cabin", "mountain cabin", "wilderness cabin",
                "cozy cabin", "log cabin", "cabin interior", "cabin exterior", "cabin fireplace",
                "forest path", "woodland trail", "tree canopy", "forest floor", "wildlife",
                "bird watching", "hiking trail", "nature walk", "forest stream", "mountain view",
            ],
            Topic::Lake => &[
                "lake view", "water reflection", "serene lake", "peaceful water", "lake shore",
                "water ripples", "lake fishing", "water activities", "lake sunset", "water wildlife",
                "lake cabin", "waterfront", "lake house", "water sports", "lake nature",
            ],
            Topic::Nature => &[
                "forest path", "woodland trail", "tree canopy", "forest floor", "wildlife",
                "bird watching", "hiking trail", "nature walk", "forest stream", "mountain view",
                "outdoor adventure", "nature exploration", "forest wildlife", "woodland scenery",
                "nature photography",
            ],
            Topic::Generic => &[
                "outdoor", "scenic", "beautiful", "peaceful", "landscape", "wilderness", "adventure",
                "exploration", "serene", "tranquil", "natural", "picturesque", "stunning",
                "breathtaking", "majestic",
            ],
        }
    }
}

const GENERIC_TERMS: &[&str] = &[
    "nature", "outdoor", "scenic", "beautiful", "peaceful", "landscape", "forest", "wilderness",
    "adventure", "exploration",
];

const MAX_TERM_WORDS: usize = 3;

/// The first `paragraph_number` template paragraphs for the subject, blank-line separated.
pub fn fallback_script(subject: &str, paragraph_number: usize) -> String {
    Topic::classify(subject)
        .paragraphs(subject)
        .into_iter()
        .take(paragraph_number)
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

pub fn fallback_terms(subject: &str, amount: usize) -> Vec<String> {
    let topic = Topic::classify(subject);
    let mut candidates = vec![subject.to_lowercase()];

    let extra = topic.specific_terms().iter().chain(GENERIC_TERMS.iter());
    for term in extra {
        if candidates.len() >= amount {
            break;
        }
        if !candidates.iter().any(|c| c.eq_ignore_ascii_case(term)) {
            candidates.push(term.to_string());
        }
    }

    clean_terms(candidates, amount)
}

/// Trims, lowercases, drops empty and over-long terms and duplicates, and caps at `amount`.
pub fn clean_terms<I, S>(terms: I, amount: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for term in terms {
        if out.len() >= amount {
            break;
        }
        let term = term.as_ref().trim().to_lowercase();
        if term.is_empty() || term.split_whitespace().count() > MAX_TERM_WORDS {
            continue;
        }
        if !out.contains(&term) {
            out.push(term);
        }
    }
    out
}
