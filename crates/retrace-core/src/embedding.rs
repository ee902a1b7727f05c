//! Tiny hashing embedding used for low-fidelity record search
//!
//! Tokens are hashed into a fixed 16-bucket vector; list endpoints rank rows
//! by cosine distance against the query vector. This is a cheap ordering
//! helper, not semantic search.

use sha2::{Digest, Sha256};

/// Dimensionality of the hashing vector
pub const EMBEDDING_DIM: usize = 16;

/// Hash text into a normalized 16-dimensional vector
pub fn embed(text: &str) -> [f32; EMBEDDING_DIM] {
    let mut vector = [0f32; EMBEDDING_DIM];

    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let bucket = (digest[0] as usize) % EMBEDDING_DIM;
        // Second digest byte signs the contribution so antonym-free
        // hash collisions don't only accumulate
        let sign = if digest[1] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    normalize(&mut vector);
    vector
}

/// Embed every string value of a JSON object (the generic-table `data` column)
pub fn embed_record(data: &serde_json::Value) -> [f32; EMBEDDING_DIM] {
    let mut text = String::new();
    collect_strings(data, &mut text);
    embed(&text)
}

/// Cosine distance in [0, 2]; 0 means identical direction
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - (dot / (norm_a * norm_b))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn normalize(vector: &mut [f32; EMBEDDING_DIM]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                out.push_str(key);
                out.push(' ');
                collect_strings(item, out);
            }
        }
        serde_json::Value::Number(n) => {
            out.push_str(&n.to_string());
            out.push(' ');
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        assert_eq!(embed("hello world"), embed("hello world"));
    }

    #[test]
    fn test_embedding_is_normalized() {
        let vector = embed("alpha beta gamma delta");
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_identical_text_zero_distance() {
        let a = embed("observability replay worker");
        let b = embed("observability replay worker");
        assert!(cosine_distance(&a, &b).abs() < 1e-5);
    }

    #[test]
    fn test_disjoint_text_larger_distance() {
        let a = embed("queue dispatcher heartbeat");
        let same = embed("queue dispatcher heartbeat");
        let other = embed("zebra xylophone quasar");
        assert!(cosine_distance(&a, &same) < cosine_distance(&a, &other));
    }

    #[test]
    fn test_empty_text_distance_is_neutral() {
        let a = embed("");
        let b = embed("anything");
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_embed_record_walks_nested_values() {
        let record = serde_json::json!({
            "name": "Alice",
            "tags": ["admin", "ops"],
            "profile": {"city": "Oslo"}
        });
        let vector = embed_record(&record);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
