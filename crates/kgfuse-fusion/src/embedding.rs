//! Word vectors and the similarity score the linker uses.

use crate::error::{FusionError, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

const MIN_TOKEN_LEN: usize = 2;
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "in", "is", "of", "on", "or", "the", "to", "with",
];

/// Lowercased word tokens: splits on non-alphanumerics and camelCase,
/// drops very short tokens and a few function words.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    let mut flush = |current: &mut String, tokens: &mut Vec<String>| {
        if current.chars().count() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&current.as_str()) {
            tokens.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                flush(&mut current, &mut tokens);
            }
            prev_lower = c.is_lowercase();
            current.extend(c.to_lowercase());
        } else {
            if !current.is_empty() {
                flush(&mut current, &mut tokens);
            }
            prev_lower = false;
        }
    }
    if !current.is_empty() {
        flush(&mut current, &mut tokens);
    }
    tokens
}

/// Word -> vector lookup.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    fn vector(&self, word: &str) -> Option<&[f32]>;

    /// Mean of the known words' vectors; `None` when no word is known.
    fn average(&self, words: &[String]) -> Option<Vec<f32>> {
        let mut sum = vec![0.0f32; self.dim()];
        let mut n = 0usize;
        for word in words {
            if let Some(v) = self.vector(word) {
                for (acc, x) in sum.iter_mut().zip(v) {
                    *acc += x;
                }
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        let inv = 1.0 / n as f32;
        sum.iter_mut().for_each(|x| *x *= inv);
        Some(sum)
    }
}

/// In-memory word vectors read from the word2vec text format
/// (optional `count dim` header, then `word v1 v2 ...` per line).
#[derive(Debug, Clone, Default)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, word: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let word = word.into();
        if vector.len() != self.dim {
            return Err(FusionError::Config(format!(
                "vector for {word:?} has {} dimensions, expected {}",
                vector.len(),
                self.dim
            )));
        }
        self.vectors.insert(word, vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let io_err = |source| FusionError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        let mut vectors: Option<WordVectors> = None;

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values: Vec<f32> = match parts.map(str::parse::<f32>).collect() {
                Ok(values) => values,
                Err(e) => {
                    return Err(FusionError::Config(format!(
                        "{}:{}: bad vector component: {e}",
                        path.display(),
                        lineno + 1
                    )))
                }
            };
            // "count dim" header
            if lineno == 0 && values.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }
            let table = vectors.get_or_insert_with(|| WordVectors::new(values.len()));
            table.insert(word, values)?;
        }

        let vectors = vectors.unwrap_or_default();
        tracing::info!(words = vectors.len(), dim = vectors.dim, "word vectors loaded");
        Ok(vectors)
    }
}

impl Embedder for WordVectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn vector(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }
}

/// `0.5 + cos / 2`, mapping cosine similarity into `[0, 1]`.
/// A zero (or missing) vector scores 0.
pub fn cosine_score(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let cos = (dot / (na * nb)).clamp(-1.0, 1.0);
    0.5 + cos / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tokenize_splits_camel_case_and_drops_noise() {
        assert_eq!(
            tokenize("ArrayList of the hashMap-impl, v2"),
            vec!["array", "list", "hash", "map", "impl", "v2"]
        );
    }

    #[test]
    fn cosine_score_range() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert_relative_eq!(cosine_score(Some(&a), Some(&a)), 1.0);
        assert_relative_eq!(cosine_score(Some(&a), Some(&b)), 0.0);
        assert_relative_eq!(cosine_score(Some(&a), Some(&[0.0, 1.0])), 0.5);
        assert_eq!(cosine_score(Some(&[0.0, 0.0]), Some(&a)), 0.0);
        assert_eq!(cosine_score(None, Some(&a)), 0.0);
    }

    #[test]
    fn loads_text_vectors_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.txt");
        std::fs::write(&path, "2 3\nthread 1 0 0\npool 0 1 0\n").unwrap();
        let vectors = WordVectors::load(&path).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors.dim(), 3);
        let avg = vectors
            .average(&["thread".into(), "pool".into(), "unknown".into()])
            .unwrap();
        for (got, want) in avg.iter().zip([0.5f32, 0.5, 0.0]) {
            assert_relative_eq!(*got, want);
        }
        assert!(vectors.average(&["unknown".into()]).is_none());
    }

    #[test]
    fn ragged_vectors_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.txt");
        std::fs::write(&path, "thread 1 0\npool 0 1 0\n").unwrap();
        assert!(WordVectors::load(&path).is_err());
    }
}
