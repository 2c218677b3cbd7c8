//! Vector-arithmetic queries such as `rei - homem + mulher`.

use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([+-])\s*").expect("operator pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Sub => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub op: Operator,
    pub word: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("expected 'word + word' or 'word - word', found a single term")]
    MissingOperator,

    #[error("missing word at term #{0}")]
    EmptyTerm(usize),
}

/// A parsed `word (+|-) word ...` expression. The first term is always
/// `Add`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub text: String,
    pub terms: Vec<Term>,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let text = input.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut terms = Vec::new();
        let mut op = Operator::Add;
        let mut last = 0;

        for caps in OPERATOR.captures_iter(&text) {
            let (Some(whole), Some(sign)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            terms.push(term(op, &text[last..whole.start()], terms.len())?);
            op = if sign.as_str() == "+" {
                Operator::Add
            } else {
                Operator::Sub
            };
            last = whole.end();
        }
        terms.push(term(op, &text[last..], terms.len())?);

        if terms.len() < 2 {
            return Err(ExpressionError::MissingOperator);
        }

        Ok(Self { text, terms })
    }

    /// Input words, lower-cased, in expression order.
    pub fn words(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.word.to_lowercase()).collect()
    }

    /// Element-wise sum/difference of the term vectors, L2-normalized.
    ///
    /// `vectors` is index-aligned with `terms` and must share one length. A
    /// zero-magnitude result is returned unnormalized.
    pub fn combine<V: AsRef<[f32]>>(&self, vectors: &[V]) -> Vec<f32> {
        let dims = vectors.first().map(|v| v.as_ref().len()).unwrap_or(0);
        let mut combined = vec![0.0f32; dims];

        for (term, vector) in self.terms.iter().zip(vectors.iter()) {
            for (acc, value) in combined.iter_mut().zip(vector.as_ref().iter()) {
                match term.op {
                    Operator::Add => *acc += value,
                    Operator::Sub => *acc -= value,
                }
            }
        }

        let magnitude = combined.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            combined.iter_mut().for_each(|x| *x /= magnitude);
        }
        combined
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

fn term(op: Operator, word: &str, position: usize) -> Result<Term, ExpressionError> {
    let word = word.trim();
    if word.is_empty() {
        return Err(ExpressionError::EmptyTerm(position + 1));
    }
    Ok(Term {
        op,
        word: word.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analogy() {
        let expr = Expression::parse("rei - homem + mulher").unwrap();
        assert_eq!(
            expr.terms,
            vec![
                Term { op: Operator::Add, word: "rei".into() },
                Term { op: Operator::Sub, word: "homem".into() },
                Term { op: Operator::Add, word: "mulher".into() },
            ]
        );
        assert_eq!(expr.words(), vec!["rei", "homem", "mulher"]);
    }

    #[test]
    fn test_parse_without_spaces_and_extra_whitespace() {
        let expr = Expression::parse("  Rei+Mulher   -\thomem ").unwrap();
        assert_eq!(expr.text, "Rei+Mulher - homem");
        assert_eq!(expr.words(), vec!["rei", "mulher", "homem"]);
    }

    #[test]
    fn test_multi_word_terms_kept() {
        let expr = Expression::parse("ser   humano + vida").unwrap();
        assert_eq!(expr.terms[0].word, "ser humano");
    }

    #[test]
    fn test_lone_word_rejected() {
        assert_eq!(
            Expression::parse("rei").unwrap_err(),
            ExpressionError::MissingOperator
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(Expression::parse("   ").unwrap_err(), ExpressionError::Empty);
    }

    #[test]
    fn test_dangling_operator_rejected() {
        assert_eq!(
            Expression::parse("rei +").unwrap_err(),
            ExpressionError::EmptyTerm(2)
        );
        assert_eq!(
            Expression::parse("- rei").unwrap_err(),
            ExpressionError::EmptyTerm(1)
        );
        assert_eq!(
            Expression::parse("rei + + mulher").unwrap_err(),
            ExpressionError::EmptyTerm(2)
        );
    }

    #[test]
    fn test_combine_normalizes() {
        let expr = Expression::parse("a + b - c").unwrap();
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let combined = expr.combine(&vectors);
        let inv = 1.0 / 3f32.sqrt();
        assert!((combined[0] - inv).abs() < 1e-6);
        assert!((combined[1] - inv).abs() < 1e-6);
        assert!((combined[2] + inv).abs() < 1e-6);
    }

    #[test]
    fn test_combine_zero_result_stays_zero() {
        let expr = Expression::parse("a - a").unwrap();
        let vectors = vec![vec![0.5, 0.5], vec![0.5, 0.5]];
        assert_eq!(expr.combine(&vectors), vec![0.0, 0.0]);
    }
}
