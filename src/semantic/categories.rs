//! Semantic category table.
//!
//! A closed, ordered list of categories used to nudge raw cosine similarity:
//! two words sharing a category get a small bonus during ranking. The table
//! is built once and shared read-only; lookups are case-insensitive exact
//! matches and the first category (in declaration order) containing a word
//! wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the implicit category for words missing from the table.
pub const GENERAL: &str = "general";

/// Weight reported for the implicit category.
pub const GENERAL_WEIGHT: f64 = 1.0;

const GENERAL_COLOR: &str = "#374151";

/// A named cluster of related words.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub name: String,

    /// Cosmetic weight, reported but not used by the ranking formula
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Display color hint for renderers
    #[serde(default = "default_color")]
    pub color: String,

    /// Canonical words
    pub words: Vec<String>,

    /// Loosely related words, matched after canonical ones
    #[serde(default)]
    pub related: Vec<String>,
}

fn default_weight() -> f64 {
    GENERAL_WEIGHT
}

fn default_color() -> String {
    GENERAL_COLOR.to_string()
}

/// Result of a category lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryMatch<'a> {
    pub name: &'a str,
    pub weight: f64,
}

impl CategoryMatch<'_> {
    pub fn is_general(&self) -> bool {
        self.name == GENERAL
    }
}

/// Per-category word counts.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub name: String,
    pub words: usize,
    pub related: usize,
    pub total: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub total_words: usize,
    pub categories: Vec<CategoryStat>,
}

/// Errors raised when building a custom table.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CategoryError {
    #[error("category name '{0}' is reserved")]
    ReservedName(String),

    #[error("duplicate category '{0}'")]
    Duplicate(String),

    #[error("category '{0}' has no words")]
    Empty(String),
}

/// Immutable category table with a precomputed word index.
#[derive(Debug, Clone)]
pub struct CategoryModel {
    categories: Vec<Category>,
    /// lower-cased word -> index into `categories` (first declaration wins)
    index: HashMap<String, usize>,
    vocabulary: Vec<String>,
}

impl CategoryModel {
    /// Build a model from an ordered category list.
    pub fn new(categories: Vec<Category>) -> Result<Self, CategoryError> {
        let mut seen_names: Vec<&str> = Vec::with_capacity(categories.len());
        for category in &categories {
            if category.name.eq_ignore_ascii_case(GENERAL) {
                return Err(CategoryError::ReservedName(category.name.clone()));
            }
            if seen_names.contains(&category.name.as_str()) {
                return Err(CategoryError::Duplicate(category.name.clone()));
            }
            if category.words.is_empty() && category.related.is_empty() {
                return Err(CategoryError::Empty(category.name.clone()));
            }
            seen_names.push(&category.name);
        }

        let mut index = HashMap::new();
        let mut vocabulary = Vec::new();

        for (idx, category) in categories.iter().enumerate() {
            for word in category.words.iter().chain(category.related.iter()) {
                let key = word.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                if !index.contains_key(&key) {
                    vocabulary.push(key.clone());
                }
                index.entry(key).or_insert(idx);
            }
        }

        Ok(Self {
            categories,
            index,
            vocabulary,
        })
    }

    /// The Portuguese table the explorer ships with.
    pub fn builtin() -> Self {
        Self::new(builtin_categories()).expect("builtin category table is well-formed")
    }

    /// Look up the category of a word.
    pub fn category_of(&self, word: &str) -> CategoryMatch<'_> {
        match self.index.get(&word.trim().to_lowercase()) {
            Some(&idx) => {
                let category = &self.categories[idx];
                CategoryMatch {
                    name: &category.name,
                    weight: category.weight,
                }
            }
            None => CategoryMatch {
                name: GENERAL,
                weight: GENERAL_WEIGHT,
            },
        }
    }

    /// Display color for a category name; unknown names get the general color.
    pub fn color_of(&self, name: &str) -> &str {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.color.as_str())
            .unwrap_or(GENERAL_COLOR)
    }

    /// Every word of every category, lower-cased and de-duplicated, in
    /// declaration order.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn stats(&self) -> CategoryStats {
        let categories: Vec<CategoryStat> = self
            .categories
            .iter()
            .map(|c| CategoryStat {
                name: c.name.clone(),
                words: c.words.len(),
                related: c.related.len(),
                total: c.words.len() + c.related.len(),
                weight: c.weight,
            })
            .collect();

        CategoryStats {
            total_words: categories.iter().map(|c| c.total).sum(),
            categories,
        }
    }
}

impl Default for CategoryModel {
    fn default() -> Self {
        Self::builtin()
    }
}

fn category(name: &str, weight: f64, color: &str, words: &[&str], related: &[&str]) -> Category {
    Category {
        name: name.to_string(),
        weight,
        color: color.to_string(),
        words: words.iter().map(|w| w.to_string()).collect(),
        related: related.iter().map(|w| w.to_string()).collect(),
    }
}

fn builtin_categories() -> Vec<Category> {
    vec![
        category(
            "realeza",
            2.0,
            "#f59e0b",
            &[
                "rei", "rainha", "príncipe", "princesa", "imperador", "imperatriz", "monarca",
                "coroa", "trono", "palácio", "reino", "império", "nobre", "duque", "duquesa",
                "conde", "condessa", "barão", "baronesa",
            ],
            &[
                "poder", "governo", "autoridade", "estado", "país", "comandar", "liderar",
                "soberano", "majestade", "real", "nobreza",
            ],
        ),
        category(
            "família",
            2.5,
            "#ef4444",
            &[
                "pai", "mãe", "filho", "filha", "irmão", "irmã", "avô", "avó", "bisavô", "bisavó",
                "tio", "tia", "primo", "prima", "marido", "esposa", "namorado", "namorada",
                "noivo", "noiva", "família", "parente", "cunhado", "cunhada", "sogro", "sogra",
            ],
            &[
                "amor", "carinho", "casa", "lar", "união", "relacionamento", "casamento",
                "parentesco", "laço", "vínculo",
            ],
        ),
        category(
            "pessoas",
            2.0,
            "#10b981",
            &[
                "homem", "mulher", "criança", "jovem", "adulto", "adulta", "idoso", "idosa",
                "bebê", "menino", "menina", "rapaz", "moça", "pessoa", "gente", "indivíduo", "ser",
                "humano", "cidadão", "cidadã",
            ],
            &[
                "vida", "sociedade", "comunidade", "população", "humanidade", "gênero", "idade",
            ],
        ),
        category(
            "profissões",
            2.0,
            "#8b5cf6",
            &[
                "médico", "médica", "doutora", "enfermeiro", "enfermeira", "professor",
                "professora", "engenheiro", "engenheira", "advogado", "advogada", "policial",
                "bombeiro", "bombeira", "dentista", "veterinário", "veterinária", "cozinheiro",
                "cozinheira", "garçom", "garçonete", "motorista", "piloto", "soldado", "artista",
                "músico", "escritor", "escritora", "jornalista", "arquiteto", "arquiteta",
                "psicólogo", "psicóloga", "farmacêutico", "farmacêutica", "contador", "contadora",
            ],
            &[
                "trabalho", "carreira", "profissão", "emprego", "salário", "ocupação", "ofício",
                "especialista",
            ],
        ),
        category(
            "emoções",
            2.5,
            "#f97316",
            &[
                "amor", "felicidade", "tristeza", "raiva", "medo", "alegria", "saudade",
                "esperança", "paz", "paixão", "ódio", "inveja", "ciúme", "carinho", "amizade",
                "bondade", "compaixão", "gratidão", "ansiedade", "nervosismo", "calma",
                "serenidade", "entusiasmo", "melancolia",
            ],
            &[
                "sentimento", "coração", "alma", "espírito", "emocional", "afeto", "humor",
                "estado",
            ],
        ),
        category(
            "objetos",
            1.5,
            "#6b7280",
            &[
                "casa", "carro", "livro", "telefone", "computador", "mesa", "cadeira", "cama",
                "sofá", "televisão", "roupa", "sapato", "relógio", "chave", "dinheiro", "porta",
                "janela", "espelho", "lâmpada", "geladeira",
            ],
            &[
                "objeto", "coisa", "item", "material", "produto", "utensílio", "ferramenta",
                "equipamento",
            ],
        ),
        category(
            "natureza",
            2.0,
            "#059669",
            &[
                "água", "fogo", "terra", "ar", "sol", "lua", "estrela", "nuvem", "chuva", "vento",
                "árvore", "flor", "planta", "animal", "cachorro", "gato", "pássaro", "peixe",
                "borboleta", "abelha", "floresta", "montanha", "rio", "mar", "oceano",
            ],
            &[
                "natural", "ambiente", "mundo", "planeta", "universo", "ecologia", "vida",
                "selvagem",
            ],
        ),
        category(
            "abstratos",
            1.8,
            "#7c3aed",
            &[
                "vida", "morte", "tempo", "espaço", "conhecimento", "sabedoria", "verdade",
                "mentira", "liberdade", "justiça", "poder", "força", "energia", "destino", "sorte",
                "futuro", "passado", "presente",
            ],
            &[
                "conceito", "ideia", "pensamento", "filosofia", "abstrato", "teoria", "princípio",
            ],
        ),
    ]
}
