use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single quiz question. `answer` holds option letters, comma-separated
/// for multi-select questions (e.g. `"A,B,D"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub is_multi: bool,
}

/// What a client gets to see of a question: everything but the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    pub is_multi: bool,
}

impl Question {
    fn new(prompt: &str, options: [&str; 4], answer: &str, is_multi: bool) -> Self {
        Self {
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer: answer.to_string(),
            is_multi,
        }
    }

    pub fn view(&self) -> QuestionView {
        QuestionView {
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            is_multi: self.is_multi,
        }
    }

    /// Grade a submitted answer. Letter order, case and whitespace are ignored;
    /// every comma-separated token must be a single option letter.
    pub fn accepts(&self, submitted: &str) -> bool {
        match (letters(&self.answer), letters(submitted)) {
            (Some(expected), Some(given)) => !expected.is_empty() && given == expected,
            _ => false,
        }
    }
}

/// The set of option letters in `raw`, or `None` if any token is not exactly
/// one ASCII letter.
fn letters(raw: &str) -> Option<BTreeSet<char>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
                _ => None,
            }
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question bank is empty")]
    Empty,
}

/// The fixed, ordered question sequence every match walks through.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }
        Ok(Self { questions })
    }

    /// Load a JSON array of questions from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        let questions: Vec<Question> = serde_json::from_str(&raw)?;
        Self::new(questions)
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self {
            questions: vec![
                Question::new("1 + 1 =", ["1", "2", "3", "4"], "B", false),
                Question::new("2 + 2 =", ["3", "4", "5", "6"], "B", false),
                Question::new("3 + 3 =", ["5", "6", "7", "8"], "B", false),
                Question::new(
                    "What is the capital of China?",
                    ["Shanghai", "Beijing", "Guangzhou", "Shenzhen"],
                    "B",
                    false,
                ),
                Question::new(
                    "Which direction does the sun rise in?",
                    ["West", "East", "South", "North"],
                    "B",
                    false,
                ),
                Question::new(
                    "How many hydrogen atoms are in a water molecule?",
                    ["1", "2", "3", "4"],
                    "B",
                    false,
                ),
                Question::new(
                    "Which of these is a fruit?",
                    ["Car", "Apple", "Table", "Television"],
                    "B",
                    false,
                ),
                Question::new(
                    "How many minutes are in an hour?",
                    ["30", "60", "90", "120"],
                    "B",
                    false,
                ),
                Question::new("How many ears does a rabbit have?", ["1", "2", "3", "4"], "B", false),
                Question::new(
                    "What color is the sky?",
                    ["Red", "Blue", "Green", "Yellow"],
                    "B",
                    false,
                ),
                Question::new(
                    "Which of these is an animal?",
                    ["Stone", "Dog", "Chair", "Book"],
                    "B",
                    false,
                ),
                Question::new("What is 2 x 3?", ["5", "6", "7", "8"], "B", false),
                Question::new("How many seasons are in a year?", ["2", "3", "4", "5"], "C", false),
                Question::new(
                    "Which of these is a vegetable?",
                    ["Banana", "Apple", "Carrot", "Grape"],
                    "C",
                    false,
                ),
                Question::new("How many fingers does a person have?", ["5", "10", "15", "20"], "B", false),
                Question::new(
                    "Which of these are fruits?",
                    ["Apple", "Banana", "Carrot", "Grape"],
                    "A,B,D",
                    true,
                ),
                Question::new(
                    "Which of these are animals?",
                    ["Dog", "Cat", "Table", "Bird"],
                    "A,B,D",
                    true,
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bank_has_single_and_multi_questions() {
        let bank = QuestionBank::default();
        assert_eq!(bank.len(), 17);
        assert!(bank.get(0).is_some_and(|q| !q.is_multi));
        assert!(bank.get(16).is_some_and(|q| q.is_multi));
        assert!(bank.get(17).is_none());
    }

    #[test]
    fn empty_bank_is_rejected() {
        assert!(matches!(QuestionBank::new(Vec::new()), Err(BankError::Empty)));
    }

    #[test]
    fn single_answer_grading() {
        let bank = QuestionBank::default();
        let q = bank.get(0).unwrap();
        assert!(q.accepts("B"));
        assert!(q.accepts(" b "));
        assert!(!q.accepts("A"));
        assert!(!q.accepts(""));
        assert!(!q.accepts("BD"));
        assert!(!q.accepts("Banana"));
        assert!(!q.accepts("B,Bee"));
    }

    #[test]
    fn multi_answer_grading_ignores_order() {
        let bank = QuestionBank::default();
        let q = bank.get(15).unwrap();
        assert!(q.accepts("A,B,D"));
        assert!(q.accepts("D, A, B"));
        assert!(!q.accepts("A,B"));
        assert!(!q.accepts("A,B,C,D"));
        assert!(!q.accepts("A,B,Dog"));
        assert!(!q.accepts("AB,D"));
    }

    #[test]
    fn view_hides_the_answer() {
        let bank = QuestionBank::default();
        let view = bank.get(3).unwrap().view();
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("Beijing"));
        assert!(!json.contains("answer"));
    }

    #[test]
    fn loads_questions_from_json_file() {
        let path = std::env::temp_dir().join(format!("duel-questions-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"prompt":"5 - 3 =","options":["1","2","3","4"],"answer":"B"}]"#,
        )
        .unwrap();

        let bank = QuestionBank::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(bank.len(), 1);
        assert!(!bank.get(0).unwrap().is_multi);
    }
}
